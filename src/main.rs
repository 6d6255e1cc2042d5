//! Envelope pipeline demo server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id ─▶ trace ─▶ timeout ─▶ Pipeline
//!                                                        │
//!                                     session cookie read │
//!                                                        ▼
//!                                          RecoveryBoundary(handler)
//!                                                        │
//!                                              envelope send
//!                                                        ▼
//!     Client Response   envelope guard ─▶ cookie hook ─▶ timing hook ─▶ buffer
//!     ◀──────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::Router;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::net::TcpListener;

use envelope_pipeline::config::{load_config, validate_config, AppConfig, ConfigError};
use envelope_pipeline::observability::init_logging;
use envelope_pipeline::session::TokenPair;
use envelope_pipeline::{HttpServer, Pipeline, RequestContext};

#[derive(Parser)]
#[command(name = "envelope-demo")]
#[command(about = "Demo server for the deferred-commit envelope pipeline", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults with random session keys if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo endpoints (default)
    Serve,
    /// Verify and print a session cookie value using the configured keys
    DecodeCookie {
        /// Cookie value as sent by the browser
        value: String,
    },
}

#[derive(Serialize)]
struct TokensPayload {
    auth_token: String,
    visit_token: String,
}

fn tokens_payload(ctx: &RequestContext<'_>) -> Option<TokensPayload> {
    ctx.session().map(|session| TokensPayload {
        auth_token: session.auth_token().to_string(),
        visit_token: session.visit_token().to_string(),
    })
}

fn demo_routes(pipeline: &Arc<Pipeline>) -> Router {
    Router::new()
        .route(
            "/api/1/tokens",
            pipeline.endpoint(|ctx| {
                let payload = tokens_payload(ctx);
                ctx.envelope().payload(payload);
            }),
        )
        .route(
            "/api/1/validate",
            pipeline.endpoint(|ctx| {
                let envelope = ctx.envelope();
                envelope.error("user", "required", "Email is required", "email");
                envelope.error("user", "too_short", "Password is too short", "password");
                let _ = envelope.send(Some(StatusCode::UNPROCESSABLE_ENTITY));
            }),
        )
        .route(
            "/api/1/warn",
            pipeline.endpoint(|ctx| {
                ctx.envelope()
                    .warn("api", "deprecated", "Use /api/2/tokens", "");
            }),
        )
        .route(
            "/api/1/panic",
            pipeline.endpoint(|ctx| {
                ctx.envelope().payload("never sent");
                panic!("demo handler failure");
            }),
        )
        .route(
            "/api/1/logout",
            pipeline.endpoint(|ctx| {
                if let Some(mut session) = ctx.session() {
                    session.reset();
                }
                let payload = tokens_payload(ctx);
                ctx.envelope().payload(payload);
            }),
        )
}

fn load(path: Option<&PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => {
            let mut config = AppConfig::default();
            config.session = config.session.with_random_keys();
            config.envelope.debug = true;
            config.profiler.enabled = true;
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref())?;

    init_logging(&config.observability)?;

    if cli.config.is_none() {
        tracing::warn!("No configuration file given; using random session keys");
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::DecodeCookie { value } => {
            let settings = config.session.settings()?;
            let tokens: TokenPair = settings
                .codec()
                .decode(&settings.cookie_name, &value)?;
            println!("{}", serde_json::to_string_pretty(&tokens)?);
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        debug = config.envelope.debug,
        session = config.session.enabled,
        profiler = config.profiler.enabled,
        "Configuration loaded"
    );

    let pipeline = Arc::new(Pipeline::from_config(&config)?);
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let server = HttpServer::new(config, demo_routes(&pipeline));
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
