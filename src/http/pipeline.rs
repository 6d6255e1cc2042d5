//! Per-request wiring of the response chain.
//!
//! # Responsibilities
//! - Decode the session cookie before the handler runs
//! - Install the commit chain: envelope guard → cookie hook → timing hook → transport
//! - Run the handler inside the recovery boundary
//! - Hand the buffered response back to axum
//!
//! # Design Decisions
//! - Everything per request is built eagerly and never leaves the calling
//!   thread, so the session handle is an `Rc<RefCell<_>>`
//! - The request body is buffered before the handler runs; there are no
//!   await points between the handler and the commit

use std::cell::{RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::{HeaderName, Request, StatusCode};
use axum::response::Response;
use axum::routing::{any, MethodRouter};

use crate::config::{validate_config, AppConfig, ConfigError};
use crate::envelope::{EnvelopeBuilder, EnvelopeOptions};
use crate::http::commit::CommitHook;
use crate::http::profiler::RequestTimer;
use crate::http::request::{is_xhr, request_id};
use crate::http::sink::{BufferedSink, ResponseSink};
use crate::recovery::{Fault, Recoverable, RecoveryBoundary};
use crate::session::{SessionSettings, SessionTokenStore};

/// The sink chain handed to the envelope builder.
pub type ChainSink<'a> = Box<dyn ResponseSink + 'a>;

/// Everything a handler sees for one request.
pub struct RequestContext<'a> {
    parts: &'a Parts,
    body: &'a Bytes,
    envelope: EnvelopeBuilder<ChainSink<'a>>,
    session: Option<Rc<RefCell<SessionTokenStore>>>,
}

impl<'a> RequestContext<'a> {
    pub fn request(&self) -> &Parts {
        self.parts
    }

    pub fn body(&self) -> &Bytes {
        self.body
    }

    pub fn is_xhr(&self) -> bool {
        is_xhr(&self.parts.headers)
    }

    pub fn envelope(&mut self) -> &mut EnvelopeBuilder<ChainSink<'a>> {
        &mut self.envelope
    }

    /// The session store, if sessions are enabled.
    pub fn session(&self) -> Option<RefMut<'_, SessionTokenStore>> {
        self.session.as_ref().map(|store| store.borrow_mut())
    }
}

impl Recoverable for RequestContext<'_> {
    fn record_fault(&mut self, fault: Fault) {
        self.envelope.record_fault(fault);
    }

    fn finish(&mut self) {
        Recoverable::finish(&mut self.envelope);
    }

    fn discard_payload(&mut self) {
        Recoverable::discard_payload(&mut self.envelope);
    }

    fn finish_literal(&mut self) {
        Recoverable::finish_literal(&mut self.envelope);
    }
}

pub struct Pipeline {
    envelope: EnvelopeOptions,
    session: Option<Arc<SessionSettings>>,
    timing_header: Option<HeaderName>,
    body_limit: usize,
}

impl Pipeline {
    pub fn new(envelope: EnvelopeOptions) -> Self {
        Self {
            envelope,
            session: None,
            timing_header: None,
            body_limit: 1024 * 1024,
        }
    }

    pub fn with_session(mut self, settings: Arc<SessionSettings>) -> Self {
        self.session = Some(settings);
        self
    }

    pub fn with_timing_header(mut self, header: HeaderName) -> Self {
        self.timing_header = Some(header);
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Build from a configuration, validating it first.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let mut pipeline = Self::new(EnvelopeOptions::from_config(&config.envelope))
            .with_body_limit(config.listener.body_limit_bytes);

        if config.session.enabled {
            pipeline = pipeline.with_session(Arc::new(config.session.settings()?));
        }
        if config.profiler.enabled {
            pipeline = pipeline.with_timing_header(config.profiler.header_name()?);
        }
        Ok(pipeline)
    }

    /// Axum route running `handler` through this pipeline.
    pub fn endpoint<H>(self: &Arc<Self>, handler: H) -> MethodRouter
    where
        H: Fn(&mut RequestContext<'_>) + Send + Sync + 'static,
    {
        let pipeline = Arc::clone(self);
        let handler = Arc::new(handler);
        any(move |request: Request<Body>| {
            let pipeline = Arc::clone(&pipeline);
            let handler = Arc::clone(&handler);
            async move { pipeline.serve(request, &*handler).await }
        })
    }

    /// Buffer the request body, then dispatch.
    pub async fn serve<H>(&self, request: Request<Body>, handler: &H) -> Response
    where
        H: Fn(&mut RequestContext<'_>) + ?Sized,
    {
        let started = Instant::now();
        let (parts, body) = request.into_parts();

        match axum::body::to_bytes(body, self.body_limit).await {
            Ok(body) => self.dispatch_at(&parts, &body, started, handler),
            Err(err) => {
                let reason = err.to_string();
                self.dispatch_at(&parts, &Bytes::new(), started, &|ctx: &mut RequestContext<'_>| {
                    let envelope = ctx.envelope();
                    envelope.error("request", "body_unreadable", &reason, "body");
                    let _ = envelope.send(Some(StatusCode::BAD_REQUEST));
                })
            }
        }
    }

    pub fn dispatch<H>(&self, parts: &Parts, body: &Bytes, handler: &H) -> Response
    where
        H: Fn(&mut RequestContext<'_>) + ?Sized,
    {
        self.dispatch_at(parts, body, Instant::now(), handler)
    }

    fn dispatch_at<H>(&self, parts: &Parts, body: &Bytes, started: Instant, handler: &H) -> Response
    where
        H: Fn(&mut RequestContext<'_>) + ?Sized,
    {
        let span = tracing::info_span!(
            "request",
            request_id = %request_id(&parts.headers),
            method = %parts.method,
            path = %parts.uri.path(),
        );
        let mut wire = BufferedSink::new(span.clone());

        {
            let session = self.session.as_ref().map(|settings| {
                let mut store = SessionTokenStore::new(Arc::clone(settings), span.clone());
                store.read(&parts.headers);
                Rc::new(RefCell::new(store))
            });

            let mut chain: ChainSink<'_> = Box::new(&mut wire);
            if let Some(header) = &self.timing_header {
                chain = Box::new(RequestTimer::new(header.clone(), started).install(chain));
            }
            if let Some(store) = &session {
                let store = Rc::clone(store);
                chain = Box::new(CommitHook::new(chain, move |headers| {
                    // Failures are logged by the store and the cookie omitted.
                    let _ = store.borrow_mut().write(headers);
                }));
            }

            let mut ctx = RequestContext {
                parts,
                body,
                envelope: EnvelopeBuilder::new(chain, self.envelope.clone(), span.clone()),
                session,
            };

            RecoveryBoundary::new(self.envelope.debug, span.clone()).guard(&mut ctx, |ctx| handler(ctx));
        }

        wire.into_response()
    }
}
