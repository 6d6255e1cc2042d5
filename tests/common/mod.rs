//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use envelope_pipeline::config::AppConfig;
use envelope_pipeline::{HttpServer, Pipeline, RequestContext};

pub const HASH_KEY: &str = "8f2a6c1e9b4d7f3a0c5e8b2d6f1a4c7e9b3d5f8a2c6e1b4d7f0a3c5e8b2d6f19";
pub const BLOCK_KEY: &str = "0d9c8b7a6f5e4d3c2b1a0f9e8d7c6b5a";

/// Configuration with fixed keys, so cookies survive across servers.
pub fn test_config(debug: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.envelope.debug = debug;
    config.session.hash_key = HASH_KEY.to_string();
    config.session.block_key = BLOCK_KEY.to_string();
    config.profiler.enabled = true;
    config
}

/// A fully layered router with a single route at `/`.
pub fn router_with<H>(config: AppConfig, handler: H) -> Router
where
    H: Fn(&mut RequestContext<'_>) + Send + Sync + 'static,
{
    let pipeline = Arc::new(Pipeline::from_config(&config).unwrap());
    let routes = Router::new().route("/", pipeline.endpoint(handler));
    HttpServer::new(config, routes).router()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `name=value` part of `Set-Cookie`, ready to send back.
    pub fn cookie(&self) -> HeaderValue {
        let set_cookie = self.headers[header::SET_COOKIE].to_str().unwrap();
        let pair = set_cookie.split(';').next().unwrap();
        HeaderValue::from_str(pair).unwrap()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    TestResponse {
        status,
        headers,
        body: serde_json::from_slice(&bytes).unwrap(),
    }
}

pub async fn get(router: &Router) -> TestResponse {
    send(router, Request::get("/").body(Body::empty()).unwrap()).await
}

pub async fn get_with_cookie(router: &Router, cookie: HeaderValue) -> TestResponse {
    let request = Request::get("/")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}
