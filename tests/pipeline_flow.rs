//! End-to-end behavior of the envelope pipeline behind the full middleware stack.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use serde_json::{json, Value};

use envelope_pipeline::envelope::{EnvelopeError, ERR_TYPE_ISE};
use envelope_pipeline::http::{DEFAULT_TIMING_HEADER, X_REQUEST_ID};

mod common;

#[tokio::test]
async fn test_warnings_alone_keep_status_ok() {
    let router = common::router_with(common::test_config(false), |ctx| {
        let envelope = ctx.envelope();
        envelope.warn("api", "deprecated", "Use the v2 endpoint", "");
        envelope.payload(json!({"id": 7}));
    });

    let response = common::get(&router).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["meta"]["ise"], false);
    assert_eq!(response.body["meta"]["errors"], json!([]));
    assert_eq!(response.body["meta"]["warns"][0]["type"], "deprecated");
    assert_eq!(response.body["payload"]["id"], 7);
}

#[tokio::test]
async fn test_validation_errors_use_status_hint() {
    let router = common::router_with(common::test_config(false), |ctx| {
        let envelope = ctx.envelope();
        envelope.error("user", "required", "Email is required", "email");
        envelope.error("user", "too_short", "Password is too short", "password");
        envelope.send(Some(StatusCode::UNPROCESSABLE_ENTITY)).unwrap();
    });

    let response = common::get(&router).await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = response.body["meta"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["target"], "email");
    assert_eq!(errors[1]["target"], "password");
    assert_eq!(response.body["payload"], Value::Null);
}

#[tokio::test]
async fn test_errors_without_hint_are_internal_errors() {
    let router = common::router_with(common::test_config(false), |ctx| {
        ctx.envelope().error("db", "unavailable", "Database offline", "");
    });

    let response = common::get(&router).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["meta"]["ise"], false);
}

#[tokio::test]
async fn test_panic_in_debug_mode_carries_trace() {
    let router = common::router_with(common::test_config(true), |ctx| {
        ctx.envelope().payload("partial result");
        panic!("index out of range");
    });

    let response = common::get(&router).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["meta"]["ise"], true);
    let error = &response.body["meta"]["errors"][0];
    assert_eq!(error["type"], ERR_TYPE_ISE);
    assert_eq!(error["desc"], "index out of range");
    assert!(error["trace"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(response.headers.contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_panic_outside_debug_mode_hides_trace() {
    let router = common::router_with(common::test_config(false), |_| {
        panic!("secret internals");
    });

    let response = common::get(&router).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["meta"]["ise"], true);
    assert!(response.body["meta"]["errors"][0].get("trace").is_none());
}

#[tokio::test]
async fn test_session_tokens_survive_round_trip() {
    let router = common::router_with(common::test_config(false), |ctx| {
        let tokens = ctx.session().map(|s| (s.auth_token().to_string(), s.visit_token().to_string()));
        ctx.envelope().payload(tokens);
    });

    let first = common::get(&router).await;
    let second = common::get_with_cookie(&router, first.cookie()).await;

    assert_eq!(first.body["payload"].as_array().unwrap().len(), 2);
    assert_eq!(second.body["payload"], first.body["payload"]);
    assert!(second.headers.contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_tampered_cookie_yields_fresh_tokens() {
    let router = common::router_with(common::test_config(false), |ctx| {
        let auth = ctx.session().map(|s| s.auth_token().to_string());
        ctx.envelope().payload(auth);
    });

    let first = common::get(&router).await;
    let cookie = first.cookie();
    let mut bytes = cookie.as_bytes().to_vec();
    let last = bytes.len() - 3;
    bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
    let tampered = HeaderValue::from_bytes(&bytes).unwrap();

    let second = common::get_with_cookie(&router, tampered).await;

    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["payload"].as_str().unwrap().len(), 32);
    assert_ne!(second.body["payload"], first.body["payload"]);
}

#[tokio::test]
async fn test_sessions_disabled_sets_no_cookie() {
    let mut config = common::test_config(false);
    config.session.enabled = false;
    let router = common::router_with(config, |ctx| {
        let has_session = ctx.session().is_some();
        ctx.envelope().payload(has_session);
    });

    let response = common::get(&router).await;

    assert_eq!(response.body["payload"], false);
    assert!(!response.headers.contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_timing_and_request_id_headers() {
    let router = common::router_with(common::test_config(false), |ctx| {
        ctx.envelope().payload(());
    });

    let request = Request::get("/")
        .header(X_REQUEST_ID, "req-1234")
        .body(Body::empty())
        .unwrap();
    let response = common::send(&router, request).await;

    assert!(response.headers.contains_key(DEFAULT_TIMING_HEADER));
    assert_eq!(response.headers[X_REQUEST_ID], "req-1234");
    assert!(response.headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
}

#[tokio::test]
async fn test_request_id_generated_when_absent() {
    let router = common::router_with(common::test_config(false), |ctx| {
        ctx.envelope().payload(());
    });

    let response = common::get(&router).await;

    assert!(!response.headers[X_REQUEST_ID].is_empty());
}

#[tokio::test]
async fn test_second_send_is_rejected() {
    let outcome = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&outcome);
    let router = common::router_with(common::test_config(false), move |ctx| {
        let envelope = ctx.envelope();
        envelope.payload("first");
        envelope.send(Some(StatusCode::CREATED)).unwrap();
        envelope.payload("second");
        let again = envelope.send(None);
        *seen.lock().unwrap() = Some(matches!(again, Err(EnvelopeError::AlreadySent)));
    });

    let response = common::get(&router).await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["payload"], "first");
    assert_eq!(*outcome.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn test_xhr_detection() {
    let router = common::router_with(common::test_config(false), |ctx| {
        let xhr = ctx.is_xhr();
        ctx.envelope().payload(xhr);
    });

    let request = Request::get("/")
        .header("x-requested-with", "XMLHttpRequest")
        .body(Body::empty())
        .unwrap();
    let response = common::send(&router, request).await;

    assert_eq!(response.body["payload"], true);
}

struct Explodes;

impl serde::Serialize for Explodes {
    fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        panic!("payload exploded");
    }
}

#[tokio::test]
async fn test_panicking_payload_in_handler_send_is_internal_error() {
    let router = common::router_with(common::test_config(false), |ctx| {
        let envelope = ctx.envelope();
        envelope.payload(Explodes);
        let _ = envelope.send(None);
    });

    let response = common::get(&router).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["meta"]["ise"], true);
    assert_eq!(response.body["payload"], Value::Null);
    assert!(response.headers.contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_panicking_payload_without_handler_send_is_internal_error() {
    let router = common::router_with(common::test_config(false), |ctx| {
        ctx.envelope().payload(Explodes);
    });

    let response = common::get(&router).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["meta"]["errors"][0]["desc"], "payload exploded");
}
