//! Request inspection helpers.
//!
//! # Responsibilities
//! - Locate a named cookie in the incoming headers
//! - Detect XMLHttpRequest-originated requests
//! - Read the request ID stamped by the request-id layer

use axum::http::{header::COOKIE, HeaderMap};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Header some front ends forward the CGI-style XHR marker under.
const CGI_REQUESTED_WITH: &str = "http_x_requested_with";
const X_REQUESTED_WITH: &str = "x-requested-with";
const XML_HTTP_REQUEST: &str = "XMLHttpRequest";

/// Value of the first cookie named `name`, with surrounding quotes removed.
pub fn find_cookie<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| {
            value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value)
        })
}

pub fn is_xhr(headers: &HeaderMap) -> bool {
    [CGI_REQUESTED_WITH, X_REQUESTED_WITH].iter().any(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == XML_HTTP_REQUEST)
    })
}

pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}
