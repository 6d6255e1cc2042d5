//! Request timing header.
//!
//! Stamps the time elapsed since the request arrived onto the response,
//! exactly once, at the moment the response is first committed.

use std::time::{Duration, Instant};

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::http::commit::CommitHook;
use crate::http::sink::ResponseSink;

pub const DEFAULT_TIMING_HEADER: &str = "debug-request-time";

#[derive(Debug, Clone)]
pub struct RequestTimer {
    header: HeaderName,
    started: Instant,
}

impl RequestTimer {
    pub fn new(header: HeaderName, started: Instant) -> Self {
        Self { header, started }
    }

    pub fn start(header: HeaderName) -> Self {
        Self::new(header, Instant::now())
    }

    /// Write the elapsed time in milliseconds, e.g. `Debug-Request-Time: 1.204ms`.
    pub fn stamp(self, headers: &mut HeaderMap) {
        let elapsed = format_elapsed(self.started.elapsed());
        if let Ok(value) = HeaderValue::from_str(&elapsed) {
            headers.insert(self.header, value);
        }
    }

    /// Wrap `sink` so the header is stamped at first commit.
    pub fn install<'a, S: ResponseSink>(self, sink: S) -> CommitHook<'a, S> {
        CommitHook::new(sink, move |headers| self.stamp(headers))
    }
}

/// ASCII only: the `Debug` form of `Duration` writes `µs`, which
/// `HeaderValue::to_str` rejects.
fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}ms", elapsed.as_secs_f64() * 1000.0)
}
