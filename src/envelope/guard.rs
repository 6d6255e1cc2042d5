//! Single-writer guard beneath the envelope builder.
//!
//! Handlers get this sink when they ask for the response. Header access and
//! head commits pass through; body writes are refused so nothing can corrupt
//! the envelope framing. Only the builder's send step writes the body, through
//! the crate-private [`EnvelopeGuard::emit`].

use axum::http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode};
use tracing::Span;

use crate::envelope::types::CONTENT_TYPE_JSON;
use crate::http::sink::{ResponseSink, SinkError};

pub struct EnvelopeGuard<S> {
    inner: S,
    span: Span,
}

impl<S: ResponseSink> EnvelopeGuard<S> {
    pub fn new(inner: S, span: Span) -> Self {
        Self { inner, span }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Commit a serialized envelope.
    pub(crate) fn emit(&mut self, status: StatusCode, body: &[u8]) -> Result<(), SinkError> {
        self.inner
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        self.inner.write_head(status);
        self.inner.write_body(body)?;
        Ok(())
    }
}

impl<S: ResponseSink> ResponseSink for EnvelopeGuard<S> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Passes through. A head committed here wins over the status the
    /// envelope resolves later, and headers set afterwards are dropped.
    fn write_head(&mut self, status: StatusCode) {
        if !self.inner.is_committed() {
            tracing::warn!(
                parent: &self.span,
                status = %status,
                "Response head committed outside the envelope"
            );
        }
        self.inner.write_head(status);
    }

    fn write_body(&mut self, _chunk: &[u8]) -> Result<usize, SinkError> {
        Err(SinkError::DirectWriteForbidden)
    }

    fn is_committed(&self) -> bool {
        self.inner.is_committed()
    }
}
