//! Response sink capability and the buffered transport end.
//!
//! # Responsibilities
//! - Define the narrow interface every decorator in the commit chain speaks
//! - Hold the committed status, headers and body until the transport takes them
//!
//! # Design Decisions
//! - Headers are snapshotted at commit; later mutations never reach the wire
//! - A body write without an explicit head commits 200 first
//! - A second head commit is ignored, never re-emitted

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use thiserror::Error;
use tracing::Span;

/// Errors surfaced by a sink in the commit chain.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Raw body bytes were written past the envelope guard.
    #[error("direct body writes are forbidden; respond through the envelope")]
    DirectWriteForbidden,

    /// The transport refused the write.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Capability every layer of the response chain exposes.
pub trait ResponseSink {
    /// Mutable access to the headers that will be committed.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit status and headers.
    fn write_head(&mut self, status: StatusCode);

    /// Append body bytes, committing `200 OK` first if nothing was committed.
    fn write_body(&mut self, chunk: &[u8]) -> Result<usize, SinkError>;

    /// Whether status and headers have reached the transport.
    fn is_committed(&self) -> bool;
}

impl<S: ResponseSink + ?Sized> ResponseSink for &mut S {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_head(&mut self, status: StatusCode) {
        (**self).write_head(status)
    }

    fn write_body(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
        (**self).write_body(chunk)
    }

    fn is_committed(&self) -> bool {
        (**self).is_committed()
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for Box<S> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_head(&mut self, status: StatusCode) {
        (**self).write_head(status)
    }

    fn write_body(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
        (**self).write_body(chunk)
    }

    fn is_committed(&self) -> bool {
        (**self).is_committed()
    }
}

/// Innermost sink: buffers what the chain commits and hands it to axum.
#[derive(Debug)]
pub struct BufferedSink {
    pending: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: Vec<u8>,
    span: Span,
}

impl BufferedSink {
    pub fn new(span: Span) -> Self {
        Self {
            pending: HeaderMap::new(),
            committed: None,
            body: Vec::new(),
            span,
        }
    }

    /// Committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.committed.as_ref().map(|(status, _)| *status)
    }

    /// Headers as they were at commit time.
    pub fn committed_headers(&self) -> Option<&HeaderMap> {
        self.committed.as_ref().map(|(_, headers)| headers)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Convert into the response handed to the transport.
    pub fn into_response(self) -> Response {
        let BufferedSink {
            pending,
            committed,
            body,
            span,
        } = self;

        let (status, headers) = match committed {
            Some((status, headers)) => {
                if headers != pending {
                    tracing::debug!(parent: &span, "Headers modified after commit were dropped");
                }
                (status, headers)
            }
            None => {
                tracing::warn!(parent: &span, "Nothing committed; responding with empty 200");
                (StatusCode::OK, pending)
            }
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseSink for BufferedSink {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.pending
    }

    fn write_head(&mut self, status: StatusCode) {
        if let Some((current, _)) = &self.committed {
            tracing::warn!(
                parent: &self.span,
                committed = %current,
                ignored = %status,
                "Superfluous head commit"
            );
            return;
        }
        self.committed = Some((status, self.pending.clone()));
    }

    fn write_body(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
        if self.committed.is_none() {
            self.write_head(StatusCode::OK);
        }
        self.body.extend_from_slice(chunk);
        Ok(chunk.len())
    }

    fn is_committed(&self) -> bool {
        self.committed.is_some()
    }
}
