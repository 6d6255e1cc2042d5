//! Deferred-commit decorator.
//!
//! A `CommitHook` wraps the next sink in the chain and runs a registered
//! action against that sink's headers the first time anything is committed,
//! either a head commit or a body write. The action is consumed when it fires,
//! so the one-shot guarantee holds per decorator regardless of how many other
//! hooks sit above or below it.

use axum::http::{HeaderMap, StatusCode};

use crate::http::sink::{ResponseSink, SinkError};

/// Side effect run once against the outgoing headers.
pub type CommitAction<'a> = Box<dyn FnOnce(&mut HeaderMap) + 'a>;

pub struct CommitHook<'a, S> {
    inner: S,
    action: Option<CommitAction<'a>>,
}

impl<'a, S: ResponseSink> CommitHook<'a, S> {
    pub fn new(inner: S, action: impl FnOnce(&mut HeaderMap) + 'a) -> Self {
        Self {
            inner,
            action: Some(Box::new(action)),
        }
    }

    /// Whether the registered action has already run.
    pub fn has_fired(&self) -> bool {
        self.action.is_none()
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn fire(&mut self) {
        if let Some(action) = self.action.take() {
            action(self.inner.headers_mut());
        }
    }
}

impl<'a, S: ResponseSink> ResponseSink for CommitHook<'a, S> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_head(&mut self, status: StatusCode) {
        self.fire();
        self.inner.write_head(status);
    }

    fn write_body(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
        self.fire();
        self.inner.write_body(chunk)
    }

    fn is_committed(&self) -> bool {
        self.inner.is_committed()
    }
}
