//! Per-request envelope accumulation and the single send.

use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;
use tracing::Span;

use crate::config::EnvelopeConfig;
use crate::envelope::guard::EnvelopeGuard;
use crate::envelope::types::{
    Envelope, EnvelopeError, ErrorEntry, Fallback, Meta, SendReport, WarnEntry,
    DESC_UNSERIALIZABLE_PAYLOAD, DOMAIN_GENERIC, ERR_TYPE_ISE, FALLBACK_BODY,
};
use crate::http::sink::ResponseSink;
use crate::recovery::fault::{capture_trace, Fault};

/// Any value that can become the envelope payload.
///
/// Conversion is deferred to send time, which is where serialization
/// failures are handled.
pub trait Payload {
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T: Serialize> Payload for T {
    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Turns an envelope into body bytes.
pub trait EnvelopeEncoder: Send + Sync {
    fn encode(&self, envelope: &Envelope<'_>) -> serde_json::Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder {
    pub pretty: bool,
}

impl EnvelopeEncoder for JsonEncoder {
    fn encode(&self, envelope: &Envelope<'_>) -> serde_json::Result<Vec<u8>> {
        if self.pretty {
            serde_json::to_vec_pretty(envelope)
        } else {
            serde_json::to_vec(envelope)
        }
    }
}

/// Options shared by every builder the pipeline creates.
#[derive(Clone)]
pub struct EnvelopeOptions {
    pub debug: bool,
    pub encoder: Arc<dyn EnvelopeEncoder>,
}

impl EnvelopeOptions {
    pub fn from_config(config: &EnvelopeConfig) -> Self {
        Self {
            debug: config.debug,
            encoder: Arc::new(JsonEncoder {
                pretty: config.pretty,
            }),
        }
    }
}

impl Default for EnvelopeOptions {
    fn default() -> Self {
        Self {
            debug: false,
            encoder: Arc::new(JsonEncoder::default()),
        }
    }
}

/// Resolve the final status from the accumulated state and the caller's hint.
pub fn resolve_status(meta: &Meta, hint: Option<StatusCode>) -> StatusCode {
    if meta.ise {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    if !meta.errors.is_empty() {
        return match hint {
            Some(status) if status.as_u16() >= 400 => status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
    }
    hint.unwrap_or(StatusCode::OK)
}

pub struct EnvelopeBuilder<S> {
    meta: Meta,
    payload: Option<Box<dyn Payload>>,
    sink: EnvelopeGuard<S>,
    options: EnvelopeOptions,
    sent: bool,
    span: Span,
}

impl<S: ResponseSink> EnvelopeBuilder<S> {
    pub fn new(sink: S, options: EnvelopeOptions, span: Span) -> Self {
        Self {
            meta: Meta::default(),
            payload: None,
            sink: EnvelopeGuard::new(sink, span.clone()),
            options,
            sent: false,
            span,
        }
    }

    pub fn error(&mut self, domain: &str, kind: &str, desc: &str, target: &str) {
        self.push_error(domain, kind, desc, target, None);
    }

    pub fn warn(&mut self, domain: &str, kind: &str, desc: &str, target: &str) {
        self.meta.warns.push(WarnEntry {
            domain: domain.to_string(),
            kind: kind.to_string(),
            desc: desc.to_string(),
            target: target.to_string(),
        });
    }

    /// Record an internal server error. The trace of the call site is kept
    /// only in debug mode.
    pub fn ise(&mut self, fault: impl std::fmt::Display) {
        let trace = self.options.debug.then(capture_trace);
        self.push_ise(fault.to_string(), trace);
    }

    /// Record a fault recovered at the boundary, keeping its captured trace
    /// only in debug mode.
    pub fn record_fault(&mut self, fault: Fault) {
        let trace = if self.options.debug { fault.trace } else { None };
        self.push_ise(fault.message, trace);
    }

    pub fn payload<T: Serialize + 'static>(&mut self, value: T) {
        self.payload = Some(Box::new(value));
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// The guarded response: headers may be set, raw body writes are refused.
    pub fn sink(&mut self) -> &mut dyn ResponseSink {
        &mut self.sink
    }

    pub fn headers_mut(&mut self) -> &mut axum::http::HeaderMap {
        self.sink.headers_mut()
    }

    pub fn into_sink(self) -> S {
        self.sink.into_inner()
    }

    /// Serialize and commit the envelope. Exactly one status and body reach
    /// the sink across all paths; a second call fails without I/O.
    ///
    /// The envelope only counts as sent once the chain has returned from the
    /// commit. A panic while serializing or inside a commit action leaves it
    /// unsent, so the recovery boundary can still respond.
    pub fn send(&mut self, hint: Option<StatusCode>) -> Result<SendReport, EnvelopeError> {
        if self.sent {
            tracing::debug!(parent: &self.span, "Ignoring repeated envelope send");
            return Err(EnvelopeError::AlreadySent);
        }

        let mut status = resolve_status(&self.meta, hint);
        let (body, fallback) = match self.encode() {
            Ok(body) => (body, Fallback::None),
            Err(err) => {
                tracing::error!(parent: &self.span, error = %err, "Failed to serialize response envelope");

                self.payload = None;
                self.ise(DESC_UNSERIALIZABLE_PAYLOAD);
                status = StatusCode::INTERNAL_SERVER_ERROR;

                match self.encode() {
                    Ok(body) => (body, Fallback::PayloadDropped),
                    Err(err) => {
                        tracing::error!(
                            parent: &self.span,
                            error = %err,
                            "Failed to serialize degraded envelope, sending literal fallback"
                        );
                        (FALLBACK_BODY.to_vec(), Fallback::Literal)
                    }
                }
            }
        };

        let emitted = self.sink.emit(status, &body);
        self.sent = true;
        if let Err(err) = emitted {
            tracing::error!(parent: &self.span, error = %err, "Failed to write response envelope");
            return Err(err.into());
        }

        tracing::debug!(parent: &self.span, status = %status, ?fallback, "Envelope sent");
        Ok(SendReport { status, fallback })
    }

    /// Drop the payload, e.g. after it faulted during serialization.
    pub(crate) fn discard_payload(&mut self) {
        self.payload = None;
    }

    /// Commit [`FALLBACK_BODY`] with status 500 unless something was sent.
    pub(crate) fn send_literal(&mut self) {
        if self.sent {
            return;
        }
        let emitted = self.sink.emit(StatusCode::INTERNAL_SERVER_ERROR, FALLBACK_BODY);
        self.sent = true;
        match emitted {
            Ok(()) => tracing::warn!(parent: &self.span, "Literal fallback envelope sent"),
            Err(err) => {
                tracing::error!(parent: &self.span, error = %err, "Failed to write literal fallback envelope")
            }
        }
    }

    fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let payload = match &self.payload {
            Some(payload) => payload.to_json()?,
            None => serde_json::Value::Null,
        };
        self.options.encoder.encode(&Envelope {
            meta: &self.meta,
            payload,
        })
    }

    fn push_ise(&mut self, desc: String, trace: Option<String>) {
        self.push_error(DOMAIN_GENERIC, ERR_TYPE_ISE, &desc, "", trace);
        self.meta.ise = true;
    }

    fn push_error(&mut self, domain: &str, kind: &str, desc: &str, target: &str, trace: Option<String>) {
        self.meta.errors.push(ErrorEntry {
            domain: domain.to_string(),
            kind: kind.to_string(),
            desc: desc.to_string(),
            target: target.to_string(),
            trace,
        });
    }
}
