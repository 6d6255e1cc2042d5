//! Envelope data model and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::sink::SinkError;

/// Domain used for entries the pipeline records itself.
pub const DOMAIN_GENERIC: &str = "generic";

/// Error type of internal server error entries.
pub const ERR_TYPE_ISE: &str = "ise";

/// Description recorded when the payload cannot be serialized.
pub const DESC_UNSERIALIZABLE_PAYLOAD: &str = "Can not serialize payload";

/// Body sent when even the payload-free envelope cannot be serialized.
pub const FALLBACK_BODY: &[u8] = br#"{"meta":{"ise":true}}"#;

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub domain: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub desc: String,
    pub target: String,
    /// Only populated in debug mode, for captured faults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarnEntry {
    pub domain: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub desc: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub ise: bool,
    pub errors: Vec<ErrorEntry>,
    pub warns: Vec<WarnEntry>,
}

/// The serialized shape of every JSON response.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub meta: &'a Meta,
    pub payload: serde_json::Value,
}

/// Which stage of the send path produced the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// The full envelope serialized.
    None,
    /// The payload failed to serialize and was dropped.
    PayloadDropped,
    /// Nothing serialized; [`FALLBACK_BODY`] was sent.
    Literal,
}

/// Outcome of a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    pub status: axum::http::StatusCode,
    pub fallback: Fallback,
}

/// Errors returned by the envelope builder.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// `send` was invoked after the envelope had already been sent.
    #[error("response already sent")]
    AlreadySent,

    /// The commit chain rejected the write.
    #[error(transparent)]
    Sink(#[from] SinkError),
}
