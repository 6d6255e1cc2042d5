//! JSON response envelope subsystem.
//!
//! # Data Flow
//! ```text
//! handler
//!     → builder.rs (error / warn / ise / payload accumulate per request)
//!     → builder.rs send (resolve status → serialize → degrade on failure)
//!     → guard.rs (the only path allowed to write body bytes)
//!     → commit chain (cookie hook → timing hook → transport)
//! ```
//!
//! # Design Decisions
//! - Payload serialization is deferred to send time
//! - A failed payload is dropped and replaced by an ISE entry; earlier
//!   errors and warnings are kept as a diagnostic trail
//! - If the degraded envelope also fails, a fixed literal body is sent

pub mod builder;
pub mod guard;
pub mod types;

pub use builder::{resolve_status, EnvelopeBuilder, EnvelopeEncoder, EnvelopeOptions, JsonEncoder, Payload};
pub use guard::EnvelopeGuard;
pub use types::{
    Envelope, EnvelopeError, ErrorEntry, Fallback, Meta, SendReport, WarnEntry, DOMAIN_GENERIC,
    ERR_TYPE_ISE, FALLBACK_BODY,
};
