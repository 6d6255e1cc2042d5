//! Deferred-commit JSON response pipeline.
//!
//! Handlers accumulate errors, warnings and a payload into a response
//! envelope; a chain of commit hooks attaches the session cookie and timing
//! header at the moment the first byte reaches the transport; a recovery
//! boundary turns panics into internal server error envelopes.

pub mod config;
pub mod envelope;
pub mod http;
pub mod observability;
pub mod recovery;
pub mod session;

pub use config::AppConfig;
pub use envelope::EnvelopeBuilder;
pub use http::{HttpServer, Pipeline, RequestContext};
pub use session::SessionTokenStore;
