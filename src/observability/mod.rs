//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline opens a span per request (request_id, method, path)
//!     → session store, envelope builder, recovery boundary and the
//!       transport sink each log as children of that span
//!     → logging.rs subscriber (text or JSON lines)
//! ```

pub mod logging;

pub use logging::init_logging;
