//! Panic recovery subsystem.
//!
//! # Data Flow
//! ```text
//! handler panics
//!     → fault.rs hook records location (and backtrace in debug mode)
//!     → boundary.rs catch_unwind builds a Fault
//!     → envelope records it as an ISE entry
//!     → boundary sends the envelope if the handler had not
//! ```

pub mod boundary;
pub mod fault;

pub use boundary::{Recoverable, RecoveryBoundary};
pub use fault::Fault;
