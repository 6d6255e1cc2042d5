//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request ID, trace, timeout)
//!     → pipeline.rs (buffer body, decode session, build commit chain)
//!     → handler (through RequestContext)
//!     → envelope send
//!     → commit.rs hooks (cookie, then profiler.rs timing header)
//!     → sink.rs BufferedSink
//!     → Send to client
//! ```

pub mod commit;
pub mod pipeline;
pub mod profiler;
pub mod request;
pub mod server;
pub mod sink;

pub use commit::{CommitAction, CommitHook};
pub use pipeline::{ChainSink, Pipeline, RequestContext};
pub use profiler::{RequestTimer, DEFAULT_TIMING_HEADER};
pub use request::{find_cookie, is_xhr, request_id, X_REQUEST_ID};
pub use server::HttpServer;
pub use sink::{BufferedSink, ResponseSink, SinkError};
