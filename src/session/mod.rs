//! Session token subsystem.
//!
//! # Data Flow
//! ```text
//! Cookie header
//!     → codec.rs (verify MAC, check age, decrypt, JSON)
//!     → token.rs (renewal check per token kind, stamp renewed)
//!     → store.rs (handler reads / resets tokens)
//!     → store.rs write at first commit (renew, encode, Set-Cookie)
//! ```
//!
//! # Design Decisions
//! - Decode failures of any kind are indistinguishable from "no cookie"
//! - Auth and visit tokens age independently
//! - Nothing is persisted server-side; the cookie is the only state

pub mod codec;
pub mod store;
pub mod token;

pub use codec::{CodecError, SecureCodec};
pub use store::{SessionError, SessionSettings, SessionTokenStore};
pub use token::{is_well_formed, mint_token, Renewal, TokenLifetimes, TokenPair};
