//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check key encodings and the lengths the cookie codec accepts
//! - Validate value ranges (timeouts > 0, lifetimes > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// Longest lifetime accepted for either token, in seconds (10 years).
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("listener.request_timeout_secs must be greater than 0")]
    ZeroTimeout,

    #[error("session.cookie_name {0:?} is not a valid cookie name")]
    CookieName(String),

    #[error("session.{field} is not valid hex: {reason}")]
    KeyEncoding { field: &'static str, reason: String },

    #[error("session.hash_key must be 32 or 64 bytes, got {0}")]
    HashKeyLength(usize),

    #[error("session.block_key must be empty, 16 or 32 bytes, got {0}")]
    BlockKeyLength(usize),

    #[error("session.{0} must be between 1 and {MAX_LIFETIME_SECS} seconds")]
    Lifetime(&'static str),

    #[error("profiler.header {0:?} is not a valid header name")]
    InvalidHeaderName(String),
}

/// Validate a parsed configuration, collecting every violation.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    let session = &config.session;
    if session.enabled {
        if !is_cookie_name(&session.cookie_name) {
            errors.push(ValidationError::CookieName(session.cookie_name.clone()));
        }
        match session.hash_key_bytes() {
            Ok(key) if matches!(key.len(), 32 | 64) => {}
            Ok(key) => errors.push(ValidationError::HashKeyLength(key.len())),
            Err(err) => errors.push(err),
        }
        match session.block_key_bytes() {
            Ok(key) if matches!(key.len(), 0 | 16 | 32) => {}
            Ok(key) => errors.push(ValidationError::BlockKeyLength(key.len())),
            Err(err) => errors.push(err),
        }
        for (field, secs) in [
            ("auth_lifetime_secs", session.auth_lifetime_secs),
            ("visit_lifetime_secs", session.visit_lifetime_secs),
        ] {
            if secs == 0 || secs > MAX_LIFETIME_SECS {
                errors.push(ValidationError::Lifetime(field));
            }
        }
    }

    if config.profiler.enabled && HeaderName::try_from(config.profiler.header.as_str()).is_err() {
        errors.push(ValidationError::InvalidHeaderName(config.profiler.header.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// RFC 6265 cookie-name: a non-empty token.
fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}
