//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use axum::http::HeaderName;
use chrono::Duration;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;
use crate::config::validation::ValidationError;
use crate::http::profiler::DEFAULT_TIMING_HEADER;
use crate::session::{SessionSettings, TokenLifetimes};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// JSON envelope settings.
    pub envelope: EnvelopeConfig,

    /// Session cookie settings.
    pub session: SessionConfig,

    /// Request timing header.
    pub profiler: ProfilerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body buffered before the handler runs.
    pub body_limit_bytes: usize,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            body_limit_bytes: 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

/// JSON envelope configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Attach execution traces to internal server error entries.
    pub debug: bool,

    /// Indent response bodies.
    pub pretty: bool,
}

/// Session cookie configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Decode and set the session cookie.
    pub enabled: bool,

    pub cookie_name: String,

    /// Cookie `Domain` attribute; omitted when empty.
    pub cookie_domain: String,

    /// Cookie `Secure` attribute.
    pub secure: bool,

    /// Auth token lifetime after its last renewal, in seconds.
    pub auth_lifetime_secs: u64,

    /// Visit token lifetime after its last renewal, in seconds.
    pub visit_lifetime_secs: u64,

    /// Hex-encoded HMAC key, 32 or 64 bytes.
    pub hash_key: String,

    /// Hex-encoded AES key, 16 or 32 bytes. Empty means sign-only.
    pub block_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookie_name: "session_cookie".to_string(),
            cookie_domain: String::new(),
            secure: false,
            auth_lifetime_secs: 14 * 24 * 60 * 60,
            visit_lifetime_secs: 30 * 60,
            hash_key: String::new(),
            block_key: String::new(),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("enabled", &self.enabled)
            .field("cookie_name", &self.cookie_name)
            .field("cookie_domain", &self.cookie_domain)
            .field("secure", &self.secure)
            .field("auth_lifetime_secs", &self.auth_lifetime_secs)
            .field("visit_lifetime_secs", &self.visit_lifetime_secs)
            .field("hash_key", &"<redacted>")
            .field("block_key", &"<redacted>")
            .finish()
    }
}

impl SessionConfig {
    pub fn lifetimes(&self) -> Result<TokenLifetimes, ValidationError> {
        Ok(TokenLifetimes::new(
            lifetime("auth_lifetime_secs", self.auth_lifetime_secs)?,
            lifetime("visit_lifetime_secs", self.visit_lifetime_secs)?,
        ))
    }

    pub fn hash_key_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        decode_key("hash_key", &self.hash_key)
    }

    pub fn block_key_bytes(&self) -> Result<Vec<u8>, ValidationError> {
        decode_key("block_key", &self.block_key)
    }

    /// Fill both keys with fresh random bytes (64-byte hash key, 32-byte
    /// block key). Cookies will not survive a restart.
    pub fn with_random_keys(mut self) -> Self {
        let mut hash_key = [0u8; 64];
        let mut block_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut hash_key);
        rand::thread_rng().fill_bytes(&mut block_key);
        self.hash_key = hex::encode(hash_key);
        self.block_key = hex::encode(block_key);
        self
    }

    /// Keyed runtime settings.
    pub fn settings(&self) -> Result<SessionSettings, ConfigError> {
        let hash_key = self.hash_key_bytes().map_err(|e| ConfigError::Validation(vec![e]))?;
        let block_key = self.block_key_bytes().map_err(|e| ConfigError::Validation(vec![e]))?;
        let lifetimes = self.lifetimes().map_err(|e| ConfigError::Validation(vec![e]))?;
        Ok(SessionSettings::new(
            self.cookie_name.clone(),
            Some(self.cookie_domain.clone()),
            self.secure,
            lifetimes,
            &hash_key,
            &block_key,
        )?)
    }
}

fn lifetime(field: &'static str, secs: u64) -> Result<Duration, ValidationError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or(ValidationError::Lifetime(field))
}

fn decode_key(field: &'static str, value: &str) -> Result<Vec<u8>, ValidationError> {
    hex::decode(value.trim()).map_err(|err| ValidationError::KeyEncoding {
        field,
        reason: err.to_string(),
    })
}

/// Request timing header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Stamp the elapsed request time on every response.
    pub enabled: bool,

    /// Header name carrying the elapsed time.
    pub header: String,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header: DEFAULT_TIMING_HEADER.to_string(),
        }
    }
}

impl ProfilerConfig {
    pub fn header_name(&self) -> Result<HeaderName, ConfigError> {
        HeaderName::try_from(self.header.as_str()).map_err(|_| {
            ConfigError::Validation(vec![ValidationError::InvalidHeaderName(self.header.clone())])
        })
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
