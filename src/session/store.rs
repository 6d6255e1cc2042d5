//! Request-scoped session token store.

use std::sync::Arc;

use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::Span;

use crate::http::request::find_cookie;
use crate::session::codec::{CodecError, SecureCodec};
use crate::session::token::{TokenLifetimes, TokenPair};

/// Soft failures: logged, never surfaced to the client.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("can not decode session cookie: {0}")]
    CookieDecode(#[source] CodecError),

    #[error("can not encode session cookie: {0}")]
    CookieEncode(#[source] CodecError),

    #[error("session cookie is not a valid header value")]
    InvalidHeader,

    #[error("session cookie expiry is out of range")]
    ExpiryOutOfRange,
}

/// Cookie attributes, lifetimes and the keyed codec, built once at startup.
#[derive(Debug)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub cookie_domain: Option<String>,
    pub secure: bool,
    pub lifetimes: TokenLifetimes,
    codec: SecureCodec,
}

impl SessionSettings {
    pub fn new(
        cookie_name: impl Into<String>,
        cookie_domain: Option<String>,
        secure: bool,
        lifetimes: TokenLifetimes,
        hash_key: &[u8],
        block_key: &[u8],
    ) -> Result<Self, CodecError> {
        let codec = SecureCodec::new(hash_key, block_key)?.with_max_age(lifetimes.longest());
        Ok(Self {
            cookie_name: cookie_name.into(),
            cookie_domain: cookie_domain.filter(|d| !d.is_empty()),
            secure,
            lifetimes,
            codec,
        })
    }

    pub fn codec(&self) -> &SecureCodec {
        &self.codec
    }

    /// Render a `Set-Cookie` value for `encoded`.
    pub fn render_cookie(&self, encoded: &str, now: DateTime<Utc>) -> Result<String, SessionError> {
        let expires = now
            .checked_add_signed(self.lifetimes.longest())
            .ok_or(SessionError::ExpiryOutOfRange)?;
        let mut cookie = format!("{}={}; Path=/", self.cookie_name, encoded);
        if let Some(domain) = &self.cookie_domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        cookie.push_str("; Expires=");
        cookie.push_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        cookie.push_str("; HttpOnly");
        if self.secure {
            cookie.push_str("; Secure");
        }
        Ok(cookie)
    }
}

/// The token pair of one request, decoded eagerly and re-encoded at commit.
#[derive(Debug)]
pub struct SessionTokenStore {
    settings: Arc<SessionSettings>,
    tokens: TokenPair,
    span: Span,
}

impl SessionTokenStore {
    pub fn new(settings: Arc<SessionSettings>, span: Span) -> Self {
        Self {
            settings,
            tokens: TokenPair::default(),
            span,
        }
    }

    pub fn auth_token(&self) -> &str {
        &self.tokens.auth_token
    }

    pub fn visit_token(&self) -> &str {
        &self.tokens.visit_token
    }

    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    pub fn read(&mut self, headers: &HeaderMap) {
        self.read_at(headers, Utc::now());
    }

    /// Decode the incoming cookie, falling back to a zero pair on any
    /// failure, then renew and stamp both tokens.
    pub fn read_at(&mut self, headers: &HeaderMap, now: DateTime<Utc>) {
        let name = &self.settings.cookie_name;
        self.tokens = match find_cookie(headers, name) {
            Some(value) => match self.settings.codec.decode_at(name, value, now) {
                Ok(tokens) => tokens,
                Err(err) => {
                    let err = SessionError::CookieDecode(err);
                    tracing::warn!(parent: &self.span, error = %err, "Discarding session cookie");
                    TokenPair::default()
                }
            },
            None => {
                tracing::debug!(parent: &self.span, cookie = %name, "No session cookie present");
                TokenPair::default()
            }
        };

        let renewal = self.tokens.renew_expired(&self.settings.lifetimes, now);
        if renewal.auth || renewal.visit {
            tracing::debug!(
                parent: &self.span,
                auth = renewal.auth,
                visit = renewal.visit,
                "Minted session tokens"
            );
        }
        self.tokens.stamp_renewed(now);
    }

    pub fn reset(&mut self) {
        self.reset_at(Utc::now());
    }

    /// Rotate both tokens, e.g. on logout.
    pub fn reset_at(&mut self, now: DateTime<Utc>) {
        self.tokens.rotate(now);
    }

    pub fn write(&mut self, headers: &mut HeaderMap) -> Result<(), SessionError> {
        self.write_at(headers, Utc::now())
    }

    /// Attach the cookie. On failure the cookie is omitted and the response
    /// proceeds; the error is logged and returned for the caller's benefit.
    pub fn write_at(&mut self, headers: &mut HeaderMap, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.tokens.renew_expired(&self.settings.lifetimes, now);

        let result = self
            .settings
            .codec
            .encode_at(&self.settings.cookie_name, &self.tokens, now)
            .map_err(SessionError::CookieEncode)
            .and_then(|encoded| self.settings.render_cookie(&encoded, now))
            .and_then(|cookie| HeaderValue::from_str(&cookie).map_err(|_| SessionError::InvalidHeader));

        match result {
            Ok(cookie) => {
                headers.append(SET_COOKIE, cookie);
                Ok(())
            }
            Err(err) => {
                tracing::error!(parent: &self.span, error = %err, "Omitting session cookie");
                Err(err)
            }
        }
    }
}
