//! Auth/visit token pair and its renewal rules.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lengths of a token's life after its last renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub auth: Duration,
    pub visit: Duration,
}

impl TokenLifetimes {
    pub fn new(auth: Duration, visit: Duration) -> Self {
        Self { auth, visit }
    }

    /// The longer of the two, used for cookie expiry.
    pub fn longest(&self) -> Duration {
        self.auth.max(self.visit)
    }
}

/// Which tokens a renewal check regenerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Renewal {
    pub auth: bool,
    pub visit: bool,
}

/// The two independently aged tokens carried in the session cookie.
///
/// The zero value (empty tokens, epoch timestamps) is what a request without
/// a valid cookie starts from; the first renewal check mints both tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub auth_token: String,
    pub auth_created_at: DateTime<Utc>,
    pub auth_renewed_at: DateTime<Utc>,

    pub visit_token: String,
    pub visit_created_at: DateTime<Utc>,
    pub visit_renewed_at: DateTime<Utc>,
}

impl TokenPair {
    /// Mint any token that is malformed or whose lifetime since its last
    /// renewal has passed. The two kinds are checked independently.
    pub fn renew_expired(&mut self, lifetimes: &TokenLifetimes, now: DateTime<Utc>) -> Renewal {
        Renewal {
            auth: refresh(
                &mut self.auth_token,
                &mut self.auth_created_at,
                self.auth_renewed_at,
                lifetimes.auth,
                now,
            ),
            visit: refresh(
                &mut self.visit_token,
                &mut self.visit_created_at,
                self.visit_renewed_at,
                lifetimes.visit,
                now,
            ),
        }
    }

    pub fn stamp_renewed(&mut self, now: DateTime<Utc>) {
        self.auth_renewed_at = now;
        self.visit_renewed_at = now;
    }

    /// Unconditionally mint both tokens.
    pub fn rotate(&mut self, now: DateTime<Utc>) {
        self.auth_token = mint_token();
        self.auth_created_at = now;
        self.visit_token = mint_token();
        self.visit_created_at = now;
        self.stamp_renewed(now);
    }
}

fn refresh(
    token: &mut String,
    created_at: &mut DateTime<Utc>,
    renewed_at: DateTime<Utc>,
    lifetime: Duration,
    now: DateTime<Utc>,
) -> bool {
    let expired = renewed_at
        .checked_add_signed(lifetime)
        .is_some_and(|deadline| now > deadline);

    if expired || !is_well_formed(token) {
        *token = mint_token();
        *created_at = now;
        return true;
    }
    false
}

/// A fresh random token: a UUID v4 as 32 hex digits, no hyphens.
pub fn mint_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn is_well_formed(token: &str) -> bool {
    token.len() == 32 && Uuid::try_parse(token).is_ok()
}
