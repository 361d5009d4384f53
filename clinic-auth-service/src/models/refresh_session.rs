//! Refresh session model - one row per issued refresh token.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh session entity. `session_id` is the refresh token's `jti`.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token_hash_text: String,
    pub expiry_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl RefreshSession {
    pub fn new(session_id: Uuid, user_id: Uuid, token: &str, expiry_days: i64) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            token_hash_text: hash_token(token),
            expiry_utc: now + Duration::days(expiry_days),
            revoked_utc: None,
            created_utc: now,
        }
    }

    /// Check if session is valid (not expired, not revoked).
    pub fn is_valid(&self) -> bool {
        self.revoked_utc.is_none() && self.expiry_utc > Utc::now()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }

    pub fn matches(&self, token: &str) -> bool {
        self.token_hash_text == hash_token(token)
    }
}

/// Hex SHA-256 of a raw token; raw refresh tokens are never stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
