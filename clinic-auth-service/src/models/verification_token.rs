use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Single-use, time-boxed proof of control over an email address.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationToken {
    pub id: i64,
    pub user_id: Uuid,
    pub token: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
}

impl VerificationToken {
    pub fn new(id: i64, user_id: Uuid, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            token: Uuid::new_v4(),
            created_at: now,
            expires_at: now + ttl,
            is_used: false,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        !self.is_used && !self.is_expired()
    }
}
