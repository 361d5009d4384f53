//! Storage capability. Services depend on the `Repository` trait object;
//! `PgRepository` backs production, `InMemoryRepository` backs tests and
//! database-less local runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AvailabilitySlot, ConsultantProfile, PatientProfile, Profile, RefreshSession, Review, Role,
    Speciality, User, VerificationToken,
};

pub use memory::InMemoryRepository;
pub use postgres::PgRepository;

/// Names of the unique constraints a `Conflict` can report.
pub mod constraints {
    pub const USER_EMAIL: &str = "users_email_key";
    pub const CONSULTANT_LICENSE: &str = "consultant_profile_license_key";
    pub const REVIEW_PAIR: &str = "consultant_review_pair_key";
    pub const AVAILABILITY_SLOT: &str = "consultant_availability_slot_key";
    pub const SPECIALITY_NAME: &str = "specialties_name_key";
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn is_conflict_on(&self, constraint: &str) -> bool {
        matches!(self, RepositoryError::Conflict(c) if c == constraint)
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique").to_string();
                return RepositoryError::Conflict(constraint);
            }
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                RepositoryError::Unavailable(err.to_string())
            }
            other => RepositoryError::Database(other),
        }
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Result of an atomic check-then-mark-used on a verification token.
/// Expiry is reported ahead of prior use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed { user_id: Uuid },
    NotFound,
    Expired,
    AlreadyUsed,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts the user and, when given, its profile in one unit of work.
    async fn create_user(&self, user: &User, profile: Option<&Profile>) -> RepoResult<()>;
    async fn find_user_by_id(&self, id: Uuid) -> RepoResult<Option<User>>;
    /// `email` must already be normalised.
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_users_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<User>>;
    /// Active users of one role, newest first.
    async fn list_active_users_by_role(&self, role: Role) -> RepoResult<Vec<User>>;
    /// Sets `is_verified`; keeps the first `email_verified_at` stamp.
    async fn mark_email_verified(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<Option<User>>;
    async fn set_online_status(
        &self,
        id: Uuid,
        is_online: bool,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<User>>;
    async fn set_active(&self, id: Uuid, is_active: bool) -> RepoResult<Option<User>>;
}

#[async_trait]
pub trait VerificationTokenRepository: Send + Sync {
    /// Marks every unused token of `user_id` used and inserts a fresh one,
    /// serialised per user.
    async fn issue_verification_token(
        &self,
        user_id: Uuid,
        ttl: Duration,
    ) -> RepoResult<VerificationToken>;
    /// Issues like `issue_verification_token`, but only while fewer than
    /// `limit` tokens were created after `since`. The count and the insert
    /// run under the same per-user lock; `None` means the limit was reached
    /// and nothing was written.
    async fn issue_verification_token_within_limit(
        &self,
        user_id: Uuid,
        ttl: Duration,
        since: DateTime<Utc>,
        limit: i64,
    ) -> RepoResult<Option<VerificationToken>>;
    async fn redeem_verification_token(&self, token: Uuid) -> RepoResult<RedeemOutcome>;
    /// Tokens created after `since`, used or not.
    async fn count_verification_tokens_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> RepoResult<i64>;
    async fn list_verification_tokens(&self, user_id: Uuid) -> RepoResult<Vec<VerificationToken>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert_refresh_session(&self, session: &RefreshSession) -> RepoResult<()>;
    async fn find_refresh_session(&self, session_id: Uuid) -> RepoResult<Option<RefreshSession>>;
    /// Returns false when the session was unknown or already revoked.
    async fn revoke_refresh_session(&self, session_id: Uuid) -> RepoResult<bool>;
    async fn revoke_user_sessions(&self, user_id: Uuid) -> RepoResult<u64>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_patient_profile(&self, user_id: Uuid) -> RepoResult<Option<PatientProfile>>;
    async fn update_patient_profile(&self, profile: &PatientProfile) -> RepoResult<()>;

    async fn find_consultant_profile(&self, id: Uuid) -> RepoResult<Option<ConsultantProfile>>;
    async fn find_consultant_profile_by_user(
        &self,
        user_id: Uuid,
    ) -> RepoResult<Option<ConsultantProfile>>;
    /// Available consultants whose user is active, highest rated first.
    async fn list_consultant_profiles(
        &self,
        speciality_id: Option<Uuid>,
    ) -> RepoResult<Vec<ConsultantProfile>>;
    async fn update_consultant_profile(&self, profile: &ConsultantProfile) -> RepoResult<()>;
    async fn verify_consultant(
        &self,
        id: Uuid,
        on: NaiveDate,
    ) -> RepoResult<Option<ConsultantProfile>>;
}

#[async_trait]
pub trait ConsultantRepository: Send + Sync {
    async fn insert_speciality(&self, speciality: &Speciality) -> RepoResult<()>;
    async fn find_speciality(&self, id: Uuid) -> RepoResult<Option<Speciality>>;
    async fn list_active_specialties(&self) -> RepoResult<Vec<Speciality>>;

    /// Inserts the review and recomputes the consultant's rating and review
    /// count in the same unit of work. Returns the refreshed profile.
    async fn insert_review(&self, review: &Review) -> RepoResult<ConsultantProfile>;
    async fn list_reviews(&self, consultant_id: Uuid) -> RepoResult<Vec<Review>>;

    async fn insert_availability_slot(&self, slot: &AvailabilitySlot) -> RepoResult<()>;
    /// Active slots ordered by day, then start time.
    async fn list_availability(&self, consultant_id: Uuid) -> RepoResult<Vec<AvailabilitySlot>>;
}

#[async_trait]
pub trait Repository:
    UserRepository
    + VerificationTokenRepository
    + SessionRepository
    + ProfileRepository
    + ConsultantRepository
{
    async fn health_check(&self) -> RepoResult<()>;
}
