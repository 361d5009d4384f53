//! Verification Token Ledger: issues, supersedes and redeems single-use
//! email verification tokens.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::VerificationToken;
use crate::repository::{RedeemOutcome, Repository};
use crate::services::ServiceError;

#[derive(Clone)]
pub struct VerificationLedger {
    repo: Arc<dyn Repository>,
    ttl: Duration,
}

impl VerificationLedger {
    pub fn new(repo: Arc<dyn Repository>, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    /// Invalidates every unused token of the user and creates a fresh one.
    /// The repository serialises concurrent calls for the same user.
    pub async fn issue(&self, user_id: Uuid) -> Result<VerificationToken, ServiceError> {
        let token = self.repo.issue_verification_token(user_id, self.ttl).await?;
        tracing::debug!(user_id = %user_id, token_id = token.id, "Verification token issued");
        Ok(token)
    }

    /// Issues only while fewer than `limit` tokens were created within the
    /// trailing `window`. The check and the issuance are one repository step,
    /// so racing callers cannot overshoot the limit. `None` means throttled.
    pub async fn issue_within_limit(
        &self,
        user_id: Uuid,
        window: Duration,
        limit: i64,
    ) -> Result<Option<VerificationToken>, ServiceError> {
        let since = Utc::now() - window;
        let token = self
            .repo
            .issue_verification_token_within_limit(user_id, self.ttl, since, limit)
            .await?;
        if let Some(token) = &token {
            tracing::debug!(user_id = %user_id, token_id = token.id, "Verification token issued");
        }
        Ok(token)
    }

    /// Marks the token used and returns its owner. An expired token is
    /// reported as expired even when it was never used.
    pub async fn redeem(&self, token: Uuid) -> Result<Uuid, ServiceError> {
        match self.repo.redeem_verification_token(token).await? {
            RedeemOutcome::Redeemed { user_id } => Ok(user_id),
            RedeemOutcome::NotFound => Err(ServiceError::TokenNotFound),
            RedeemOutcome::Expired => Err(ServiceError::TokenExpired),
            RedeemOutcome::AlreadyUsed => Err(ServiceError::TokenAlreadyUsed),
        }
    }

    /// Tokens created within the trailing `window`, used or not.
    pub async fn count_recent_issuances(
        &self,
        user_id: Uuid,
        window: Duration,
    ) -> Result<i64, ServiceError> {
        let since = Utc::now() - window;
        Ok(self.repo.count_verification_tokens_since(user_id, since).await?)
    }
}
