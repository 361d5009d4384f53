//! Email Verification Service: sends verification links, throttles resends
//! and redeems tokens.

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::VerificationConfig;
use crate::models::User;
use crate::services::credentials::CredentialStore;
use crate::services::email::Notifier;
use crate::services::ledger::VerificationLedger;
use crate::services::ServiceError;

/// How many verification emails a user may trigger within a window.
#[derive(Debug, Clone, Copy)]
pub struct ResendPolicy {
    pub limit: i64,
    pub window: Duration,
}

impl Default for ResendPolicy {
    fn default() -> Self {
        Self {
            limit: 3,
            window: Duration::minutes(5),
        }
    }
}

/// Result of a resend request that passed the "already verified" check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    Sent,
    Throttled,
    DeliveryFailed,
}

impl ResendOutcome {
    pub fn email_sent(&self) -> bool {
        matches!(self, ResendOutcome::Sent)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ResendOutcome::Sent => "Verification sent successfully to email",
            ResendOutcome::Throttled => {
                "Too many verification emails sent. Please wait before requesting another"
            }
            ResendOutcome::DeliveryFailed => "Failed to send verification email",
        }
    }
}

#[derive(Clone)]
pub struct EmailVerificationService {
    ledger: VerificationLedger,
    credentials: CredentialStore,
    notifier: Arc<dyn Notifier>,
    frontend_url: String,
    policy: ResendPolicy,
}

impl EmailVerificationService {
    pub fn new(
        ledger: VerificationLedger,
        credentials: CredentialStore,
        notifier: Arc<dyn Notifier>,
        frontend_url: impl Into<String>,
        policy: ResendPolicy,
    ) -> Self {
        Self {
            ledger,
            credentials,
            notifier,
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
            policy,
        }
    }

    pub fn from_config(
        config: &VerificationConfig,
        ledger: VerificationLedger,
        credentials: CredentialStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let policy = ResendPolicy {
            limit: config.resend_limit,
            window: Duration::seconds(config.resend_window_seconds),
        };
        Self::new(ledger, credentials, notifier, config.frontend_url.clone(), policy)
    }

    pub fn verification_url(&self, token: Uuid) -> String {
        format!("{}/verify-email?token={}", self.frontend_url, token)
    }

    /// Issues a fresh token and makes one delivery attempt. Every failure,
    /// including issuance, is logged and reported as `false`.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn send_verification_email(&self, user: &User) -> bool {
        match self.ledger.issue(user.id).await {
            Ok(token) => self.deliver(user, token.token).await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to issue verification token");
                false
            }
        }
    }

    async fn deliver(&self, user: &User, token: Uuid) -> bool {
        let url = self.verification_url(token);
        match self
            .notifier
            .send_verification_email(&user.email, &user.first_name, &url)
            .await
        {
            Ok(()) => {
                metrics::counter!("verification_emails_sent_total").increment(1);
                true
            }
            Err(e) => {
                metrics::counter!("verification_email_failures_total").increment(1);
                tracing::error!(error = %e, "Failed to send verification email");
                false
            }
        }
    }

    /// Redeems the token and marks its owner verified.
    #[tracing::instrument(skip(self))]
    pub async fn verify_email_token(&self, token: Uuid) -> Result<User, ServiceError> {
        let user_id = self.ledger.redeem(token).await?;
        self.credentials.mark_email_verified(user_id).await
    }

    /// Already-verified users are an error. A user at the limit is throttled
    /// without a token being issued.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn resend_verification_email(
        &self,
        user: &User,
    ) -> Result<ResendOutcome, ServiceError> {
        if user.is_verified {
            return Err(ServiceError::AlreadyVerified);
        }

        let issued = self
            .ledger
            .issue_within_limit(user.id, self.policy.window, self.policy.limit)
            .await?;
        let Some(token) = issued else {
            tracing::warn!(limit = self.policy.limit, "Verification resend throttled");
            metrics::counter!("verification_resend_throttled_total").increment(1);
            return Ok(ResendOutcome::Throttled);
        };

        if self.deliver(user, token.token).await {
            Ok(ResendOutcome::Sent)
        } else {
            Ok(ResendOutcome::DeliveryFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::repository::{InMemoryRepository, VerificationTokenRepository};
    use crate::services::cache::MockCache;
    use crate::services::credentials::NewAccount;
    use crate::services::email::MockNotifier;
    use crate::utils::{Argon2Hasher, Password};

    struct Fixture {
        service: EmailVerificationService,
        credentials: CredentialStore,
        notifier: Arc<MockNotifier>,
        repo: Arc<InMemoryRepository>,
    }

    fn fixture(policy: ResendPolicy) -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        let credentials = CredentialStore::new(
            repo.clone(),
            Arc::new(Argon2Hasher::with_cost(8, 1, 1).unwrap()),
            Arc::new(MockCache::new()),
        );
        let notifier = Arc::new(MockNotifier::new());
        let ledger = VerificationLedger::new(repo.clone(), Duration::hours(24));
        Fixture {
            service: EmailVerificationService::new(
                ledger,
                credentials.clone(),
                notifier.clone(),
                "http://localhost:3000/",
                policy,
            ),
            credentials,
            notifier,
            repo,
        }
    }

    async fn user(f: &Fixture) -> User {
        f.credentials
            .create_user(NewAccount {
                email: "a@x.com".to_string(),
                password: Password::new("pw12345678".to_string()),
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                role: Role::Patient,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sends_link_with_token() {
        let f = fixture(ResendPolicy::default());
        let user = user(&f).await;

        assert!(f.service.send_verification_email(&user).await);

        let tokens = f.repo.list_verification_tokens(user.id).await.unwrap();
        let sent = f.notifier.sent_to("a@x.com");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].first_name, "Jane");
        assert_eq!(
            sent[0].verification_url,
            format!("http://localhost:3000/verify-email?token={}", tokens[0].token)
        );
    }

    #[tokio::test]
    async fn delivery_failure_still_issues_token() {
        let f = fixture(ResendPolicy::default());
        let user = user(&f).await;
        f.notifier.set_failing(true);

        assert!(!f.service.send_verification_email(&user).await);
        assert_eq!(f.repo.list_verification_tokens(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn verify_marks_user_verified() {
        let f = fixture(ResendPolicy::default());
        let user = user(&f).await;
        f.service.send_verification_email(&user).await;
        let token = f.repo.list_verification_tokens(user.id).await.unwrap()[0].token;

        let verified = f.service.verify_email_token(token).await.unwrap();
        assert!(verified.is_verified);
        assert!(verified.email_verified_at.is_some());

        assert!(matches!(
            f.service.verify_email_token(token).await.unwrap_err(),
            ServiceError::TokenAlreadyUsed
        ));
    }

    #[tokio::test]
    async fn fourth_resend_is_throttled_without_a_token() {
        let f = fixture(ResendPolicy::default());
        let user = user(&f).await;

        for _ in 0..3 {
            let outcome = f.service.resend_verification_email(&user).await.unwrap();
            assert_eq!(outcome, ResendOutcome::Sent);
            assert!(outcome.email_sent());
        }
        let outcome = f.service.resend_verification_email(&user).await.unwrap();
        assert_eq!(outcome, ResendOutcome::Throttled);
        assert!(!outcome.email_sent());
        assert!(outcome.reason().starts_with("Too many verification emails"));

        assert_eq!(f.repo.list_verification_tokens(user.id).await.unwrap().len(), 3);
        assert_eq!(f.notifier.sent().len(), 3);
    }

    #[tokio::test]
    async fn throttle_lifts_after_window() {
        let f = fixture(ResendPolicy {
            limit: 1,
            window: Duration::milliseconds(200),
        });
        let user = user(&f).await;

        assert_eq!(
            f.service.resend_verification_email(&user).await.unwrap(),
            ResendOutcome::Sent
        );
        assert_eq!(
            f.service.resend_verification_email(&user).await.unwrap(),
            ResendOutcome::Throttled
        );

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        assert_eq!(
            f.service.resend_verification_email(&user).await.unwrap(),
            ResendOutcome::Sent
        );
    }

    #[tokio::test]
    async fn resend_for_verified_user_is_an_error() {
        let f = fixture(ResendPolicy::default());
        let user = user(&f).await;
        let verified = f.credentials.mark_email_verified(user.id).await.unwrap();

        assert!(matches!(
            f.service.resend_verification_email(&verified).await.unwrap_err(),
            ServiceError::AlreadyVerified
        ));
    }

    #[tokio::test]
    async fn resend_reports_delivery_failure() {
        let f = fixture(ResendPolicy::default());
        let user = user(&f).await;
        f.notifier.set_failing(true);

        let outcome = f.service.resend_verification_email(&user).await.unwrap();
        assert_eq!(outcome, ResendOutcome::DeliveryFailed);
        assert_eq!(outcome.reason(), "Failed to send verification email");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_resends_issue_at_most_the_limit() {
        let f = fixture(ResendPolicy::default());
        let user = user(&f).await;
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = f.service.clone();
                let user = user.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    service.resend_verification_email(&user).await.unwrap()
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let sent = outcomes.iter().filter(|o| **o == ResendOutcome::Sent).count();
        let throttled = outcomes.iter().filter(|o| **o == ResendOutcome::Throttled).count();
        assert_eq!(sent, 3);
        assert_eq!(throttled, 5);
        assert_eq!(f.repo.list_verification_tokens(user.id).await.unwrap().len(), 3);
        assert_eq!(f.notifier.sent().len(), 3);
    }
}
