//! Authentication Service: registration, login, logout and access-token
//! refresh on top of the credential store and JWT issuance.

use std::sync::Arc;

use crate::models::{RefreshSession, Role, User};
use crate::repository::Repository;
use crate::services::cache::CacheStore;
use crate::services::credentials::{CredentialStore, NewAccount};
use crate::services::jwt::{AccessTokenClaims, JwtService, TokenError};
use crate::services::verification::EmailVerificationService;
use crate::services::ServiceError;
use crate::utils::Password;

/// Input to [`AuthService::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: Password,
    pub confirm_password: Password,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

/// A signed-in user with a fresh token pair.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// A newly minted access token.
#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub user: User,
    pub access_token: String,
    pub expires_in: i64,
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ServiceError::ExpiredToken,
            TokenError::Invalid => ServiceError::InvalidToken,
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn Repository>,
    cache: Arc<dyn CacheStore>,
    jwt: JwtService,
    credentials: CredentialStore,
    verification: EmailVerificationService,
}

impl AuthService {
    pub fn new(
        repo: Arc<dyn Repository>,
        cache: Arc<dyn CacheStore>,
        jwt: JwtService,
        credentials: CredentialStore,
        verification: EmailVerificationService,
    ) -> Self {
        Self {
            repo,
            cache,
            jwt,
            credentials,
            verification,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Creates the account, attempts the verification email, then signs the
    /// new user in. A failed email does not fail registration; a failed
    /// sign-in right after creation is reported as
    /// [`ServiceError::RegisteredButLoginFailed`].
    #[tracing::instrument(skip(self, registration), fields(role = %registration.role))]
    pub async fn register(&self, registration: Registration) -> Result<AuthSession, ServiceError> {
        if registration.password.as_str() != registration.confirm_password.as_str() {
            return Err(ServiceError::PasswordMismatch);
        }

        let user = self
            .credentials
            .create_user(NewAccount {
                email: registration.email,
                password: registration.password.clone(),
                first_name: registration.first_name,
                last_name: registration.last_name,
                role: registration.role,
            })
            .await?;

        if !self.verification.send_verification_email(&user).await {
            tracing::warn!(user_id = %user.id, "Registered without a delivered verification email");
        }

        let user = self
            .credentials
            .authenticate(&user.email, &registration.password)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user.id, error = %e, "Login right after registration failed");
                ServiceError::RegisteredButLoginFailed(e.to_string())
            })?;

        let session = self.start_session(user).await?;
        metrics::counter!("auth_registrations_total", "role" => session.user.role.as_str())
            .increment(1);
        Ok(session)
    }

    #[tracing::instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &Password) -> Result<AuthSession, ServiceError> {
        let user = match self.credentials.authenticate(email, password).await {
            Ok(user) => user,
            Err(e) => {
                metrics::counter!("auth_login_failures_total").increment(1);
                return Err(e);
            }
        };

        let session = self.start_session(user).await?;
        tracing::info!(user_id = %session.user.id, "User logged in");
        metrics::counter!("auth_logins_total").increment(1);
        Ok(session)
    }

    /// Marks the user offline before anything else and blacklists the access
    /// token that made the call. When a refresh token is given its session is
    /// revoked; a refresh token that is malformed, expired or not the
    /// caller's is reported as [`ServiceError::InvalidToken`].
    #[tracing::instrument(skip(self, user, access_claims, refresh_token), fields(user_id = %user.id))]
    pub async fn logout(
        &self,
        user: &User,
        access_claims: Option<&AccessTokenClaims>,
        refresh_token: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.credentials.update_online_status(user.id, false).await?;

        if let Some(claims) = access_claims {
            if let Err(e) = self
                .cache
                .blacklist_token(&claims.jti, claims.remaining_seconds())
                .await
            {
                tracing::warn!(error = %e, "Failed to blacklist access token");
            }
        }

        if let Some(refresh_token) = refresh_token {
            let claims = self
                .jwt
                .validate_refresh_token(refresh_token)
                .map_err(|_| ServiceError::InvalidToken)?;
            if claims.user_id() != Some(user.id) {
                tracing::warn!("Logout presented another user's refresh token");
                return Err(ServiceError::InvalidToken);
            }
            let session_id = claims.session_id().ok_or(ServiceError::InvalidToken)?;

            if !self.repo.revoke_refresh_session(session_id).await? {
                tracing::debug!(session_id = %session_id, "Refresh session already revoked");
            }
        }

        tracing::info!("User logged out");
        Ok(())
    }

    /// Mints a new access token from a live refresh session. The refresh
    /// token itself is not rotated.
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshedAccess, ServiceError> {
        let claims = self.jwt.validate_refresh_token(refresh_token)?;
        let user_id = claims.user_id().ok_or(ServiceError::InvalidToken)?;
        let session_id = claims.session_id().ok_or(ServiceError::InvalidToken)?;

        let session = self
            .repo
            .find_refresh_session(session_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;
        if session.user_id != user_id || !session.matches(refresh_token) {
            return Err(ServiceError::InvalidToken);
        }
        if session.is_revoked() {
            tracing::warn!(session_id = %session_id, "Revoked refresh token presented");
            return Err(ServiceError::InvalidToken);
        }
        if !session.is_valid() {
            return Err(ServiceError::ExpiredToken);
        }

        let user = self
            .repo
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;
        if !user.is_active {
            return Err(ServiceError::AccountDeactivated);
        }

        let access = self.jwt.issue_access_token(&user)?;
        let user = self.credentials.update_online_status(user.id, true).await?;

        Ok(RefreshedAccess {
            user,
            access_token: access.token,
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }

    async fn start_session(&self, user: User) -> Result<AuthSession, ServiceError> {
        let access = self.jwt.issue_access_token(&user)?;
        let refresh = self.jwt.issue_refresh_token(user.id)?;
        let session_id = refresh.claims.session_id().ok_or(ServiceError::InvalidToken)?;

        self.repo
            .insert_refresh_session(&RefreshSession::new(
                session_id,
                user.id,
                &refresh.token,
                self.jwt.refresh_token_expiry_days(),
            ))
            .await?;

        let user = self.credentials.update_online_status(user.id, true).await?;

        Ok(AuthSession {
            user,
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }
}
