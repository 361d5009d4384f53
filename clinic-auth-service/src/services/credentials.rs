//! Credential Store: identity, role and status flags of users.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::models::{normalize_email, NewUser, Role, User};
use crate::repository::{constraints, Repository};
use crate::services::cache::{presence_key, CacheStore, PresenceEntry, PRESENCE_TTL_SECONDS};
use crate::services::provisioner::ProfileProvisioner;
use crate::services::ServiceError;
use crate::utils::{CredentialHasher, Password, PasswordHashString};

/// Everything needed to create an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: Password,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn Repository>,
    hasher: Arc<dyn CredentialHasher>,
    cache: Arc<dyn CacheStore>,
    provisioner: ProfileProvisioner,
}

impl CredentialStore {
    pub fn new(
        repo: Arc<dyn Repository>,
        hasher: Arc<dyn CredentialHasher>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            repo,
            hasher,
            cache,
            provisioner: ProfileProvisioner,
        }
    }

    /// Persists a new user together with its role's profile.
    #[tracing::instrument(skip(self, account), fields(role = %account.role))]
    pub async fn create_user(&self, account: NewAccount) -> Result<User, ServiceError> {
        self.insert(account, false).await
    }

    /// Bootstrap an administrator. Admins get no profile.
    #[tracing::instrument(skip(self, account))]
    pub async fn create_superuser(&self, mut account: NewAccount) -> Result<User, ServiceError> {
        account.role = Role::Admin;
        self.insert(account, true).await
    }

    async fn insert(&self, account: NewAccount, is_staff: bool) -> Result<User, ServiceError> {
        let email = normalize_email(&account.email);
        if !email.validate_email() {
            return Err(ServiceError::InvalidEmail);
        }

        let password_hash = self.hasher.hash(&account.password)?;

        let user = User::new(NewUser {
            email,
            password_hash: password_hash.into_string(),
            first_name: account.first_name.trim().to_string(),
            last_name: account.last_name.trim().to_string(),
            role: account.role,
            is_staff,
        });

        let profile = self.provisioner.profile_for(&user);

        match self.repo.create_user(&user, profile.as_ref()).await {
            Ok(()) => {}
            Err(e) if e.is_conflict_on(constraints::USER_EMAIL) => {
                return Err(ServiceError::DuplicateEmail)
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            user_id = %user.id,
            role = %user.role,
            profile_provisioned = profile.is_some(),
            "User created"
        );
        Ok(user)
    }

    /// Deactivation is checked before the password so a deactivated account
    /// is always reported as such.
    #[tracing::instrument(skip(self, email, password))]
    pub async fn authenticate(&self, email: &str, password: &Password) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        let user = self
            .repo
            .find_user_by_email(&email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "Login attempt on deactivated account");
            return Err(ServiceError::AccountDeactivated);
        }

        let hash = PasswordHashString::new(user.password_hash.clone());
        if !self.hasher.verify(password, &hash) {
            tracing::warn!(user_id = %user.id, "Invalid password");
            return Err(ServiceError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Idempotent: a second call keeps the original verification time.
    pub async fn mark_email_verified(&self, user_id: Uuid) -> Result<User, ServiceError> {
        let user = self
            .repo
            .mark_email_verified(user_id, Utc::now())
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        tracing::info!(user_id = %user.id, "Email verified");
        Ok(user)
    }

    /// Stores the flag and stamps `last_seen`, then mirrors both into the
    /// presence cache. Cache failures are logged only.
    pub async fn update_online_status(
        &self,
        user_id: Uuid,
        is_online: bool,
    ) -> Result<User, ServiceError> {
        let now = Utc::now();
        let user = self
            .repo
            .set_online_status(user_id, is_online, now)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let entry = PresenceEntry {
            is_online,
            last_seen: now,
        };
        match serde_json::to_string(&entry) {
            Ok(value) => {
                if let Err(e) = self
                    .cache
                    .set_cache(&presence_key(user_id), &value, PRESENCE_TTL_SECONDS)
                    .await
                {
                    tracing::warn!(user_id = %user_id, error = %e, "Failed to cache presence");
                }
            }
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Failed to encode presence"),
        }

        Ok(user)
    }

    /// Soft (de)activation. Deactivating revokes every refresh session.
    #[tracing::instrument(skip(self))]
    pub async fn set_active(&self, user_id: Uuid, is_active: bool) -> Result<User, ServiceError> {
        let user = self
            .repo
            .set_active(user_id, is_active)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        if !is_active {
            let revoked = self.repo.revoke_user_sessions(user_id).await?;
            tracing::info!(user_id = %user_id, revoked, "User deactivated");
        } else {
            tracing::info!(user_id = %user_id, "User activated");
        }
        Ok(user)
    }

    pub async fn find_by_id(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.repo
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.repo.find_user_by_email(&normalize_email(email)).await?)
    }

    pub async fn list_active_by_role(&self, role: Role) -> Result<Vec<User>, ServiceError> {
        Ok(self.repo.list_active_users_by_role(role).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryRepository, ProfileRepository};
    use crate::services::MockCache;
    use crate::utils::Argon2Hasher;

    struct Fixture {
        store: CredentialStore,
        repo: Arc<InMemoryRepository>,
        cache: Arc<MockCache>,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(MockCache::new());
        let hasher = Arc::new(Argon2Hasher::with_cost(8, 1, 1).unwrap());
        Fixture {
            store: CredentialStore::new(repo.clone(), hasher, cache.clone()),
            repo,
            cache,
        }
    }

    fn account(email: &str, role: Role) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password: Password::new("pw12345678".to_string()),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn create_user_normalizes_and_hashes() {
        let f = fixture();
        let user = f.store.create_user(account("  Jane@X.com ", Role::Patient)).await.unwrap();

        assert_eq!(user.email, "jane@x.com");
        assert_ne!(user.password_hash, "pw12345678");
        assert!(!user.is_verified);
        assert!(f.repo.find_patient_profile(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_email_is_reported() {
        let f = fixture();
        f.store.create_user(account("a@x.com", Role::Patient)).await.unwrap();
        let err = f.store.create_user(account("A@X.COM", Role::Consultant)).await.unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateEmail));
    }

    #[tokio::test]
    async fn invalid_email_is_rejected() {
        let f = fixture();
        let err = f.store.create_user(account("not-an-email", Role::Patient)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidEmail));
    }

    #[tokio::test]
    async fn superuser_is_staff_admin_without_profile() {
        let f = fixture();
        let admin = f.store.create_superuser(account("root@x.com", Role::Patient)).await.unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.is_staff);
        assert!(f.repo.find_patient_profile(admin.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn authenticate_checks_password() {
        let f = fixture();
        f.store.create_user(account("a@x.com", Role::Patient)).await.unwrap();

        let ok = f.store.authenticate("A@x.com", &Password::new("pw12345678".into())).await;
        assert!(ok.is_ok());

        let bad = f.store.authenticate("a@x.com", &Password::new("wrong".into())).await;
        assert!(matches!(bad, Err(ServiceError::InvalidCredentials)));

        let unknown = f.store.authenticate("b@x.com", &Password::new("pw12345678".into())).await;
        assert!(matches!(unknown, Err(ServiceError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn deactivated_account_wins_over_password_check() {
        let f = fixture();
        let user = f.store.create_user(account("a@x.com", Role::Patient)).await.unwrap();
        f.store.set_active(user.id, false).await.unwrap();

        for pw in ["pw12345678", "wrong"] {
            let err = f.store.authenticate("a@x.com", &Password::new(pw.into())).await.unwrap_err();
            assert!(matches!(err, ServiceError::AccountDeactivated));
        }
    }

    #[tokio::test]
    async fn mark_email_verified_is_idempotent() {
        let f = fixture();
        let user = f.store.create_user(account("a@x.com", Role::Patient)).await.unwrap();

        let first = f.store.mark_email_verified(user.id).await.unwrap();
        let second = f.store.mark_email_verified(user.id).await.unwrap();

        assert!(second.is_verified);
        assert_eq!(first.email_verified_at, second.email_verified_at);
    }

    #[tokio::test]
    async fn online_status_survives_cache_failure() {
        let f = fixture();
        let user = f.store.create_user(account("a@x.com", Role::Patient)).await.unwrap();

        f.store.update_online_status(user.id, true).await.unwrap();
        let cached = f.cache.get_cache(&presence_key(user.id)).await.unwrap().unwrap();
        let entry: PresenceEntry = serde_json::from_str(&cached).unwrap();
        assert!(entry.is_online);

        f.cache.set_failing(true);
        let offline = f.store.update_online_status(user.id, false).await.unwrap();
        assert!(!offline.is_online);
        assert!(offline.last_seen >= user.created_at);
    }

    #[tokio::test]
    async fn list_active_by_role_skips_deactivated_and_other_roles() {
        let f = fixture();
        let first = f.store.create_user(account("p1@x.com", Role::Patient)).await.unwrap();
        let second = f.store.create_user(account("p2@x.com", Role::Patient)).await.unwrap();
        f.store.create_user(account("c@x.com", Role::Consultant)).await.unwrap();
        f.store.set_active(first.id, false).await.unwrap();

        let patients = f.store.list_active_by_role(Role::Patient).await.unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].id, second.id);
    }
}
