//! PostgreSQL repository.
//!
//! Uses runtime-checked sqlx queries; per-user serialisation relies on row
//! locks taken inside transactions.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use uuid::Uuid;

use super::{
    ConsultantRepository, ProfileRepository, RedeemOutcome, RepoResult, Repository,
    RepositoryError, SessionRepository, UserRepository, VerificationTokenRepository,
};
use crate::models::{
    AvailabilitySlot, ConsultantProfile, PatientProfile, Profile, RefreshSession, Review, Role,
    Speciality, User, VerificationToken,
};

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Supersedes the user's unused tokens and inserts a fresh one inside a
    /// transaction holding the owner's row lock. With a `(since, limit)`
    /// quota the recent-issuance count is taken under the same lock and
    /// `None` is returned once the quota is spent.
    async fn issue_token_locked(
        &self,
        user_id: Uuid,
        ttl: Duration,
        quota: Option<(DateTime<Utc>, i64)>,
    ) -> RepoResult<Option<VerificationToken>> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the owner serialises concurrent issuance for one user.
        let owner: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if owner.is_none() {
            return Err(RepositoryError::NotFound("user"));
        }

        if let Some((since, limit)) = quota {
            let (recent,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM email_verification_tokens WHERE user_id = $1 AND created_at > $2",
            )
            .bind(user_id)
            .bind(since)
            .fetch_one(&mut *tx)
            .await?;
            if recent >= limit {
                tx.rollback().await?;
                return Ok(None);
            }
        }

        sqlx::query(
            "UPDATE email_verification_tokens SET is_used = TRUE WHERE user_id = $1 AND is_used = FALSE",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let now = Utc::now();
        let token = sqlx::query_as::<_, VerificationToken>(
            r#"
            INSERT INTO email_verification_tokens (user_id, token, created_at, expires_at, is_used)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now + ttl)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(token))
    }

    async fn insert_patient_profile(
        tx: &mut Transaction<'_, Postgres>,
        p: &PatientProfile,
    ) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO patient_profiles (id, user_id, blood_type, preferred_language,
                share_medical_history, allow_emergency_access, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(p.id)
        .bind(p.user_id)
        .bind(p.blood_type)
        .bind(&p.preferred_language)
        .bind(p.share_medical_history)
        .bind(p.allow_emergency_access)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_consultant_profile(
        tx: &mut Transaction<'_, Postgres>,
        c: &ConsultantProfile,
    ) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO consultant_profile (id, user_id, consultation_fee, consultation_duration,
                consultation_type, is_available, rating, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(c.id)
        .bind(c.user_id)
        .bind(c.consultation_fee)
        .bind(c.consultation_duration)
        .bind(c.consultation_type)
        .bind(c.is_available)
        .bind(c.rating)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgRepository {
    async fn create_user(&self, user: &User, profile: Option<&Profile>) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, role, is_active,
                is_staff, is_online, is_verified, last_seen, email_verified_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_online)
        .bind(user.is_verified)
        .bind(user.last_seen)
        .bind(user.email_verified_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await?;

        match profile {
            Some(Profile::Patient(p)) => Self::insert_patient_profile(&mut tx, p).await?,
            Some(Profile::Consultant(c)) => Self::insert_consultant_profile(&mut tx, c).await?,
            None => {}
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_users_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn list_active_users_by_role(&self, role: Role) -> RepoResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE role = $1 AND is_active = TRUE ORDER BY created_at DESC",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn mark_email_verified(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET is_verified = TRUE,
                email_verified_at = COALESCE(email_verified_at, $2),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_online_status(
        &self,
        id: Uuid,
        is_online: bool,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET is_online = $2, last_seen = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(is_online)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl VerificationTokenRepository for PgRepository {
    async fn issue_verification_token(
        &self,
        user_id: Uuid,
        ttl: Duration,
    ) -> RepoResult<VerificationToken> {
        self.issue_token_locked(user_id, ttl, None)
            .await?
            .ok_or(RepositoryError::NotFound("verification token"))
    }

    async fn issue_verification_token_within_limit(
        &self,
        user_id: Uuid,
        ttl: Duration,
        since: DateTime<Utc>,
        limit: i64,
    ) -> RepoResult<Option<VerificationToken>> {
        self.issue_token_locked(user_id, ttl, Some((since, limit))).await
    }

    async fn redeem_verification_token(&self, token: Uuid) -> RepoResult<RedeemOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, VerificationToken>(
            "SELECT * FROM email_verification_tokens WHERE token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(RedeemOutcome::NotFound),
        };
        if row.is_expired() {
            return Ok(RedeemOutcome::Expired);
        }
        if row.is_used {
            return Ok(RedeemOutcome::AlreadyUsed);
        }

        sqlx::query("UPDATE email_verification_tokens SET is_used = TRUE WHERE id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(RedeemOutcome::Redeemed {
            user_id: row.user_id,
        })
    }

    async fn count_verification_tokens_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> RepoResult<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM email_verification_tokens WHERE user_id = $1 AND created_at > $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn list_verification_tokens(&self, user_id: Uuid) -> RepoResult<Vec<VerificationToken>> {
        let tokens = sqlx::query_as::<_, VerificationToken>(
            "SELECT * FROM email_verification_tokens WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }
}

#[async_trait]
impl SessionRepository for PgRepository {
    async fn insert_refresh_session(&self, session: &RefreshSession) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_sessions (session_id, user_id, token_hash_text, expiry_utc, revoked_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.token_hash_text)
        .bind(session.expiry_utc)
        .bind(session.revoked_utc)
        .bind(session.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_session(&self, session_id: Uuid) -> RepoResult<Option<RefreshSession>> {
        let session = sqlx::query_as::<_, RefreshSession>(
            "SELECT * FROM refresh_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn revoke_refresh_session(&self, session_id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET revoked_utc = NOW() WHERE session_id = $1 AND revoked_utc IS NULL",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_user_sessions(&self, user_id: Uuid) -> RepoResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET revoked_utc = NOW() WHERE user_id = $1 AND revoked_utc IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProfileRepository for PgRepository {
    async fn find_patient_profile(&self, user_id: Uuid) -> RepoResult<Option<PatientProfile>> {
        let profile = sqlx::query_as::<_, PatientProfile>(
            "SELECT * FROM patient_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn update_patient_profile(&self, p: &PatientProfile) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE patient_profiles SET
                bio = $2, date_of_birth = $3, gender = $4, phone_number = $5, address = $6,
                city = $7, country = $8, postal_code = $9, emergency_contact_name = $10,
                emergency_contact_phone = $11, emergency_contact_relationship = $12,
                blood_type = $13, allergies = $14, chronic_conditions = $15,
                current_medications = $16, medical_notes = $17, share_medical_history = $18,
                allow_emergency_access = $19, preferred_language = $20, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(p.id)
        .bind(&p.bio)
        .bind(p.date_of_birth)
        .bind(p.gender)
        .bind(&p.phone_number)
        .bind(&p.address)
        .bind(&p.city)
        .bind(&p.country)
        .bind(&p.postal_code)
        .bind(&p.emergency_contact_name)
        .bind(&p.emergency_contact_phone)
        .bind(&p.emergency_contact_relationship)
        .bind(p.blood_type)
        .bind(&p.allergies)
        .bind(&p.chronic_conditions)
        .bind(&p.current_medications)
        .bind(&p.medical_notes)
        .bind(p.share_medical_history)
        .bind(p.allow_emergency_access)
        .bind(&p.preferred_language)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("patient profile"));
        }
        Ok(())
    }

    async fn find_consultant_profile(&self, id: Uuid) -> RepoResult<Option<ConsultantProfile>> {
        let profile = sqlx::query_as::<_, ConsultantProfile>(
            "SELECT * FROM consultant_profile WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn find_consultant_profile_by_user(
        &self,
        user_id: Uuid,
    ) -> RepoResult<Option<ConsultantProfile>> {
        let profile = sqlx::query_as::<_, ConsultantProfile>(
            "SELECT * FROM consultant_profile WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn list_consultant_profiles(
        &self,
        speciality_id: Option<Uuid>,
    ) -> RepoResult<Vec<ConsultantProfile>> {
        let profiles = sqlx::query_as::<_, ConsultantProfile>(
            r#"
            SELECT cp.* FROM consultant_profile cp
            JOIN users u ON u.id = cp.user_id
            WHERE u.is_active = TRUE
              AND cp.is_available = TRUE
              AND ($1::uuid IS NULL OR cp.speciality_id = $1)
            ORDER BY cp.rating DESC, cp.created_at ASC
            "#,
        )
        .bind(speciality_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    async fn update_consultant_profile(&self, c: &ConsultantProfile) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE consultant_profile SET
                speciality_id = $2, bio = $3, years_of_experience = $4, license_number = $5,
                medical_degree = $6, phone_number = $7, clinic_name = $8, clinic_address = $9,
                clinic_city = $10, clinic_country = $11, consultation_fee = $12,
                consultation_duration = $13, consultation_type = $14, languages_spoken = $15,
                is_available = $16, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(c.id)
        .bind(c.speciality_id)
        .bind(&c.bio)
        .bind(c.years_of_experience)
        .bind(&c.license_number)
        .bind(&c.medical_degree)
        .bind(&c.phone_number)
        .bind(&c.clinic_name)
        .bind(&c.clinic_address)
        .bind(&c.clinic_city)
        .bind(&c.clinic_country)
        .bind(c.consultation_fee)
        .bind(c.consultation_duration)
        .bind(c.consultation_type)
        .bind(&c.languages_spoken)
        .bind(c.is_available)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("consultant profile"));
        }
        Ok(())
    }

    async fn verify_consultant(
        &self,
        id: Uuid,
        on: NaiveDate,
    ) -> RepoResult<Option<ConsultantProfile>> {
        let profile = sqlx::query_as::<_, ConsultantProfile>(
            r#"
            UPDATE consultant_profile
            SET is_verified = TRUE, verification_date = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(on)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }
}

#[async_trait]
impl ConsultantRepository for PgRepository {
    async fn insert_speciality(&self, s: &Speciality) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO specialties (id, name, description, icon, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(s.id)
        .bind(&s.name)
        .bind(&s.description)
        .bind(&s.icon)
        .bind(s.is_active)
        .bind(s.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_speciality(&self, id: Uuid) -> RepoResult<Option<Speciality>> {
        let speciality = sqlx::query_as::<_, Speciality>("SELECT * FROM specialties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(speciality)
    }

    async fn list_active_specialties(&self) -> RepoResult<Vec<Speciality>> {
        let specialties = sqlx::query_as::<_, Speciality>(
            "SELECT * FROM specialties WHERE is_active = TRUE ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(specialties)
    }

    async fn insert_review(&self, review: &Review) -> RepoResult<ConsultantProfile> {
        let mut tx = self.pool.begin().await?;

        let consultant: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM consultant_profile WHERE id = $1 FOR UPDATE")
                .bind(review.consultant_id)
                .fetch_optional(&mut *tx)
                .await?;
        if consultant.is_none() {
            return Err(RepositoryError::NotFound("consultant profile"));
        }

        sqlx::query(
            r#"
            INSERT INTO consultant_review (id, consultant_id, patient_id, rating, review_text,
                is_anonymous, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(review.id)
        .bind(review.consultant_id)
        .bind(review.patient_id)
        .bind(review.rating)
        .bind(&review.review_text)
        .bind(review.is_anonymous)
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&mut *tx)
        .await?;

        let profile = sqlx::query_as::<_, ConsultantProfile>(
            r#"
            UPDATE consultant_profile SET
                rating = COALESCE(
                    (SELECT ROUND(AVG(rating)::numeric, 2) FROM consultant_review WHERE consultant_id = $1),
                    0),
                total_reviews = (SELECT COUNT(*)::int FROM consultant_review WHERE consultant_id = $1),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(review.consultant_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(profile)
    }

    async fn list_reviews(&self, consultant_id: Uuid) -> RepoResult<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(
            "SELECT * FROM consultant_review WHERE consultant_id = $1 ORDER BY created_at DESC",
        )
        .bind(consultant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    async fn insert_availability_slot(&self, slot: &AvailabilitySlot) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO consultant_availability (id, consultant_id, day_of_week, start_time,
                end_time, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(slot.id)
        .bind(slot.consultant_id)
        .bind(slot.day_of_week)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.is_active)
        .bind(slot.created_at)
        .bind(slot.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_availability(&self, consultant_id: Uuid) -> RepoResult<Vec<AvailabilitySlot>> {
        let slots = sqlx::query_as::<_, AvailabilitySlot>(
            r#"
            SELECT * FROM consultant_availability
            WHERE consultant_id = $1 AND is_active = TRUE
            ORDER BY day_of_week, start_time
            "#,
        )
        .bind(consultant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(slots)
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn health_check(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            RepositoryError::from(e)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::models::NewUser;
    use std::sync::Arc;
    use tokio::sync::Barrier;

    async fn repo() -> Arc<PgRepository> {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/clinic_test".to_string());
        let pool = crate::db::create_pool(&DatabaseConfig {
            url,
            max_connections: 10,
            min_connections: 1,
        })
        .await
        .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        Arc::new(PgRepository::new(pool))
    }

    async fn user(repo: &PgRepository) -> Uuid {
        let user = User::new(NewUser {
            email: format!("{}@race.test", Uuid::new_v4()),
            password_hash: "hash".to_string(),
            first_name: "Race".to_string(),
            last_name: "Test".to_string(),
            role: Role::Patient,
            is_staff: false,
        });
        repo.create_user(&user, None).await.unwrap();
        user.id
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires running PostgreSQL
    async fn concurrent_issuance_leaves_one_valid_token() {
        let repo = repo().await;
        let user_id = user(&repo).await;
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    repo.issue_verification_token(user_id, Duration::hours(24))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let tokens = repo.list_verification_tokens(user_id).await.unwrap();
        assert_eq!(tokens.len(), 8);
        assert_eq!(tokens.iter().filter(|t| t.is_valid()).count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires running PostgreSQL
    async fn concurrent_redemption_succeeds_once() {
        let repo = repo().await;
        let user_id = user(&repo).await;
        let token = repo
            .issue_verification_token(user_id, Duration::hours(24))
            .await
            .unwrap()
            .token;
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    repo.redeem_verification_token(token).await.unwrap()
                })
            })
            .collect();

        let mut redeemed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                RedeemOutcome::Redeemed { user_id: owner } => {
                    assert_eq!(owner, user_id);
                    redeemed += 1;
                }
                outcome => assert_eq!(outcome, RedeemOutcome::AlreadyUsed),
            }
        }
        assert_eq!(redeemed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires running PostgreSQL
    async fn concurrent_limited_issuance_stops_at_the_limit() {
        let repo = repo().await;
        let user_id = user(&repo).await;
        let since = Utc::now() - Duration::minutes(5);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    repo.issue_verification_token_within_limit(
                        user_id,
                        Duration::hours(24),
                        since,
                        3,
                    )
                    .await
                    .unwrap()
                })
            })
            .collect();

        let mut issued = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                issued += 1;
            }
        }

        assert_eq!(issued, 3);
        assert_eq!(repo.list_verification_tokens(user_id).await.unwrap().len(), 3);
    }
}
