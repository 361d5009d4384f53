//! In-memory repository for tests and database-less local runs.
//!
//! A single mutex guards all state, so every operation is atomic with respect
//! to every other; unique constraints are checked by hand under that lock and
//! reported with the same names PostgreSQL uses.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    constraints, ConsultantRepository, ProfileRepository, RedeemOutcome, RepoResult, Repository,
    RepositoryError, SessionRepository, UserRepository, VerificationTokenRepository,
};
use crate::models::{
    review::average_rating, AvailabilitySlot, ConsultantProfile, PatientProfile, Profile,
    RefreshSession, Review, Role, Speciality, User, VerificationToken,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    tokens: Vec<VerificationToken>,
    next_token_id: i64,
    sessions: HashMap<Uuid, RefreshSession>,
    patients: HashMap<Uuid, PatientProfile>,
    consultants: HashMap<Uuid, ConsultantProfile>,
    specialties: HashMap<Uuid, Speciality>,
    reviews: Vec<Review>,
    slots: Vec<AvailabilitySlot>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `RepositoryError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, State>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("in-memory store offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
    }
}

impl State {
    /// Supersedes the user's unused tokens and appends a fresh one.
    fn issue_token(&mut self, user_id: Uuid, ttl: Duration) -> RepoResult<VerificationToken> {
        if !self.users.contains_key(&user_id) {
            return Err(RepositoryError::NotFound("user"));
        }
        for token in self.tokens.iter_mut().filter(|t| t.user_id == user_id) {
            token.is_used = true;
        }
        self.next_token_id += 1;
        let token = VerificationToken::new(self.next_token_id, user_id, ttl);
        self.tokens.push(token.clone());
        Ok(token)
    }

    fn license_taken(&self, license: &str, except: Uuid) -> bool {
        self.consultants
            .values()
            .any(|c| c.id != except && c.license_number.as_deref() == Some(license))
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn create_user(&self, user: &User, profile: Option<&Profile>) -> RepoResult<()> {
        let mut state = self.lock()?;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict(constraints::USER_EMAIL.to_string()));
        }
        state.users.insert(user.id, user.clone());
        match profile {
            Some(Profile::Patient(p)) => {
                state.patients.insert(p.user_id, p.clone());
            }
            Some(Profile::Consultant(c)) => {
                state.consultants.insert(c.id, c.clone());
            }
            None => {}
        }
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_users_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<User>> {
        let state = self.lock()?;
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }

    async fn list_active_users_by_role(&self, role: Role) -> RepoResult<Vec<User>> {
        let mut users: Vec<User> = self
            .lock()?
            .users
            .values()
            .filter(|u| u.role == role && u.is_active)
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn mark_email_verified(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<Option<User>> {
        let mut state = self.lock()?;
        Ok(state.users.get_mut(&id).map(|u| {
            u.is_verified = true;
            u.email_verified_at.get_or_insert(at);
            u.updated_at = Utc::now();
            u.clone()
        }))
    }

    async fn set_online_status(
        &self,
        id: Uuid,
        is_online: bool,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<User>> {
        let mut state = self.lock()?;
        Ok(state.users.get_mut(&id).map(|u| {
            u.is_online = is_online;
            u.last_seen = at;
            u.clone()
        }))
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> RepoResult<Option<User>> {
        let mut state = self.lock()?;
        Ok(state.users.get_mut(&id).map(|u| {
            u.is_active = is_active;
            u.updated_at = Utc::now();
            u.clone()
        }))
    }
}

#[async_trait]
impl VerificationTokenRepository for InMemoryRepository {
    async fn issue_verification_token(
        &self,
        user_id: Uuid,
        ttl: Duration,
    ) -> RepoResult<VerificationToken> {
        let mut state = self.lock()?;
        state.issue_token(user_id, ttl)
    }

    async fn issue_verification_token_within_limit(
        &self,
        user_id: Uuid,
        ttl: Duration,
        since: DateTime<Utc>,
        limit: i64,
    ) -> RepoResult<Option<VerificationToken>> {
        let mut state = self.lock()?;
        let recent = state
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.created_at > since)
            .count() as i64;
        if recent >= limit {
            return Ok(None);
        }
        state.issue_token(user_id, ttl).map(Some)
    }

    async fn redeem_verification_token(&self, token: Uuid) -> RepoResult<RedeemOutcome> {
        let mut state = self.lock()?;
        let Some(row) = state.tokens.iter_mut().find(|t| t.token == token) else {
            return Ok(RedeemOutcome::NotFound);
        };
        if row.is_expired() {
            return Ok(RedeemOutcome::Expired);
        }
        if row.is_used {
            return Ok(RedeemOutcome::AlreadyUsed);
        }
        row.is_used = true;
        Ok(RedeemOutcome::Redeemed {
            user_id: row.user_id,
        })
    }

    async fn count_verification_tokens_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> RepoResult<i64> {
        let count = self
            .lock()?
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.created_at > since)
            .count();
        Ok(count as i64)
    }

    async fn list_verification_tokens(&self, user_id: Uuid) -> RepoResult<Vec<VerificationToken>> {
        Ok(self
            .lock()?
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_refresh_session(&self, session: &RefreshSession) -> RepoResult<()> {
        self.lock()?
            .sessions
            .insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_refresh_session(&self, session_id: Uuid) -> RepoResult<Option<RefreshSession>> {
        Ok(self.lock()?.sessions.get(&session_id).cloned())
    }

    async fn revoke_refresh_session(&self, session_id: Uuid) -> RepoResult<bool> {
        let mut state = self.lock()?;
        match state.sessions.get_mut(&session_id) {
            Some(s) if s.revoked_utc.is_none() => {
                s.revoked_utc = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_sessions(&self, user_id: Uuid) -> RepoResult<u64> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut revoked = 0;
        for s in state
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.revoked_utc.is_none())
        {
            s.revoked_utc = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn find_patient_profile(&self, user_id: Uuid) -> RepoResult<Option<PatientProfile>> {
        Ok(self.lock()?.patients.get(&user_id).cloned())
    }

    async fn update_patient_profile(&self, profile: &PatientProfile) -> RepoResult<()> {
        let mut state = self.lock()?;
        let existing = state
            .patients
            .get_mut(&profile.user_id)
            .filter(|p| p.id == profile.id)
            .ok_or(RepositoryError::NotFound("patient profile"))?;
        *existing = PatientProfile {
            updated_at: Utc::now(),
            ..profile.clone()
        };
        Ok(())
    }

    async fn find_consultant_profile(&self, id: Uuid) -> RepoResult<Option<ConsultantProfile>> {
        Ok(self.lock()?.consultants.get(&id).cloned())
    }

    async fn find_consultant_profile_by_user(
        &self,
        user_id: Uuid,
    ) -> RepoResult<Option<ConsultantProfile>> {
        Ok(self
            .lock()?
            .consultants
            .values()
            .find(|c| c.user_id == user_id)
            .cloned())
    }

    async fn list_consultant_profiles(
        &self,
        speciality_id: Option<Uuid>,
    ) -> RepoResult<Vec<ConsultantProfile>> {
        let state = self.lock()?;
        let mut profiles: Vec<ConsultantProfile> = state
            .consultants
            .values()
            .filter(|c| c.is_available)
            .filter(|c| speciality_id.is_none() || c.speciality_id == speciality_id)
            .filter(|c| state.users.get(&c.user_id).is_some_and(|u| u.is_active))
            .cloned()
            .collect();
        profiles.sort_by(|a, b| {
            b.rating
                .cmp(&a.rating)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(profiles)
    }

    async fn update_consultant_profile(&self, profile: &ConsultantProfile) -> RepoResult<()> {
        let mut state = self.lock()?;
        if let Some(license) = profile.license_number.as_deref() {
            if state.license_taken(license, profile.id) {
                return Err(RepositoryError::Conflict(
                    constraints::CONSULTANT_LICENSE.to_string(),
                ));
            }
        }
        let existing = state
            .consultants
            .get_mut(&profile.id)
            .ok_or(RepositoryError::NotFound("consultant profile"))?;
        // Derived and admin-managed columns are not writable through an update.
        *existing = ConsultantProfile {
            rating: existing.rating,
            total_consultations: existing.total_consultations,
            total_reviews: existing.total_reviews,
            is_verified: existing.is_verified,
            verification_date: existing.verification_date,
            is_featured: existing.is_featured,
            created_at: existing.created_at,
            updated_at: Utc::now(),
            ..profile.clone()
        };
        Ok(())
    }

    async fn verify_consultant(
        &self,
        id: Uuid,
        on: NaiveDate,
    ) -> RepoResult<Option<ConsultantProfile>> {
        let mut state = self.lock()?;
        Ok(state.consultants.get_mut(&id).map(|c| {
            c.is_verified = true;
            c.verification_date = Some(on);
            c.updated_at = Utc::now();
            c.clone()
        }))
    }
}

#[async_trait]
impl ConsultantRepository for InMemoryRepository {
    async fn insert_speciality(&self, speciality: &Speciality) -> RepoResult<()> {
        let mut state = self.lock()?;
        if state.specialties.values().any(|s| s.name == speciality.name) {
            return Err(RepositoryError::Conflict(
                constraints::SPECIALITY_NAME.to_string(),
            ));
        }
        state.specialties.insert(speciality.id, speciality.clone());
        Ok(())
    }

    async fn find_speciality(&self, id: Uuid) -> RepoResult<Option<Speciality>> {
        Ok(self.lock()?.specialties.get(&id).cloned())
    }

    async fn list_active_specialties(&self) -> RepoResult<Vec<Speciality>> {
        let mut specialties: Vec<Speciality> = self
            .lock()?
            .specialties
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        specialties.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specialties)
    }

    async fn insert_review(&self, review: &Review) -> RepoResult<ConsultantProfile> {
        let mut state = self.lock()?;
        if !state.consultants.contains_key(&review.consultant_id) {
            return Err(RepositoryError::NotFound("consultant profile"));
        }
        if state
            .reviews
            .iter()
            .any(|r| r.consultant_id == review.consultant_id && r.patient_id == review.patient_id)
        {
            return Err(RepositoryError::Conflict(constraints::REVIEW_PAIR.to_string()));
        }
        state.reviews.push(review.clone());

        let ratings: Vec<i16> = state
            .reviews
            .iter()
            .filter(|r| r.consultant_id == review.consultant_id)
            .map(|r| r.rating)
            .collect();
        let profile = state
            .consultants
            .get_mut(&review.consultant_id)
            .ok_or(RepositoryError::NotFound("consultant profile"))?;
        profile.rating = average_rating(&ratings);
        profile.total_reviews = ratings.len() as i32;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn list_reviews(&self, consultant_id: Uuid) -> RepoResult<Vec<Review>> {
        let mut reviews: Vec<Review> = self
            .lock()?
            .reviews
            .iter()
            .filter(|r| r.consultant_id == consultant_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn insert_availability_slot(&self, slot: &AvailabilitySlot) -> RepoResult<()> {
        let mut state = self.lock()?;
        if !state.consultants.contains_key(&slot.consultant_id) {
            return Err(RepositoryError::NotFound("consultant profile"));
        }
        if state.slots.iter().any(|s| {
            s.consultant_id == slot.consultant_id
                && s.day_of_week == slot.day_of_week
                && s.start_time == slot.start_time
        }) {
            return Err(RepositoryError::Conflict(
                constraints::AVAILABILITY_SLOT.to_string(),
            ));
        }
        state.slots.push(slot.clone());
        Ok(())
    }

    async fn list_availability(&self, consultant_id: Uuid) -> RepoResult<Vec<AvailabilitySlot>> {
        let mut slots: Vec<AvailabilitySlot> = self
            .lock()?
            .slots
            .iter()
            .filter(|s| s.consultant_id == consultant_id && s.is_active)
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.day_of_week, s.start_time));
        Ok(slots)
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn health_check(&self) -> RepoResult<()> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;

    fn user(email: &str, role: Role) -> User {
        User::new(NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            role,
            is_staff: false,
        })
    }

    #[tokio::test]
    async fn duplicate_email_reports_constraint() {
        let repo = InMemoryRepository::new();
        repo.create_user(&user("a@x.com", Role::Patient), None).await.unwrap();
        let err = repo
            .create_user(&user("a@x.com", Role::Consultant), None)
            .await
            .unwrap_err();
        assert!(err.is_conflict_on(constraints::USER_EMAIL));
    }

    #[tokio::test]
    async fn issuing_supersedes_unused_tokens() {
        let repo = InMemoryRepository::new();
        let u = user("a@x.com", Role::Patient);
        repo.create_user(&u, None).await.unwrap();

        let first = repo.issue_verification_token(u.id, Duration::hours(24)).await.unwrap();
        let second = repo.issue_verification_token(u.id, Duration::hours(24)).await.unwrap();

        let tokens = repo.list_verification_tokens(u.id).await.unwrap();
        let valid: Vec<_> = tokens.iter().filter(|t| t.is_valid()).collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].token, second.token);
        assert_eq!(
            repo.redeem_verification_token(first.token).await.unwrap(),
            RedeemOutcome::AlreadyUsed
        );
    }

    #[tokio::test]
    async fn issuing_for_unknown_user_fails() {
        let repo = InMemoryRepository::new();
        let err = repo
            .issue_verification_token(Uuid::new_v4(), Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound("user")));
    }

    #[tokio::test]
    async fn expiry_is_reported_before_use() {
        let repo = InMemoryRepository::new();
        let u = user("a@x.com", Role::Patient);
        repo.create_user(&u, None).await.unwrap();
        let token = repo.issue_verification_token(u.id, Duration::seconds(-5)).await.unwrap();
        assert_eq!(
            repo.redeem_verification_token(token.token).await.unwrap(),
            RedeemOutcome::Expired
        );
    }

    #[tokio::test]
    async fn offline_store_is_unavailable() {
        let repo = InMemoryRepository::new();
        repo.set_unavailable(true);
        assert!(matches!(
            repo.health_check().await,
            Err(RepositoryError::Unavailable(_))
        ));
        repo.set_unavailable(false);
        assert!(repo.health_check().await.is_ok());
    }
}
