//! Patient and consultant profile management plus the speciality catalogue.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::dtos::profile::{UpdateConsultantProfileRequest, UpdatePatientProfileRequest};
use crate::models::{ConsultantProfile, PatientProfile, Role, Speciality, User};
use crate::repository::{constraints, Repository};
use crate::services::ServiceError;

#[derive(Clone)]
pub struct ProfileService {
    repo: Arc<dyn Repository>,
}

impl ProfileService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn patient_profile(&self, user: &User) -> Result<PatientProfile, ServiceError> {
        require_role(user, Role::Patient)?;
        self.repo
            .find_patient_profile(user.id)
            .await?
            .ok_or(ServiceError::ProfileNotFound)
    }

    #[tracing::instrument(skip(self, user, update), fields(user_id = %user.id))]
    pub async fn update_patient_profile(
        &self,
        user: &User,
        update: UpdatePatientProfileRequest,
    ) -> Result<PatientProfile, ServiceError> {
        let mut profile = self.patient_profile(user).await?;
        update.apply(&mut profile);
        if profile.date_of_birth.is_some_and(|dob| dob > Utc::now().date_naive()) {
            return Err(ServiceError::Validation(
                "Date of birth cannot be in the future".to_string(),
            ));
        }
        self.repo.update_patient_profile(&profile).await?;
        tracing::info!("Patient profile updated");
        self.patient_profile(user).await
    }

    pub async fn consultant_profile(&self, id: Uuid) -> Result<ConsultantProfile, ServiceError> {
        self.repo
            .find_consultant_profile(id)
            .await?
            .ok_or(ServiceError::ConsultantNotFound)
    }

    pub async fn own_consultant_profile(&self, user: &User) -> Result<ConsultantProfile, ServiceError> {
        require_role(user, Role::Consultant)?;
        self.repo
            .find_consultant_profile_by_user(user.id)
            .await?
            .ok_or(ServiceError::ProfileNotFound)
    }

    pub async fn list_consultants(
        &self,
        speciality_id: Option<Uuid>,
    ) -> Result<Vec<ConsultantProfile>, ServiceError> {
        Ok(self.repo.list_consultant_profiles(speciality_id).await?)
    }

    /// The speciality, when changed, must exist and be active. A license
    /// number already held by another consultant is a conflict.
    #[tracing::instrument(skip(self, user, update), fields(user_id = %user.id))]
    pub async fn update_consultant_profile(
        &self,
        user: &User,
        update: UpdateConsultantProfileRequest,
    ) -> Result<ConsultantProfile, ServiceError> {
        let mut profile = self.own_consultant_profile(user).await?;

        if let Some(speciality_id) = update.speciality_id {
            let active = self
                .repo
                .find_speciality(speciality_id)
                .await?
                .is_some_and(|s| s.is_active);
            if !active {
                return Err(ServiceError::SpecialityNotFound);
            }
        }
        if update.consultation_fee.is_some_and(|fee| fee < Decimal::ZERO) {
            return Err(ServiceError::Validation(
                "Consultation fee cannot be negative".to_string(),
            ));
        }

        update.apply(&mut profile);

        match self.repo.update_consultant_profile(&profile).await {
            Ok(()) => {}
            Err(e) if e.is_conflict_on(constraints::CONSULTANT_LICENSE) => {
                return Err(ServiceError::DuplicateLicense)
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(consultant_id = %profile.id, "Consultant profile updated");
        self.consultant_profile(profile.id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn verify_consultant(&self, id: Uuid) -> Result<ConsultantProfile, ServiceError> {
        let profile = self
            .repo
            .verify_consultant(id, Utc::now().date_naive())
            .await?
            .ok_or(ServiceError::ConsultantNotFound)?;
        tracing::info!(consultant_id = %id, "Consultant verified");
        Ok(profile)
    }

    pub async fn create_speciality(
        &self,
        name: &str,
        description: &str,
        icon: &str,
    ) -> Result<Speciality, ServiceError> {
        let speciality = Speciality::new(
            name.trim().to_string(),
            description.trim().to_string(),
            icon.trim().to_string(),
        );
        match self.repo.insert_speciality(&speciality).await {
            Ok(()) => Ok(speciality),
            Err(e) if e.is_conflict_on(constraints::SPECIALITY_NAME) => {
                Err(ServiceError::DuplicateSpeciality)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_specialties(&self) -> Result<Vec<Speciality>, ServiceError> {
        Ok(self.repo.list_active_specialties().await?)
    }
}

pub(crate) fn require_role(user: &User, role: Role) -> Result<(), ServiceError> {
    if user.role == role {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!("Only {}s can do this", role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, Profile};
    use crate::repository::{InMemoryRepository, UserRepository};

    async fn user(repo: &InMemoryRepository, email: &str, role: Role) -> User {
        let user = User::new(NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            role,
            is_staff: false,
        });
        repo.create_user(&user, Profile::for_user(&user).as_ref())
            .await
            .unwrap();
        user
    }

    #[tokio::test]
    async fn patient_only_endpoints_reject_consultants() {
        let repo = Arc::new(InMemoryRepository::new());
        let service = ProfileService::new(repo.clone());
        let consultant = user(&repo, "c@x.com", Role::Consultant).await;

        assert!(matches!(
            service.patient_profile(&consultant).await.unwrap_err(),
            ServiceError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn future_birth_date_is_rejected() {
        let repo = Arc::new(InMemoryRepository::new());
        let service = ProfileService::new(repo.clone());
        let patient = user(&repo, "p@x.com", Role::Patient).await;

        let update = UpdatePatientProfileRequest {
            date_of_birth: Some(Utc::now().date_naive() + chrono::Duration::days(30)),
            ..Default::default()
        };
        assert!(matches!(
            service.update_patient_profile(&patient, update).await.unwrap_err(),
            ServiceError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn inactive_or_unknown_speciality_is_rejected() {
        let repo = Arc::new(InMemoryRepository::new());
        let service = ProfileService::new(repo.clone());
        let consultant = user(&repo, "c@x.com", Role::Consultant).await;

        let update = UpdateConsultantProfileRequest {
            speciality_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_consultant_profile(&consultant, update).await.unwrap_err(),
            ServiceError::SpecialityNotFound
        ));
    }

    #[tokio::test]
    async fn duplicate_speciality_name_conflicts() {
        let repo = Arc::new(InMemoryRepository::new());
        let service = ProfileService::new(repo);

        service.create_speciality("Cardiology", "", "").await.unwrap();
        assert!(matches!(
            service.create_speciality(" Cardiology ", "", "").await.unwrap_err(),
            ServiceError::DuplicateSpeciality
        ));
        assert_eq!(service.list_specialties().await.unwrap().len(), 1);
    }
}
