//! Weekly availability slots of consultants.

use std::sync::Arc;
use uuid::Uuid;

use crate::dtos::profile::CreateAvailabilityRequest;
use crate::models::{availability::weekday_from_index, AvailabilitySlot, Role, User};
use crate::repository::{constraints, Repository};
use crate::services::profiles::require_role;
use crate::services::ServiceError;

#[derive(Clone)]
pub struct ScheduleService {
    repo: Arc<dyn Repository>,
}

impl ScheduleService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Adds a slot to the calling consultant's week. A second slot starting
    /// at the same day and time is a conflict.
    #[tracing::instrument(skip(self, consultant, request), fields(user_id = %consultant.id))]
    pub async fn add_slot(
        &self,
        consultant: &User,
        request: CreateAvailabilityRequest,
    ) -> Result<AvailabilitySlot, ServiceError> {
        require_role(consultant, Role::Consultant)?;

        if weekday_from_index(request.day_of_week).is_none() {
            return Err(ServiceError::Validation(
                "Day of week must be between 0 and 6".to_string(),
            ));
        }
        if request.start_time >= request.end_time {
            return Err(ServiceError::Validation(
                "Start time must be before end time".to_string(),
            ));
        }

        let profile = self
            .repo
            .find_consultant_profile_by_user(consultant.id)
            .await?
            .ok_or(ServiceError::ProfileNotFound)?;

        let slot = AvailabilitySlot::new(
            profile.id,
            request.day_of_week,
            request.start_time,
            request.end_time,
        );
        match self.repo.insert_availability_slot(&slot).await {
            Ok(()) => {}
            Err(e) if e.is_conflict_on(constraints::AVAILABILITY_SLOT) => {
                return Err(ServiceError::DuplicateSlot)
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(consultant_id = %profile.id, day = slot.day_of_week, "Availability slot added");
        Ok(slot)
    }

    pub async fn list_availability(
        &self,
        consultant_id: Uuid,
    ) -> Result<Vec<AvailabilitySlot>, ServiceError> {
        if self.repo.find_consultant_profile(consultant_id).await?.is_none() {
            return Err(ServiceError::ConsultantNotFound);
        }
        Ok(self.repo.list_availability(consultant_id).await?)
    }
}
