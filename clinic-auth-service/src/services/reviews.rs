//! Patient reviews of consultants. Each write refreshes the consultant's
//! cached rating in the same unit of work.

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::dtos::profile::CreateReviewRequest;
use crate::models::{ConsultantProfile, Review, ReviewResponse, Role, User};
use crate::repository::{constraints, Repository};
use crate::services::profiles::require_role;
use crate::services::ServiceError;

pub const MAX_REVIEW_LENGTH: usize = 100;

#[derive(Clone)]
pub struct ReviewService {
    repo: Arc<dyn Repository>,
}

impl ReviewService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Returns the stored review and the consultant with its refreshed rating.
    #[tracing::instrument(skip(self, patient, request), fields(patient_id = %patient.id))]
    pub async fn add_review(
        &self,
        patient: &User,
        consultant_id: Uuid,
        request: CreateReviewRequest,
    ) -> Result<(ReviewResponse, ConsultantProfile), ServiceError> {
        require_role(patient, Role::Patient)?;

        if !(1..=5).contains(&request.rating) {
            return Err(ServiceError::Validation("Rating must be between 1 and 5".to_string()));
        }
        let text = request.review_text.trim().to_string();
        if text.chars().count() > MAX_REVIEW_LENGTH {
            return Err(ServiceError::Validation(format!(
                "Review must be at most {} characters",
                MAX_REVIEW_LENGTH
            )));
        }

        if self.repo.find_consultant_profile(consultant_id).await?.is_none() {
            return Err(ServiceError::ConsultantNotFound);
        }

        let review = Review::new(
            consultant_id,
            patient.id,
            request.rating,
            text,
            request.is_anonymous,
        );
        let consultant = match self.repo.insert_review(&review).await {
            Ok(profile) => profile,
            Err(e) if e.is_conflict_on(constraints::REVIEW_PAIR) => {
                return Err(ServiceError::DuplicateReview)
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            consultant_id = %consultant_id,
            rating = %consultant.rating,
            total_reviews = consultant.total_reviews,
            "Review recorded"
        );
        Ok((
            ReviewResponse::new(review, Some(patient.full_name())),
            consultant,
        ))
    }

    /// Newest first. Anonymous reviews carry no patient identity.
    pub async fn list_reviews(&self, consultant_id: Uuid) -> Result<Vec<ReviewResponse>, ServiceError> {
        if self.repo.find_consultant_profile(consultant_id).await?.is_none() {
            return Err(ServiceError::ConsultantNotFound);
        }
        let reviews = self.repo.list_reviews(consultant_id).await?;

        let named: Vec<Uuid> = reviews
            .iter()
            .filter(|r| !r.is_anonymous)
            .map(|r| r.patient_id)
            .collect();
        let names: HashMap<Uuid, String> = self
            .repo
            .find_users_by_ids(&named)
            .await?
            .into_iter()
            .map(|u| (u.id, u.full_name()))
            .collect();

        Ok(reviews
            .into_iter()
            .map(|r| {
                let name = names.get(&r.patient_id).cloned();
                ReviewResponse::new(r, name)
            })
            .collect())
    }
}
