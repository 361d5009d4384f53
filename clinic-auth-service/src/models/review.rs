use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A patient's rating of a consultant. One per (consultant, patient).
#[derive(Debug, Clone, FromRow)]
pub struct Review {
    pub id: Uuid,
    pub consultant_id: Uuid,
    pub patient_id: Uuid,
    pub rating: i16,
    pub review_text: String,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(
        consultant_id: Uuid,
        patient_id: Uuid,
        rating: i16,
        review_text: String,
        is_anonymous: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            consultant_id,
            patient_id,
            rating,
            review_text,
            is_anonymous,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Review as shown publicly; anonymous reviews carry no patient identity.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub consultant_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub patient_name: String,
    pub rating: i16,
    pub review_text: String,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

impl ReviewResponse {
    pub fn new(review: Review, patient_full_name: Option<String>) -> Self {
        let (patient_id, patient_name) = if review.is_anonymous {
            (None, "Anonymous".to_string())
        } else {
            (
                Some(review.patient_id),
                patient_full_name.unwrap_or_default(),
            )
        };
        Self {
            id: review.id,
            consultant_id: review.consultant_id,
            patient_id,
            patient_name,
            rating: review.rating,
            review_text: review.review_text,
            is_anonymous: review.is_anonymous,
            created_at: review.created_at,
        }
    }
}

/// Mean of `ratings` rounded half-away-from-zero to two places, as
/// PostgreSQL's `ROUND(AVG(rating), 2)` does. Zero when there are none.
pub fn average_rating(ratings: &[i16]) -> Decimal {
    if ratings.is_empty() {
        return Decimal::ZERO;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    (Decimal::from(sum) / Decimal::from(ratings.len() as i64))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
