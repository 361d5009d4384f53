use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A weekly recurring window in which a consultant takes consultations.
/// `day_of_week` counts from Monday = 0.
#[derive(Debug, Clone, Serialize, ToSchema, FromRow)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub consultant_id: Uuid,
    pub day_of_week: i16,
    #[schema(value_type = String, format = "time", example = "09:00:00")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, format = "time", example = "12:30:00")]
    pub end_time: NaiveTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilitySlot {
    pub fn new(consultant_id: Uuid, day_of_week: i16, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            consultant_id,
            day_of_week,
            start_time,
            end_time,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn weekday(&self) -> Option<Weekday> {
        weekday_from_index(self.day_of_week)
    }
}

pub fn weekday_from_index(day: i16) -> Option<Weekday> {
    u8::try_from(day)
        .ok()
        .filter(|d| *d < 7)
        .and_then(|d| Weekday::try_from(d).ok())
}
