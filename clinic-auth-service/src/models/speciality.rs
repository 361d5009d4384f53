use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Medical speciality a consultant practises.
#[derive(Debug, Clone, Serialize, ToSchema, FromRow)]
pub struct Speciality {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Speciality {
    pub fn new(name: String, description: String, icon: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            icon,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
