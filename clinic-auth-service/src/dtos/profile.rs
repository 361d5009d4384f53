use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{
    BloodType, ConsultantProfile, ConsultationType, Gender, PatientProfile, ReviewResponse,
};

fn phone_regex() -> Option<&'static regex::Regex> {
    static PHONE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    PHONE
        .get_or_init(|| regex::Regex::new(r"^\+?91?\d{9,15}$").ok())
        .as_ref()
}

/// Up to 15 digits with an optional `+` and `91` prefix.
pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    if phone_regex().is_some_and(|re| re.is_match(value)) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone_number");
        err.message = Some("Phone number must be entered in the format: '+999999999'. Up to 15 digits allowed.".into());
        Err(err)
    }
}

/// Copies every `Some` field of `$update` onto `$target`.
macro_rules! merge_present {
    ($update:ident, $target:ident; $($field:ident),* $(,)?) => {
        $(if let Some(value) = $update.$field { $target.$field = value; })*
    };
}

/// Partial update of the caller's patient profile; absent fields are kept.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdatePatientProfileRequest {
    #[validate(length(max = 500))]
    pub bio: Option<String>,
    #[schema(value_type = Option<String>, format = "date", example = "1990-04-12")]
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    #[validate(custom(function = "validate_phone"))]
    #[schema(example = "+919876543210")]
    pub phone_number: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub country: Option<String>,
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    #[validate(length(max = 100))]
    pub emergency_contact_name: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub emergency_contact_phone: Option<String>,
    #[validate(length(max = 50))]
    pub emergency_contact_relationship: Option<String>,
    pub blood_type: Option<BloodType>,
    pub allergies: Option<Vec<String>>,
    pub chronic_conditions: Option<Vec<String>>,
    pub current_medications: Option<Vec<String>>,
    pub medical_notes: Option<String>,
    pub share_medical_history: Option<bool>,
    pub allow_emergency_access: Option<bool>,
    #[validate(length(min = 2, max = 10))]
    pub preferred_language: Option<String>,
}

impl UpdatePatientProfileRequest {
    pub fn apply(self, profile: &mut PatientProfile) {
        let update = self;
        merge_present!(update, profile;
            bio,
            phone_number,
            address,
            city,
            country,
            postal_code,
            emergency_contact_name,
            emergency_contact_phone,
            emergency_contact_relationship,
            blood_type,
            allergies,
            chronic_conditions,
            current_medications,
            medical_notes,
            share_medical_history,
            allow_emergency_access,
            preferred_language,
        );
        if update.date_of_birth.is_some() {
            profile.date_of_birth = update.date_of_birth;
        }
        if update.gender.is_some() {
            profile.gender = update.gender;
        }
    }
}

/// Patient profile with the derived age.
#[derive(Debug, Serialize, ToSchema)]
pub struct PatientProfileResponse {
    #[serde(flatten)]
    pub profile: PatientProfile,
    pub age: Option<u32>,
}

/// Partial update of the caller's consultant profile. Rating, review counts
/// and verification are not writable here.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateConsultantProfileRequest {
    pub speciality_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub bio: Option<String>,
    #[validate(range(min = 0, max = 50))]
    pub years_of_experience: Option<i32>,
    #[validate(length(min = 1, max = 50))]
    pub license_number: Option<String>,
    #[validate(length(max = 200))]
    pub medical_degree: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone_number: Option<String>,
    #[validate(length(max = 200))]
    pub clinic_name: Option<String>,
    pub clinic_address: Option<String>,
    #[validate(length(max = 100))]
    pub clinic_city: Option<String>,
    #[validate(length(max = 100))]
    pub clinic_country: Option<String>,
    #[schema(value_type = Option<String>, example = "500.00")]
    pub consultation_fee: Option<Decimal>,
    #[validate(range(min = 1, max = 50))]
    pub consultation_duration: Option<i32>,
    pub consultation_type: Option<ConsultationType>,
    pub languages_spoken: Option<Vec<String>>,
    pub is_available: Option<bool>,
}

impl UpdateConsultantProfileRequest {
    pub fn apply(self, profile: &mut ConsultantProfile) {
        let update = self;
        merge_present!(update, profile;
            bio,
            years_of_experience,
            medical_degree,
            phone_number,
            clinic_name,
            clinic_address,
            clinic_city,
            clinic_country,
            consultation_duration,
            consultation_type,
            languages_spoken,
            is_available,
        );
        if update.speciality_id.is_some() {
            profile.speciality_id = update.speciality_id;
        }
        if let Some(license) = update.license_number {
            profile.license_number = Some(license.trim().to_string());
        }
        if let Some(fee) = update.consultation_fee {
            profile.consultation_fee = fee.round_dp(2);
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ConsultantListQuery {
    pub speciality_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    #[schema(example = 5)]
    pub rating: i16,
    #[serde(default)]
    #[validate(length(max = 100, message = "Review must be at most 100 characters"))]
    #[schema(example = "Very attentive")]
    pub review_text: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// A stored review and the consultant's refreshed rating.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewCreatedResponse {
    pub review: ReviewResponse,
    pub consultant: ConsultantProfile,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAvailabilityRequest {
    /// 0 = Monday ... 6 = Sunday
    #[validate(range(min = 0, max = 6, message = "Day of week must be between 0 and 6"))]
    pub day_of_week: i16,
    #[schema(value_type = String, format = "time", example = "09:00:00")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, format = "time", example = "12:00:00")]
    pub end_time: NaiveTime,
}
