//! Role-specific profiles. Every patient owns one `PatientProfile`, every
//! consultant one `ConsultantProfile`; admins own neither.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::user::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    PreferNotToSay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "varchar")]
pub enum BloodType {
    #[serde(rename = "A+")]
    #[sqlx(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    #[sqlx(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    #[sqlx(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    #[sqlx(rename = "B-")]
    BNegative,
    #[serde(rename = "O+")]
    #[sqlx(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    #[sqlx(rename = "O-")]
    ONegative,
    #[serde(rename = "AB+")]
    #[sqlx(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    #[sqlx(rename = "AB-")]
    AbNegative,
    #[default]
    #[serde(rename = "unknown")]
    #[sqlx(rename = "unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum ConsultationType {
    Video,
    Audio,
    Chat,
    #[default]
    All,
}

#[derive(Debug, Clone, Serialize, ToSchema, FromRow)]
pub struct PatientProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bio: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub phone_number: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub postal_code: String,
    pub emergency_contact_name: String,
    pub emergency_contact_phone: String,
    pub emergency_contact_relationship: String,
    pub blood_type: BloodType,
    pub allergies: Vec<String>,
    pub chronic_conditions: Vec<String>,
    pub current_medications: Vec<String>,
    pub medical_notes: String,
    pub share_medical_history: bool,
    pub allow_emergency_access: bool,
    pub preferred_language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientProfile {
    pub fn empty(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            bio: String::new(),
            date_of_birth: None,
            gender: None,
            phone_number: String::new(),
            address: String::new(),
            city: String::new(),
            country: String::new(),
            postal_code: String::new(),
            emergency_contact_name: String::new(),
            emergency_contact_phone: String::new(),
            emergency_contact_relationship: String::new(),
            blood_type: BloodType::Unknown,
            allergies: Vec::new(),
            chronic_conditions: Vec::new(),
            current_medications: Vec::new(),
            medical_notes: String::new(),
            share_medical_history: true,
            allow_emergency_access: true,
            preferred_language: "en".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whole years lived as of `today`; `None` without a birth date or for a
    /// birth date in the future.
    pub fn age(&self, today: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth?;
        let mut years = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, FromRow)]
pub struct ConsultantProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub speciality_id: Option<Uuid>,
    pub bio: String,
    pub years_of_experience: i32,
    pub license_number: Option<String>,
    pub medical_degree: String,
    pub phone_number: String,
    pub clinic_name: String,
    pub clinic_address: String,
    pub clinic_city: String,
    pub clinic_country: String,
    pub consultation_fee: Decimal,
    pub consultation_duration: i32,
    pub consultation_type: ConsultationType,
    pub languages_spoken: Vec<String>,
    pub is_available: bool,
    pub rating: Decimal,
    pub total_consultations: i32,
    pub total_reviews: i32,
    pub is_verified: bool,
    pub verification_date: Option<NaiveDate>,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_CONSULTATION_MINUTES: i32 = 50;

impl ConsultantProfile {
    pub fn empty(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            speciality_id: None,
            bio: String::new(),
            years_of_experience: 0,
            license_number: None,
            medical_degree: String::new(),
            phone_number: String::new(),
            clinic_name: String::new(),
            clinic_address: String::new(),
            clinic_city: String::new(),
            clinic_country: String::new(),
            consultation_fee: Decimal::ZERO,
            consultation_duration: DEFAULT_CONSULTATION_MINUTES,
            consultation_type: ConsultationType::All,
            languages_spoken: Vec::new(),
            is_available: true,
            rating: Decimal::ZERO,
            total_consultations: 0,
            total_reviews: 0,
            is_verified: false,
            verification_date: None,
            is_featured: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The profile provisioned alongside a user.
#[derive(Debug, Clone)]
pub enum Profile {
    Patient(PatientProfile),
    Consultant(ConsultantProfile),
}

impl Profile {
    /// The role-appropriate empty profile for `user`, if its role has one.
    pub fn for_user(user: &User) -> Option<Self> {
        match user.role {
            Role::Patient => Some(Profile::Patient(PatientProfile::empty(user.id))),
            Role::Consultant => Some(Profile::Consultant(ConsultantProfile::empty(user.id))),
            Role::Admin => None,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            Profile::Patient(p) => p.user_id,
            Profile::Consultant(c) => c.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient_born(y: i32, m: u32, d: u32) -> PatientProfile {
        let mut profile = PatientProfile::empty(Uuid::new_v4());
        profile.date_of_birth = NaiveDate::from_ymd_opt(y, m, d);
        profile
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_counts_whole_years() {
        let profile = patient_born(1990, 6, 15);
        assert_eq!(profile.age(day(2024, 6, 14)), Some(33));
        assert_eq!(profile.age(day(2024, 6, 15)), Some(34));
        assert_eq!(profile.age(day(2024, 12, 31)), Some(34));
    }

    #[test]
    fn age_handles_leap_day_birthdays() {
        let profile = patient_born(2000, 2, 29);
        assert_eq!(profile.age(day(2023, 2, 28)), Some(22));
        assert_eq!(profile.age(day(2023, 3, 1)), Some(23));
    }

    #[test]
    fn age_is_none_without_birth_date_or_in_future() {
        assert_eq!(PatientProfile::empty(Uuid::new_v4()).age(day(2024, 1, 1)), None);
        assert_eq!(patient_born(2030, 1, 1).age(day(2024, 1, 1)), None);
    }

    #[test]
    fn empty_profiles_carry_defaults() {
        let patient = PatientProfile::empty(Uuid::new_v4());
        assert_eq!(patient.blood_type, BloodType::Unknown);
        assert_eq!(patient.preferred_language, "en");
        assert!(patient.share_medical_history);

        let consultant = ConsultantProfile::empty(Uuid::new_v4());
        assert_eq!(consultant.rating, Decimal::ZERO);
        assert_eq!(consultant.consultation_duration, 50);
        assert_eq!(consultant.consultation_type, ConsultationType::All);
    }

    #[test]
    fn blood_type_uses_clinical_notation() {
        assert_eq!(serde_json::to_string(&BloodType::AbNegative).unwrap(), "\"AB-\"");
        let parsed: BloodType = serde_json::from_str("\"O+\"").unwrap();
        assert_eq!(parsed, BloodType::OPositive);
    }
}
