use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use service_core::error::AppError;

use crate::{
    dtos::{
        profile::{PatientProfileResponse, UpdatePatientProfileRequest},
        ErrorResponse,
    },
    middleware::AuthUser,
    models::PatientProfile,
    utils::ValidatedJson,
    AppState,
};

fn with_age(profile: PatientProfile) -> PatientProfileResponse {
    let age = profile.age(Utc::now().date_naive());
    PatientProfileResponse { profile, age }
}

/// The caller's patient profile
#[utoipa::path(
    get,
    path = "/patients/me/profile",
    responses(
        (status = 200, description = "Patient profile", body = PatientProfileResponse),
        (status = 403, description = "Caller is not a patient", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Patients"
)]
pub async fn get_patient_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.profile_service.patient_profile(&auth.user).await?;
    Ok(Json(with_age(profile)))
}

/// Update the caller's patient profile
#[utoipa::path(
    patch,
    path = "/patients/me/profile",
    request_body = UpdatePatientProfileRequest,
    responses(
        (status = 200, description = "Updated patient profile", body = PatientProfileResponse),
        (status = 400, description = "Invalid date of birth", body = ErrorResponse),
        (status = 403, description = "Caller is not a patient", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Patients"
)]
pub async fn update_patient_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<UpdatePatientProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .profile_service
        .update_patient_profile(&auth.user, req)
        .await?;
    Ok(Json(with_age(profile)))
}
