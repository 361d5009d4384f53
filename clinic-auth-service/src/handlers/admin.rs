//! Operator endpoints behind the admin API key.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{
        admin::{BootstrapAdminRequest, CreateSpecialityRequest},
        auth::ProfileResponse,
        ErrorResponse,
    },
    models::{ConsultantProfile, Role, Speciality},
    services::NewAccount,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Create an administrator account
#[utoipa::path(
    post,
    path = "/admin/bootstrap",
    request_body = BootstrapAdminRequest,
    responses(
        (status = 201, description = "Administrator created", body = ProfileResponse),
        (status = 401, description = "Invalid admin API key", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    security(("admin_api_key" = [])),
    tag = "Admin"
)]
pub async fn bootstrap_admin(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<BootstrapAdminRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .credentials
        .create_superuser(NewAccount {
            email: req.email,
            password: Password::new(req.password),
            first_name: req.first_name,
            last_name: req.last_name,
            role: Role::Admin,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProfileResponse {
            user: user.sanitized(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/admin/users/{id}/activate",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User activated", body = ProfileResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("admin_api_key" = [])),
    tag = "Admin"
)]
pub async fn activate_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.credentials.set_active(id, true).await?;
    Ok(Json(ProfileResponse {
        user: user.sanitized(),
    }))
}

/// Deactivate a user and revoke its refresh sessions
#[utoipa::path(
    post,
    path = "/admin/users/{id}/deactivate",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User deactivated", body = ProfileResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("admin_api_key" = [])),
    tag = "Admin"
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.credentials.set_active(id, false).await?;
    Ok(Json(ProfileResponse {
        user: user.sanitized(),
    }))
}

#[utoipa::path(
    post,
    path = "/admin/specialties",
    request_body = CreateSpecialityRequest,
    responses(
        (status = 201, description = "Speciality created", body = Speciality),
        (status = 409, description = "Speciality already exists", body = ErrorResponse)
    ),
    security(("admin_api_key" = [])),
    tag = "Admin"
)]
pub async fn create_speciality(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateSpecialityRequest>,
) -> Result<impl IntoResponse, AppError> {
    let speciality = state
        .profile_service
        .create_speciality(&req.name, &req.description, &req.icon)
        .await?;
    Ok((StatusCode::CREATED, Json(speciality)))
}

/// Mark a consultant verified as of today
#[utoipa::path(
    post,
    path = "/admin/consultants/{id}/verify",
    params(("id" = Uuid, Path, description = "Consultant profile id")),
    responses(
        (status = 200, description = "Consultant verified", body = ConsultantProfile),
        (status = 404, description = "Consultant not found", body = ErrorResponse)
    ),
    security(("admin_api_key" = [])),
    tag = "Admin"
)]
pub async fn verify_consultant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.profile_service.verify_consultant(id).await?))
}
