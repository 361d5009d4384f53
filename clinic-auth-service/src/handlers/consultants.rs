//! Public consultant directory plus the consultant's own profile, reviews
//! and weekly availability.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{
        profile::{
            ConsultantListQuery, CreateAvailabilityRequest, CreateReviewRequest,
            ReviewCreatedResponse, UpdateConsultantProfileRequest,
        },
        ErrorResponse,
    },
    middleware::AuthUser,
    models::{AvailabilitySlot, ConsultantProfile, ReviewResponse, Speciality},
    utils::ValidatedJson,
    AppState,
};

/// Active specialties
#[utoipa::path(
    get,
    path = "/specialties",
    responses((status = 200, description = "Active specialties", body = [Speciality])),
    tag = "Consultants"
)]
pub async fn list_specialties(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.profile_service.list_specialties().await?))
}

/// Available consultants, best rated first
#[utoipa::path(
    get,
    path = "/consultants",
    params(ConsultantListQuery),
    responses((status = 200, description = "Consultant profiles", body = [ConsultantProfile])),
    tag = "Consultants"
)]
pub async fn list_consultants(
    State(state): State<AppState>,
    Query(query): Query<ConsultantListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let consultants = state
        .profile_service
        .list_consultants(query.speciality_id)
        .await?;
    Ok(Json(consultants))
}

#[utoipa::path(
    get,
    path = "/consultants/{id}",
    params(("id" = Uuid, Path, description = "Consultant profile id")),
    responses(
        (status = 200, description = "Consultant profile", body = ConsultantProfile),
        (status = 404, description = "Consultant not found", body = ErrorResponse)
    ),
    tag = "Consultants"
)]
pub async fn get_consultant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.profile_service.consultant_profile(id).await?))
}

/// The caller's consultant profile
#[utoipa::path(
    get,
    path = "/consultants/me/profile",
    responses(
        (status = 200, description = "Consultant profile", body = ConsultantProfile),
        (status = 403, description = "Caller is not a consultant", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Consultants"
)]
pub async fn get_own_consultant_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state.profile_service.own_consultant_profile(&auth.user).await?,
    ))
}

/// Update the caller's consultant profile
#[utoipa::path(
    patch,
    path = "/consultants/me/profile",
    request_body = UpdateConsultantProfileRequest,
    responses(
        (status = 200, description = "Updated consultant profile", body = ConsultantProfile),
        (status = 400, description = "Negative consultation fee", body = ErrorResponse),
        (status = 403, description = "Caller is not a consultant", body = ErrorResponse),
        (status = 404, description = "Unknown or inactive speciality", body = ErrorResponse),
        (status = 409, description = "License number already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Consultants"
)]
pub async fn update_own_consultant_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateConsultantProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .profile_service
        .update_consultant_profile(&auth.user, req)
        .await?;
    Ok(Json(profile))
}

/// Reviews of a consultant, newest first
#[utoipa::path(
    get,
    path = "/consultants/{id}/reviews",
    params(("id" = Uuid, Path, description = "Consultant profile id")),
    responses(
        (status = 200, description = "Reviews", body = [ReviewResponse]),
        (status = 404, description = "Consultant not found", body = ErrorResponse)
    ),
    tag = "Reviews"
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.review_service.list_reviews(id).await?))
}

/// Review a consultant
#[utoipa::path(
    post,
    path = "/consultants/{id}/reviews",
    params(("id" = Uuid, Path, description = "Consultant profile id")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review stored", body = ReviewCreatedResponse),
        (status = 403, description = "Caller is not a patient", body = ErrorResponse),
        (status = 404, description = "Consultant not found", body = ErrorResponse),
        (status = 409, description = "Already reviewed", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn add_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (review, consultant) = state
        .review_service
        .add_review(&auth.user, id, req)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ReviewCreatedResponse { review, consultant }),
    ))
}

/// Weekly availability of a consultant
#[utoipa::path(
    get,
    path = "/consultants/{id}/availability",
    params(("id" = Uuid, Path, description = "Consultant profile id")),
    responses(
        (status = 200, description = "Active slots by day and start time", body = [AvailabilitySlot]),
        (status = 404, description = "Consultant not found", body = ErrorResponse)
    ),
    tag = "Availability"
)]
pub async fn list_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.schedule_service.list_availability(id).await?))
}

/// Add a slot to the caller's weekly availability
#[utoipa::path(
    post,
    path = "/consultants/me/availability",
    request_body = CreateAvailabilityRequest,
    responses(
        (status = 201, description = "Slot added", body = AvailabilitySlot),
        (status = 400, description = "Start time not before end time", body = ErrorResponse),
        (status = 403, description = "Caller is not a consultant", body = ErrorResponse),
        (status = 409, description = "Slot already exists", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Availability"
)]
pub async fn add_availability(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateAvailabilityRequest>,
) -> Result<impl IntoResponse, AppError> {
    let slot = state.schedule_service.add_slot(&auth.user, req).await?;
    Ok((StatusCode::CREATED, Json(slot)))
}
