use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{AuthResponse, RegisterRequest},
        ErrorResponse,
    },
    services::{Registration, ServiceError},
    utils::{Password, ValidatedJson},
    AppState,
};

/// Register a new patient or consultant
///
/// Creates the account and its profile, sends the verification email and
/// signs the new user in.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Passwords do not match", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Registered but sign-in failed", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<Response, AppError> {
    let registration = Registration {
        email: req.email,
        password: Password::new(req.password),
        confirm_password: Password::new(req.password_confirm),
        first_name: req.first_name,
        last_name: req.last_name,
        role: req.role.into(),
    };

    match state.auth_service.register(registration).await {
        Ok(session) => Ok((
            StatusCode::CREATED,
            Json(AuthResponse {
                message: "User registered successfully. Please check your email to verify your account"
                    .to_string(),
                user: session.user.sanitized(),
                access_token: session.access_token,
                refresh_token: session.refresh_token,
                expires_in: session.expires_in,
            }),
        )
            .into_response()),
        // AppError hides internal messages; this one is meant for the caller.
        Err(e @ ServiceError::RegisteredButLoginFailed(_)) => Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
                details: None,
            }),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}
