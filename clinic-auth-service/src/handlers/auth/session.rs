use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            AuthResponse, LoginRequest, LogoutRequest, MessageResponse, ProfileResponse,
            RefreshRequest, RefreshResponse, ValidateTokenResponse,
        },
        ErrorResponse,
    },
    middleware::AuthUser,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account deactivated", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .auth_service
        .login(&req.email, &Password::new(req.password))
        .await?;

    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        user: session.user.sanitized(),
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_in: session.expires_in,
    }))
}

/// Sign out
///
/// Marks the caller offline, revokes the presented access token and, when
/// given, the refresh token's session.
#[utoipa::path(
    post,
    path = "/logout",
    request_body(content = LogoutRequest, description = "Optional refresh token to revoke"),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Invalid refresh token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    state
        .auth_service
        .logout(&auth.user, Some(&auth.claims), req.refresh_token.as_deref())
        .await?;

    Ok(Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Invalid, revoked or expired refresh token", body = ErrorResponse),
        (status = 403, description = "Account deactivated", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let refreshed = state
        .auth_service
        .refresh_access_token(&req.refresh_token)
        .await?;

    Ok(Json(RefreshResponse {
        access_token: refreshed.access_token,
        expires_in: refreshed.expires_in,
        user: refreshed.user.sanitized(),
    }))
}

/// Check the bearer token and refresh the caller's presence
#[utoipa::path(
    get,
    path = "/token/validate",
    responses(
        (status = 200, description = "Token is valid", body = ValidateTokenResponse),
        (status = 401, description = "Invalid or revoked token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn validate_token(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .credentials
        .update_online_status(auth.user.id, true)
        .await?;

    Ok(Json(ValidateTokenResponse {
        valid: true,
        user: user.sanitized(),
        message: "Token is valid".to_string(),
    }))
}

/// Current user
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Current user", body = ProfileResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn profile(auth: AuthUser) -> impl IntoResponse {
    Json(ProfileResponse {
        user: auth.user.sanitized(),
    })
}
