use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            EmailSentResponse, ResendVerificationRequest, VerifyEmailFailure, VerifyEmailRequest,
            VerifyEmailResponse,
        },
        ErrorResponse,
    },
    middleware::AuthUser,
    models::User,
    services::{ResendOutcome, ServiceError},
    utils::ValidatedJson,
    AppState,
};

/// Redeem a verification token
#[utoipa::path(
    post,
    path = "/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = VerifyEmailResponse),
        (status = 400, description = "Unknown, expired or used token", body = VerifyEmailFailure)
    ),
    tag = "Email Verification"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyEmailRequest>,
) -> Result<Response, AppError> {
    let verified = match req.token_id() {
        Some(token) => state.verification_service.verify_email_token(token).await,
        None => Err(ServiceError::TokenNotFound),
    };
    match verified {
        Ok(user) => Ok(Json(VerifyEmailResponse {
            message: "Email verified successfully".to_string(),
            user: user.sanitized(),
            verified: true,
        })
        .into_response()),
        Err(
            e @ (ServiceError::TokenNotFound
            | ServiceError::TokenExpired
            | ServiceError::TokenAlreadyUsed
            | ServiceError::UserNotFound),
        ) => Ok((
            StatusCode::BAD_REQUEST,
            Json(VerifyEmailFailure {
                verified: false,
                error: e.to_string(),
            }),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// Resend the verification email to an address
#[utoipa::path(
    post,
    path = "/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Verification email sent", body = EmailSentResponse),
        (status = 400, description = "Already verified or delivery failed", body = EmailSentResponse),
        (status = 404, description = "Unknown email", body = EmailSentResponse),
        (status = 429, description = "Too many verification emails", body = EmailSentResponse)
    ),
    tag = "Email Verification"
)]
pub async fn resend_verification(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendVerificationRequest>,
) -> Result<Response, AppError> {
    let Some(user) = state.credentials.find_by_email(&req.email).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(EmailSentResponse::error("User with this email does not exist")),
        )
            .into_response());
    };

    resend(&state, &user).await
}

/// Send a verification email to the signed-in user
#[utoipa::path(
    post,
    path = "/send-verification",
    responses(
        (status = 200, description = "Verification email sent", body = EmailSentResponse),
        (status = 400, description = "Already verified or delivery failed", body = EmailSentResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 429, description = "Too many verification emails", body = EmailSentResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Email Verification"
)]
pub async fn send_verification(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, AppError> {
    resend(&state, &auth.user).await
}

async fn resend(state: &AppState, user: &User) -> Result<Response, AppError> {
    let outcome = match state.verification_service.resend_verification_email(user).await {
        Ok(outcome) => outcome,
        Err(e @ ServiceError::AlreadyVerified) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(EmailSentResponse::error(e.to_string())),
            )
                .into_response())
        }
        Err(e) => return Err(e.into()),
    };

    let status = match outcome {
        ResendOutcome::Sent => StatusCode::OK,
        ResendOutcome::Throttled => StatusCode::TOO_MANY_REQUESTS,
        ResendOutcome::DeliveryFailed => StatusCode::BAD_REQUEST,
    };
    Ok((
        status,
        Json(EmailSentResponse::message(outcome.email_sent(), outcome.reason())),
    )
        .into_response())
}
