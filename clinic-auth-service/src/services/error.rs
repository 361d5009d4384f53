use service_core::error::AppError;
use thiserror::Error;

use crate::repository::RepositoryError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Enter a valid email address")]
    InvalidEmail,

    #[error("User with this email already exists")]
    DuplicateEmail,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User account is deactivated")]
    AccountDeactivated,

    #[error("Invalid verification token")]
    TokenNotFound,

    #[error("Verification link has expired")]
    TokenExpired,

    #[error("Verification link has already been used")]
    TokenAlreadyUsed,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Email is already verified")]
    AlreadyVerified,

    /// The account was created but signing it in straight away failed.
    #[error("Registered successfully, but login failed with {0}")]
    RegisteredButLoginFailed(String),

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("Consultant not found")]
    ConsultantNotFound,

    #[error("Speciality not found")]
    SpecialityNotFound,

    #[error("You have already reviewed this consultant")]
    DuplicateReview,

    #[error("License number is already registered")]
    DuplicateLicense,

    #[error("An availability slot already starts at this time")]
    DuplicateSlot,

    #[error("Speciality already exists")]
    DuplicateSpeciality,

    #[error("{0}")]
    Forbidden(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Repository(RepositoryError::Unavailable(reason)) => {
                tracing::error!(reason = %reason, "Storage unavailable");
                AppError::ServiceUnavailable
            }
            ServiceError::Repository(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::RegisteredButLoginFailed(_) => {
                AppError::InternalError(anyhow::anyhow!(message))
            }
            ServiceError::Validation(_)
            | ServiceError::PasswordMismatch
            | ServiceError::InvalidEmail
            | ServiceError::TokenNotFound
            | ServiceError::TokenExpired
            | ServiceError::TokenAlreadyUsed
            | ServiceError::AlreadyVerified => AppError::BadRequest(anyhow::anyhow!(message)),
            ServiceError::InvalidCredentials
            | ServiceError::InvalidToken
            | ServiceError::ExpiredToken => AppError::AuthError(anyhow::anyhow!(message)),
            ServiceError::AccountDeactivated | ServiceError::Forbidden(_) => {
                AppError::Forbidden(anyhow::anyhow!(message))
            }
            ServiceError::UserNotFound
            | ServiceError::ProfileNotFound
            | ServiceError::ConsultantNotFound
            | ServiceError::SpecialityNotFound => AppError::NotFound(anyhow::anyhow!(message)),
            ServiceError::DuplicateEmail
            | ServiceError::DuplicateReview
            | ServiceError::DuplicateLicense
            | ServiceError::DuplicateSlot
            | ServiceError::DuplicateSpeciality => AppError::Conflict(anyhow::anyhow!(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn status(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn domain_failures_map_to_client_errors() {
        assert_eq!(status(ServiceError::PasswordMismatch), StatusCode::BAD_REQUEST);
        assert_eq!(status(ServiceError::TokenExpired), StatusCode::BAD_REQUEST);
        assert_eq!(status(ServiceError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ServiceError::ExpiredToken), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ServiceError::AccountDeactivated), StatusCode::FORBIDDEN);
        assert_eq!(status(ServiceError::DuplicateEmail), StatusCode::CONFLICT);
        assert_eq!(status(ServiceError::ConsultantNotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_failures_are_fatal() {
        assert_eq!(
            status(ServiceError::Repository(RepositoryError::Unavailable("down".into()))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ServiceError::Repository(RepositoryError::NotFound("user"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(ServiceError::RegisteredButLoginFailed("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
