use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Role, UserResponse};

/// Roles open to self-registration. Admins are bootstrapped separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationRole {
    #[default]
    Patient,
    Consultant,
}

impl From<RegistrationRole> for Role {
    fn from(role: RegistrationRole) -> Self {
        match role {
            RegistrationRole::Patient => Role::Patient,
            RegistrationRole::Consultant => Role::Consultant,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "pw12345678", min_length = 8)]
    pub password: String,

    #[serde(alias = "confirm_password")]
    #[schema(example = "pw12345678")]
    pub password_confirm: String,

    #[validate(length(min = 1, max = 150, message = "First name is required"))]
    #[schema(example = "Jane")]
    pub first_name: String,

    #[validate(length(min = 1, max = 150, message = "Last name is required"))]
    #[schema(example = "Doe")]
    pub last_name: String,

    #[serde(default)]
    pub role: RegistrationRole,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "pw12345678")]
    pub password: String,
}

/// User plus a fresh token pair.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    #[schema(example = "Login successful")]
    pub message: String,
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = 900)]
    pub expires_in: i64,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct LogoutRequest {
    #[serde(default, alias = "refresh")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[serde(alias = "refresh")]
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    #[schema(example = 900)]
    pub expires_in: i64,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    pub user: UserResponse,
    #[schema(example = "Token is valid")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyEmailRequest {
    /// Token from the verification link. Anything that is not a known
    /// token is reported as an invalid token.
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub token: String,
}

impl VerifyEmailRequest {
    pub fn token_id(&self) -> Option<Uuid> {
        Uuid::parse_str(self.token.trim()).ok()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyEmailResponse {
    #[schema(example = "Email verified successfully")]
    pub message: String,
    pub user: UserResponse,
    pub verified: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyEmailFailure {
    pub verified: bool,
    #[schema(example = "Verification link has expired")]
    pub error: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResendVerificationRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,
}

/// Outcome of a (re)send request. `message` carries the reason.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmailSentResponse {
    pub email_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "Verification sent successfully to email")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmailSentResponse {
    pub fn message(email_sent: bool, message: impl Into<String>) -> Self {
        Self {
            email_sent,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            email_sent: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Logged out successfully")]
    pub message: String,
}
