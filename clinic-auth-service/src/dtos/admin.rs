use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BootstrapAdminRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "admin@example.com")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 150))]
    pub first_name: String,

    #[validate(length(min = 1, max = 150))]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSpecialityRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    #[schema(example = "Cardiology")]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    #[validate(length(max = 50))]
    pub icon: String,
}
