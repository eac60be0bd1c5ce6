use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{SanitizedUser, UserRole};
use crate::services::TokenPair;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    #[schema(example = "password123", min_length = 6)]
    pub password: String,

    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    #[schema(example = "Jane Doe")]
    pub name: String,

    /// Defaults to `stakeholder` when omitted.
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

/// Federated login: a bearer assertion issued by the identity provider.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct FederatedLoginRequest {
    #[validate(length(min = 1, message = "Assertion is required"))]
    #[schema(example = "eyJhbGciOi...")]
    pub assertion: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    #[schema(example = "9f8e7d6c...")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Successful authentication: the sanitized identity plus a token pair.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: SanitizedUser,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user: SanitizedUser,
}
