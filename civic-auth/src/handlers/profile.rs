use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    dtos::{ProfileResponse, UpdateProfileRequest},
    error::AppError,
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// Get the authenticated user's profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/profile",
    responses(
        (status = 200, description = "Sanitized profile", body = ProfileResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Profile",
    security(("bearer_auth" = []))
)]
pub async fn get_profile(AuthUser(user): AuthUser) -> impl IntoResponse {
    (StatusCode::OK, Json(ProfileResponse { user }))
}

/// Update name and phone
#[utoipa::path(
    put,
    path = "/api/v1/auth/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 401, description = "Not authenticated"),
        (status = 422, description = "Validation error")
    ),
    tag = "Profile",
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = state
        .store
        .update_profile(user.id, req.name.clone(), req.phone)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    // Mirror the display name to the federated account; local row stays
    // authoritative if the provider call fails.
    if let (Some(name), Some(uid)) = (req.name.as_deref(), updated.provider_uid.as_deref()) {
        if let Err(e) = state.provider.update_account(uid, Some(name)).await {
            tracing::warn!(user_id = %user.id, error = %e, "Provider profile update failed");
        }
    }

    tracing::info!(user_id = %user.id, "Profile updated");

    Ok((
        StatusCode::OK,
        Json(ProfileResponse {
            user: updated.sanitized(),
        }),
    ))
}
