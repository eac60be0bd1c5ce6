use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::{
    dtos::{
        AuthResponse, FederatedLoginRequest, LoginRequest, MessageResponse, RefreshRequest,
        RegisterRequest,
    },
    error::AppError,
    middleware::AuthUser,
    models::UserRole,
    utils::ValidatedJson,
    AppState,
};

/// Caller-declared device descriptor and origin address, as forwarded by
/// the edge.
fn caller_context(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let device = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());
    (device, address)
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account registered", body = AuthResponse),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Validation error"),
        (status = 500, description = "Registration failed")
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = req.role.unwrap_or(UserRole::Stakeholder);

    let user = state
        .registration
        .register(&req.email, &req.password, &req.name, role)
        .await?;

    let (device, address) = caller_context(&headers);
    let tokens = state.sessions.create_session(user.id, device, address).await?;

    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Role not permitted on the password path"),
        (status = 422, description = "Validation error")
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .verifier
        .verify_password(&req.email, &req.password)
        .await?;

    let (device, address) = caller_context(&headers);
    let tokens = state.sessions.create_session(user.id, device, address).await?;

    Ok((StatusCode::OK, Json(AuthResponse { user, tokens })))
}

/// Login with a federated identity-provider assertion
#[utoipa::path(
    post,
    path = "/api/v1/auth/login/federated",
    request_body = FederatedLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid assertion"),
        (status = 422, description = "Validation error")
    ),
    tag = "Authentication"
)]
pub async fn login_federated(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<FederatedLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.verifier.verify_assertion(&req.assertion).await?;

    let (device, address) = caller_context(&headers);
    let tokens = state.sessions.create_session(user.id, device, address).await?;

    Ok((StatusCode::OK, Json(AuthResponse { user, tokens })))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token pair rotated", body = AuthResponse),
        (status = 401, description = "Invalid refresh token")
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (tokens, user) = state.sessions.refresh(&req.refresh_token).await?;

    Ok((StatusCode::OK, Json(AuthResponse { user, tokens })))
}

/// Logout from this device
///
/// The client discards its tokens; nothing is revoked server-side. Use
/// logout-all to invalidate every outstanding access token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout(AuthUser(user): AuthUser) -> impl IntoResponse {
    tracing::info!(user_id = %user.id, "User logged out");
    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
}

/// Logout from all devices
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout-all",
    responses(
        (status = 200, description = "All sessions invalidated", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.sessions.invalidate_all(user.id).await?;

    tracing::info!(user_id = %user.id, "User logged out from all devices");
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Logged out from all devices successfully".to_string(),
        }),
    ))
}
