use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::IntoResponse,
};

use crate::error::AppError;
use crate::models::SanitizedUser;
use crate::AppState;

/// Require a bearer access token.
///
/// Signature and expiry are checked against the JWT; the identity is then
/// re-resolved from the live store on every request (active flag and
/// token-version included), so nothing embedded in the token beyond the
/// subject id is trusted.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized("Missing or invalid Authorization header".to_string())
        })?;

    let claims = state
        .jwt
        .validate_access_token(token)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    let user = state.sessions.resolve_access_claims(&claims).await?;

    // Handlers pick the resolved identity up from request extensions.
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Extractor for the resolved identity in authenticated handlers.
pub struct AuthUser(pub SanitizedUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts.extensions.get::<SanitizedUser>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Resolved identity missing from request extensions"
            ))
        })?;

        Ok(AuthUser(user.clone()))
    }
}
