//! Session manager: refresh-token-backed sessions and access-token claim
//! resolution.
//!
//! Session state machine: ACTIVE --refresh--> ACTIVE (new token pair, same
//! row id); ACTIVE --expiry or logout-all--> INVALID. Nothing else.

use std::sync::Arc;

use rand::Rng;
use uuid::Uuid;

use crate::models::{SanitizedUser, Session};
use crate::services::jwt::{AccessTokenClaims, JwtService};
use crate::services::store::CredentialStore;
use crate::services::ServiceError;

/// Token pair handed to the caller for transport.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    jwt: JwtService,
    expiry_days: i64,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, jwt: JwtService, expiry_days: i64) -> Self {
        Self {
            store,
            jwt,
            expiry_days,
        }
    }

    /// Mint and persist a session for an authenticated user.
    ///
    /// Fetches the live row so the access token captures the current
    /// token version.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        device_info: Option<String>,
        ip_address: Option<String>,
    ) -> Result<TokenPair, ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let session = Session::new(
            user.id,
            generate_opaque_token(),
            generate_opaque_token(),
            device_info,
            ip_address,
            self.expiry_days,
        );

        self.store.insert_session(&session).await?;

        let access_token = self
            .jwt
            .generate_access_token(&user)
            .map_err(ServiceError::Internal)?;

        tracing::debug!(user_id = %user.id, session_id = %session.id, "Session created");

        Ok(TokenPair {
            access_token,
            refresh_token: session.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }

    /// Rotate a refresh token: single use, same session row.
    ///
    /// The compare-and-swap in the store guarantees a concurrent second use
    /// of the same stale value fails instead of silently succeeding.
    pub async fn refresh(
        &self,
        refresh_token: &str,
    ) -> Result<(TokenPair, SanitizedUser), ServiceError> {
        let session = self
            .store
            .find_session_by_refresh_token(refresh_token)
            .await?
            .ok_or(ServiceError::InvalidRefreshToken)?;

        if !session.is_valid() {
            return Err(ServiceError::InvalidRefreshToken);
        }

        let rotated = self
            .store
            .rotate_session(refresh_token, &generate_opaque_token(), &generate_opaque_token())
            .await?
            // Consumed between lookup and swap by a concurrent refresh.
            .ok_or(ServiceError::InvalidRefreshToken)?;

        let user = self
            .store
            .find_user_by_id(rotated.user_id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !user.is_active {
            return Err(ServiceError::InvalidCredentials);
        }

        let access_token = self
            .jwt
            .generate_access_token(&user)
            .map_err(ServiceError::Internal)?;

        tracing::info!(user_id = %user.id, session_id = %rotated.id, "Token refreshed");

        Ok((
            TokenPair {
                access_token,
                refresh_token: rotated.refresh_token,
                token_type: "Bearer".to_string(),
                expires_in: self.jwt.access_token_expiry_seconds(),
            },
            user.sanitized(),
        ))
    }

    /// Logout everywhere: bump the user's token version. Every access token
    /// issued before this call fails claim resolution; no session rows are
    /// touched.
    pub async fn invalidate_all(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.store.increment_token_version(user_id).await?;
        tracing::info!(user_id = %user_id, "All sessions invalidated via token-version bump");
        Ok(())
    }

    /// Resolve verified access-token claims against live account state.
    ///
    /// Mandatory on every authenticated request: only `sub` and
    /// `token_version` are trusted from the token, everything else comes
    /// from the re-fetched row.
    pub async fn resolve_access_claims(
        &self,
        claims: &AccessTokenClaims,
    ) -> Result<SanitizedUser, ServiceError> {
        let user = self
            .store
            .find_user_by_id(claims.sub)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !user.is_active {
            return Err(ServiceError::InvalidCredentials);
        }

        if user.token_version != claims.token_version {
            return Err(ServiceError::InvalidCredentials);
        }

        Ok(user.sanitized())
    }
}

/// Cryptographically random opaque token, hex-encoded.
fn generate_opaque_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    hex::encode(token_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_tokens_are_unique_and_hex() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
