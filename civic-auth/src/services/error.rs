use thiserror::Error;

use crate::error::AppError;
use crate::services::store::StoreError;

/// Domain error taxonomy. Every core operation fails with exactly one of
/// these; underlying provider/store causes are attached for logs and never
/// serialized to the caller.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Registration conflict: the email (or the provider's account for it)
    /// already exists.
    #[error("Email already registered")]
    DuplicateIdentity,

    /// Malformed input caught past the boundary validators.
    #[error("Validation error: {0}")]
    ValidationFailed(String),

    /// Wrong password, bad assertion, unknown account, stale token version.
    /// Deliberately a single shape: it never says which check failed.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Role not permitted on this authentication path.
    #[error("Access denied")]
    Forbidden,

    /// Unknown, inactive, expired, or already-consumed refresh token.
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// Provider or store failure during the registration saga, surfaced
    /// after best-effort compensation.
    #[error("Registration failed")]
    RegistrationFailed(#[source] anyhow::Error),

    /// Store plumbing failure outside the saga.
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(c) => {
                // A conflict reaching here escaped a recovery path; treat it
                // as internal rather than leaking the constraint name.
                ServiceError::Internal(anyhow::anyhow!("unexpected unique conflict: {}", c))
            }
            StoreError::Other(e) => ServiceError::Internal(e),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::DuplicateIdentity => {
                AppError::Conflict("Email already registered".to_string())
            }
            ServiceError::ValidationFailed(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized("Invalid credentials".to_string())
            }
            ServiceError::Forbidden => AppError::Forbidden("Access denied".to_string()),
            ServiceError::InvalidRefreshToken => {
                AppError::Unauthorized("Invalid refresh token".to_string())
            }
            ServiceError::RegistrationFailed(e) => {
                tracing::error!(error = %e, "Registration failed");
                AppError::InternalError(anyhow::anyhow!("Registration failed"))
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_share_one_message() {
        // Enumeration resistance: unknown email and wrong password must be
        // indistinguishable.
        let a = ServiceError::InvalidCredentials.to_string();
        let b = ServiceError::InvalidCredentials.to_string();
        assert_eq!(a, b);
        assert_eq!(a, "Invalid credentials");
    }

    #[test]
    fn registration_failure_hides_its_cause() {
        let err = ServiceError::RegistrationFailed(anyhow::anyhow!("pg: constraint users_x"));
        assert_eq!(err.to_string(), "Registration failed");
    }
}
