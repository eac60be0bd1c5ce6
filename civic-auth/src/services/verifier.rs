//! Credential verifier: both authentication paths resolve to the same
//! canonical, sanitized identity.

use std::sync::Arc;

use crate::models::{SanitizedUser, User};
use crate::services::provider::{IdentityProvider, ProviderClaims};
use crate::services::store::{CredentialStore, StoreError};
use crate::services::ServiceError;
use crate::utils::password_matches;

#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn IdentityProvider>,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn CredentialStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { store, provider }
    }

    /// Authenticate with a local password.
    ///
    /// Unknown email, inactive account, and wrong password all collapse into
    /// the same `InvalidCredentials`; only the role gate is distinguishable.
    pub async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SanitizedUser, ServiceError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !user.is_active {
            return Err(ServiceError::InvalidCredentials);
        }

        let Some(stored_hash) = user.password_hash.as_deref() else {
            // Federated-only account; no password to check.
            return Err(ServiceError::InvalidCredentials);
        };

        if !password_matches(password, stored_hash) {
            return Err(ServiceError::InvalidCredentials);
        }

        // Password login is restricted to elevated roles; base-role accounts
        // use the federated path.
        if !user.role().is_elevated() {
            return Err(ServiceError::Forbidden);
        }

        self.store.touch_last_login(user.id).await?;

        tracing::info!(user_id = %user.id, "Password login");

        Ok(user.sanitized())
    }

    /// Authenticate with a federated assertion, auto-provisioning the local
    /// row on first login.
    pub async fn verify_assertion(&self, token: &str) -> Result<SanitizedUser, ServiceError> {
        let claims = self.provider.verify_assertion(token).await.map_err(|e| {
            tracing::warn!(error = %e, "Assertion verification failed");
            ServiceError::InvalidCredentials
        })?;

        let user = self.find_or_provision(&claims).await?;

        if !user.is_active {
            return Err(ServiceError::InvalidCredentials);
        }

        self.store.touch_last_login(user.id).await?;

        tracing::info!(user_id = %user.id, provider_uid = %claims.subject, "Federated login");

        Ok(user.sanitized())
    }

    /// Get-or-create keyed on the provider uid.
    ///
    /// Race-safe by construction: insert and treat a uniqueness conflict as
    /// "the row now exists, re-read it" instead of check-then-insert. If the
    /// conflict was on email rather than uid, the provider uid is attached
    /// to that existing row.
    async fn find_or_provision(&self, claims: &ProviderClaims) -> Result<User, ServiceError> {
        if let Some(user) = self.store.find_user_by_provider_uid(&claims.subject).await? {
            return Ok(user);
        }

        let name = claims.name.clone().unwrap_or_else(|| "User".to_string());
        let email = claims.email.trim().to_lowercase();
        let user = User::new_federated(email.clone(), name, claims.subject.clone());

        match self.store.insert_user(&user).await {
            Ok(()) => {
                tracing::info!(user_id = %user.id, "User auto-provisioned from federated login");
                Ok(user)
            }
            Err(StoreError::Conflict(_)) => {
                // Lost the race, or the email already belongs to a local row.
                if let Some(existing) =
                    self.store.find_user_by_provider_uid(&claims.subject).await?
                {
                    return Ok(existing);
                }
                let existing = self
                    .store
                    .find_user_by_email(&email)
                    .await?
                    .ok_or(ServiceError::InvalidCredentials)?;
                self.store
                    .attach_provider_uid(existing.id, &claims.subject)
                    .await?;
                self.store
                    .find_user_by_id(existing.id)
                    .await?
                    .ok_or(ServiceError::InvalidCredentials)
            }
            Err(e) => Err(e.into()),
        }
    }
}
