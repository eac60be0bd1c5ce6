//! Registration saga: the system's only multi-resource write.
//!
//! Order matters: the provider account is created first, then the local row.
//! A local failure after the provider write compensates by deleting the
//! just-created provider account, so no orphaned federated account survives
//! a known failure.

use std::sync::Arc;

use crate::models::{SanitizedUser, User, UserRole};
use crate::services::provider::{IdentityProvider, ProviderError};
use crate::services::saga::Saga;
use crate::services::store::{CredentialStore, StoreError};
use crate::services::ServiceError;
use crate::utils::hash_password;

#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn IdentityProvider>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn CredentialStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { store, provider }
    }

    /// Register a new account in both identity systems.
    ///
    /// Postcondition on success: exactly one User row and one provider
    /// account, linked by uid.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: UserRole,
    ) -> Result<SanitizedUser, ServiceError> {
        let email = email.trim().to_lowercase();

        // Step 1: local uniqueness check. The insert below still enforces
        // this under race; checking first avoids a provider write we would
        // immediately have to compensate.
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::DuplicateIdentity);
        }

        let mut saga = Saga::new("register");

        // Step 2: create the federated account.
        let provider_uid = match self.provider.create_account(&email, password, name).await {
            Ok(uid) => uid,
            Err(ProviderError::Duplicate) => return Err(ServiceError::DuplicateIdentity),
            Err(e) => {
                // Nothing created yet; no compensation needed.
                return Err(ServiceError::RegistrationFailed(anyhow::anyhow!(
                    "provider account creation failed: {}",
                    e
                )));
            }
        };

        {
            let provider = self.provider.clone();
            let uid = provider_uid.clone();
            saga.on_rollback("delete provider account", async move {
                provider
                    .delete_account(&uid)
                    .await
                    .map_err(|e| anyhow::anyhow!("{}", e))
            });
        }

        // Step 3: slow salted hash for the local credential.
        let password_hash = match hash_password(password) {
            Ok(hash) => hash,
            Err(e) => {
                saga.unwind().await;
                return Err(ServiceError::RegistrationFailed(e));
            }
        };

        // Step 4: local row referencing the provider uid.
        let user = User::new_local(
            email.clone(),
            name.to_string(),
            password_hash,
            provider_uid.clone(),
            role,
        );

        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict(constraint)) => {
                // A racing registration won between the check and the insert.
                tracing::warn!(
                    email = %email,
                    constraint = %constraint,
                    "Registration lost uniqueness race; rolling back provider account"
                );
                saga.unwind().await;
                return Err(ServiceError::RegistrationFailed(anyhow::anyhow!(
                    "local insert lost uniqueness race on {}",
                    constraint
                )));
            }
            Err(StoreError::Other(e)) => {
                saga.unwind().await;
                return Err(ServiceError::RegistrationFailed(e));
            }
        }

        saga.commit();

        tracing::info!(user_id = %user.id, provider_uid = %provider_uid, "User registered");

        Ok(user.sanitized())
    }
}
