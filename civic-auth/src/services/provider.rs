//! Identity-provider collaborator.
//!
//! The provider is a black box: create/update/delete a federated account and
//! verify a bearer assertion. `HttpIdentityProvider` speaks the provider's
//! REST account API; `MockIdentityProvider` backs tests with failure
//! injection for the saga paths.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ProviderConfig;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider already holds an account for this email.
    #[error("identity already exists at the provider")]
    Duplicate,

    /// The assertion did not verify. Detail stays internal.
    #[error("assertion verification failed")]
    Verification,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Verified claims extracted from a federated assertion.
#[derive(Debug, Clone)]
pub struct ProviderClaims {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a federated account, returning the provider-assigned uid.
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<String, ProviderError>;

    /// Delete a federated account. Used as the registration saga's
    /// compensating action.
    async fn delete_account(&self, uid: &str) -> Result<(), ProviderError>;

    /// Push profile changes to the federated account.
    async fn update_account(&self, uid: &str, name: Option<&str>) -> Result<(), ProviderError>;

    /// Verify a bearer assertion and return its claims.
    async fn verify_assertion(&self, token: &str) -> Result<ProviderClaims, ProviderError>;
}

/// REST-backed provider client.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(rename = "localId")]
    local_id: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
struct LookupUser {
    #[serde(rename = "localId")]
    local_id: String,
    email: String,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl HttpIdentityProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self, op: &str) -> String {
        format!("{}/accounts:{}?key={}", self.base_url, op, self.api_key)
    }

    /// Read the provider's error code out of a non-success response.
    /// The code is logged for diagnostics but never surfaced to callers.
    async fn error_code(res: reqwest::Response) -> String {
        let status = res.status();
        match res.json::<ApiErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => format!("HTTP {}", status),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<String, ProviderError> {
        let res = self
            .client
            .post(self.endpoint("signUp"))
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "displayName": name,
                "returnSecureToken": false,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Other(anyhow::anyhow!("provider unreachable: {}", e)))?;

        if !res.status().is_success() {
            let code = Self::error_code(res).await;
            if code.starts_with("EMAIL_EXISTS") {
                return Err(ProviderError::Duplicate);
            }
            tracing::error!(code = %code, "Provider account creation failed");
            return Err(ProviderError::Other(anyhow::anyhow!(
                "provider rejected account creation"
            )));
        }

        let body: SignUpResponse = res
            .json()
            .await
            .map_err(|e| ProviderError::Other(anyhow::anyhow!("malformed provider reply: {}", e)))?;

        Ok(body.local_id)
    }

    async fn delete_account(&self, uid: &str) -> Result<(), ProviderError> {
        let res = self
            .client
            .post(self.endpoint("delete"))
            .json(&serde_json::json!({ "localId": uid }))
            .send()
            .await
            .map_err(|e| ProviderError::Other(anyhow::anyhow!("provider unreachable: {}", e)))?;

        if !res.status().is_success() {
            let code = Self::error_code(res).await;
            tracing::error!(code = %code, uid = %uid, "Provider account deletion failed");
            return Err(ProviderError::Other(anyhow::anyhow!(
                "provider rejected account deletion"
            )));
        }
        Ok(())
    }

    async fn update_account(&self, uid: &str, name: Option<&str>) -> Result<(), ProviderError> {
        let mut body = serde_json::json!({ "localId": uid });
        if let Some(name) = name {
            body["displayName"] = serde_json::Value::String(name.to_string());
        }

        let res = self
            .client
            .post(self.endpoint("update"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Other(anyhow::anyhow!("provider unreachable: {}", e)))?;

        if !res.status().is_success() {
            let code = Self::error_code(res).await;
            tracing::error!(code = %code, uid = %uid, "Provider account update failed");
            return Err(ProviderError::Other(anyhow::anyhow!(
                "provider rejected account update"
            )));
        }
        Ok(())
    }

    async fn verify_assertion(&self, token: &str) -> Result<ProviderClaims, ProviderError> {
        let res = self
            .client
            .post(self.endpoint("lookup"))
            .json(&serde_json::json!({ "idToken": token }))
            .send()
            .await
            .map_err(|e| ProviderError::Other(anyhow::anyhow!("provider unreachable: {}", e)))?;

        if !res.status().is_success() {
            let code = Self::error_code(res).await;
            tracing::warn!(code = %code, "Assertion verification rejected by provider");
            return Err(ProviderError::Verification);
        }

        let body: LookupResponse = res
            .json()
            .await
            .map_err(|_| ProviderError::Verification)?;

        let user = body.users.into_iter().next().ok_or(ProviderError::Verification)?;

        Ok(ProviderClaims {
            subject: user.local_id,
            email: user.email,
            name: user.display_name,
        })
    }
}

/// In-process provider for tests: a uid-keyed account table plus a table of
/// assertions it will vouch for, with injectable failures.
#[derive(Default)]
pub struct MockIdentityProvider {
    inner: Mutex<MockInner>,
}

#[derive(Default)]
struct MockInner {
    accounts: HashMap<String, MockAccount>,
    assertions: HashMap<String, String>, // token -> uid
    next_uid: u64,
    fail_create_duplicate: bool,
    fail_create_other: bool,
    fail_delete: bool,
}

#[derive(Clone)]
struct MockAccount {
    email: String,
    name: String,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a federated account and return a valid assertion for it.
    pub fn seed_account(&self, email: &str, name: &str) -> (String, String) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_uid += 1;
        let uid = format!("prov-{}", inner.next_uid);
        inner.accounts.insert(
            uid.clone(),
            MockAccount {
                email: email.to_string(),
                name: name.to_string(),
            },
        );
        let token = format!("assertion-{}", uid);
        inner.assertions.insert(token.clone(), uid.clone());
        (uid, token)
    }

    /// A fresh assertion for an already-seeded uid.
    pub fn issue_assertion(&self, uid: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        let token = format!("assertion-{}-{}", uid, inner.assertions.len());
        inner.assertions.insert(token.clone(), uid.to_string());
        token
    }

    pub fn fail_next_create_with_duplicate(&self) {
        self.inner.lock().unwrap().fail_create_duplicate = true;
    }

    pub fn fail_next_create(&self) {
        self.inner.lock().unwrap().fail_create_other = true;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_delete = fail;
    }

    pub fn account_count(&self) -> usize {
        self.inner.lock().unwrap().accounts.len()
    }

    pub fn has_account(&self, uid: &str) -> bool {
        self.inner.lock().unwrap().accounts.contains_key(uid)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        _password: &str,
        name: &str,
    ) -> Result<String, ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_create_duplicate {
            inner.fail_create_duplicate = false;
            return Err(ProviderError::Duplicate);
        }
        if inner.fail_create_other {
            inner.fail_create_other = false;
            return Err(ProviderError::Other(anyhow::anyhow!(
                "injected provider failure"
            )));
        }
        if inner.accounts.values().any(|a| a.email == email) {
            return Err(ProviderError::Duplicate);
        }
        inner.next_uid += 1;
        let uid = format!("prov-{}", inner.next_uid);
        inner.accounts.insert(
            uid.clone(),
            MockAccount {
                email: email.to_string(),
                name: name.to_string(),
            },
        );
        Ok(uid)
    }

    async fn delete_account(&self, uid: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_delete {
            return Err(ProviderError::Other(anyhow::anyhow!(
                "injected delete failure"
            )));
        }
        inner.accounts.remove(uid);
        Ok(())
    }

    async fn update_account(&self, uid: &str, name: Option<&str>) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(account) = inner.accounts.get_mut(uid) {
            if let Some(name) = name {
                account.name = name.to_string();
            }
        }
        Ok(())
    }

    async fn verify_assertion(&self, token: &str) -> Result<ProviderClaims, ProviderError> {
        let inner = self.inner.lock().unwrap();
        let uid = inner
            .assertions
            .get(token)
            .ok_or(ProviderError::Verification)?;
        let account = inner.accounts.get(uid).ok_or(ProviderError::Verification)?;
        Ok(ProviderClaims {
            subject: uid.clone(),
            email: account.email.clone(),
            name: Some(account.name.clone()),
        })
    }
}
