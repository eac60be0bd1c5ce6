//! Environment-driven configuration.
//!
//! Loaded once at startup; a missing or malformed value fails fast before
//! anything binds a port or opens a pool.

use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    #[serde(default = "default_access_expiry_minutes")]
    pub access_token_expiry_minutes: i64,
}

/// Identity-provider REST endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_expiry_days")]
    pub expiry_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_days: default_session_expiry_days(),
        }
    }
}

fn default_service_name() -> String {
    "civic-auth".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_access_expiry_minutes() -> i64 {
    15
}

fn default_provider_base_url() -> String {
    "https://identitytoolkit.googleapis.com/v1".to_string()
}

fn default_session_expiry_days() -> i64 {
    30
}

impl AuthConfig {
    /// Load configuration from the environment (and an optional `.env`).
    ///
    /// Keys use the `APP` prefix with `__` as the nesting separator, e.g.
    /// `APP__DATABASE__URL`, `APP__JWT__PRIVATE_KEY_PATH`.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let cfg: AuthConfig = serde_json::from_value(serde_json::json!({
            "database": { "url": "postgres://localhost/civic_auth" },
            "jwt": {
                "private_key_path": "/tmp/priv.pem",
                "public_key_path": "/tmp/pub.pem"
            },
            "provider": { "api_key": "test-key" }
        }))
        .expect("config should deserialize with defaults");

        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.session.expiry_days, 30);
        assert_eq!(cfg.jwt.access_token_expiry_minutes, 15);
        assert_eq!(cfg.database.max_connections, 10);
    }
}
