//! User model - the single identity record both credential sources resolve to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role codes. `Citizen` is the base role; `Stakeholder` and `Admin` are
/// elevated roles and the only ones permitted on the password login path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Citizen,
    Stakeholder,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Citizen => "citizen",
            UserRole::Stakeholder => "stakeholder",
            UserRole::Admin => "admin",
        }
    }

    /// Elevated roles may authenticate with a local password.
    pub fn is_elevated(&self) -> bool {
        matches!(self, UserRole::Stakeholder | UserRole::Admin)
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "citizen" => Ok(UserRole::Citizen),
            "stakeholder" => Ok(UserRole::Stakeholder),
            "admin" => Ok(UserRole::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// User entity.
///
/// At least one of `password_hash` / `provider_uid` is always present:
/// password registration writes both, federated auto-provisioning writes only
/// `provider_uid`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub provider_uid: Option<String>,
    pub role_code: String,
    pub is_active: bool,
    pub points: i64,
    pub token_version: i32,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a locally registered user linked to a federated account.
    pub fn new_local(
        email: String,
        name: String,
        password_hash: String,
        provider_uid: String,
        role: UserRole,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            phone: None,
            password_hash: Some(password_hash),
            provider_uid: Some(provider_uid),
            role_code: role.as_str().to_string(),
            is_active: true,
            points: 0,
            token_version: 0,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    /// Create a user auto-provisioned from a verified federated assertion.
    /// No local password; base role; zero points.
    pub fn new_federated(email: String, name: String, provider_uid: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            phone: None,
            password_hash: None,
            provider_uid: Some(provider_uid),
            role_code: UserRole::Citizen.as_str().to_string(),
            is_active: true,
            points: 0,
            token_version: 0,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    pub fn role(&self) -> UserRole {
        self.role_code.parse().unwrap_or(UserRole::Citizen)
    }

    /// Convert to the sanitized shape handed to callers. Never carries the
    /// password hash.
    pub fn sanitized(&self) -> SanitizedUser {
        SanitizedUser {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            phone: self.phone.clone(),
            role: self.role(),
            points: self.points,
            provider_uid: self.provider_uid.clone(),
            created_at: self.created_at,
            last_login_at: self.last_login_at,
        }
    }
}

/// User shape exposed upward (no credential material).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SanitizedUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub points: i64,
    pub provider_uid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}
