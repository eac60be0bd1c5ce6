//! Session model - one refresh cycle's credential.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Session entity. The row id is stable across refreshes; rotation replaces
/// only the token pair.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub refresh_token: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session with a fixed expiry window from now.
    pub fn new(
        user_id: Uuid,
        token: String,
        refresh_token: String,
        device_info: Option<String>,
        ip_address: Option<String>,
        expiry_days: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            refresh_token,
            device_info,
            ip_address,
            expires_at: Utc::now() + Duration::days(expiry_days),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Usable for refresh: active and not past expiry.
    pub fn is_valid(&self) -> bool {
        self.is_active && !self.is_expired()
    }
}
