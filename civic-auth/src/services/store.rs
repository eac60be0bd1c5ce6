//! Credential store abstraction.
//!
//! The relational store is an external collaborator: unique-key lookups,
//! inserts with unique-constraint enforcement, updates by primary id, and an
//! atomic counter increment. `PgStore` is the production implementation;
//! `MemoryStore` backs tests and enforces the same uniqueness semantics.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Session, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write. Carries the constraint name
    /// for diagnostics only; callers treat this as the race signal and
    /// recover by re-reading.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::Conflict(constraint);
            }
        }
        StoreError::Other(anyhow::Error::new(err))
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Lookup by email, case-insensitive (email uniqueness is canonical).
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_provider_uid(&self, uid: &str) -> Result<Option<User>, StoreError>;

    /// Insert-if-absent: a duplicate email or provider uid surfaces as
    /// `StoreError::Conflict`, never as a second row.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Link a federated uid to an existing row.
    async fn attach_provider_uid(&self, id: Uuid, uid: &str) -> Result<(), StoreError>;

    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        phone: Option<String>,
    ) -> Result<Option<User>, StoreError>;

    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError>;

    /// Atomic counter bump invalidating every outstanding access token.
    async fn increment_token_version(&self, id: Uuid) -> Result<(), StoreError>;

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, StoreError>;

    /// Compare-and-swap rotation: replace the token pair on the row whose
    /// refresh token still equals `old_refresh_token` and which is still
    /// active. Returns the rewritten row, or `None` if the token was already
    /// consumed by a concurrent rotation.
    async fn rotate_session(
        &self,
        old_refresh_token: &str,
        new_token: &str,
        new_refresh_token: &str,
    ) -> Result<Option<Session>, StoreError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_provider_uid(&self, uid: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE provider_uid = $1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, name, phone, password_hash, provider_uid, role_code,
                 is_active, points, token_version, created_at, last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(&user.provider_uid)
        .bind(&user.role_code)
        .bind(user.is_active)
        .bind(user.points)
        .bind(user.token_version)
        .bind(user.created_at)
        .bind(user.last_login_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn attach_provider_uid(&self, id: Uuid, uid: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET provider_uid = $2 WHERE id = $1 AND provider_uid IS NULL")
            .bind(id)
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        phone: Option<String>,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name), phone = COALESCE($3, phone)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_token_version(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET token_version = token_version + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions
                (id, user_id, token, refresh_token, device_info, ip_address,
                 expires_at, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token)
        .bind(&session.refresh_token)
        .bind(&session.device_info)
        .bind(&session.ip_address)
        .bind(session.expires_at)
        .bind(session.is_active)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, StoreError> {
        let session =
            sqlx::query_as::<_, Session>("SELECT * FROM user_sessions WHERE refresh_token = $1")
                .bind(refresh_token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    async fn rotate_session(
        &self,
        old_refresh_token: &str,
        new_token: &str,
        new_refresh_token: &str,
    ) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE user_sessions
            SET token = $2, refresh_token = $3
            WHERE refresh_token = $1 AND is_active = TRUE
            RETURNING *
            "#,
        )
        .bind(old_refresh_token)
        .bind(new_token)
        .bind(new_refresh_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }
}

/// In-memory store for tests and local development. Enforces the same
/// uniqueness constraints the SQL schema declares, under a single lock so
/// insert-if-absent and rotation are atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: std::sync::Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    users: Vec<User>,
    sessions: Vec<Session>,
    // Failure injection: number of upcoming insert_user calls to reject.
    fail_user_inserts: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` user inserts fail with an internal store error.
    /// Drives the saga-compensation paths in tests.
    pub fn fail_next_user_inserts(&self, n: u32) {
        self.inner.lock().unwrap().fail_user_inserts = n;
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().unwrap().users.len()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_provider_uid(&self, uid: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.provider_uid.as_deref() == Some(uid))
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_user_inserts > 0 {
            inner.fail_user_inserts -= 1;
            return Err(StoreError::Other(anyhow::anyhow!(
                "injected store failure"
            )));
        }
        if inner
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }
        if user.provider_uid.is_some()
            && inner
                .users
                .iter()
                .any(|u| u.provider_uid == user.provider_uid)
        {
            return Err(StoreError::Conflict("users_provider_uid_key".to_string()));
        }
        inner.users.push(user.clone());
        Ok(())
    }

    async fn attach_provider_uid(&self, id: Uuid, uid: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            if user.provider_uid.is_none() {
                user.provider_uid = Some(uid.to_string());
            }
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        phone: Option<String>,
    ) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(phone) = phone {
            user.phone = Some(phone);
        }
        Ok(Some(user.clone()))
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.last_login_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn increment_token_version(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.token_version += 1;
        }
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .sessions
            .iter()
            .any(|s| s.refresh_token == session.refresh_token)
        {
            return Err(StoreError::Conflict(
                "user_sessions_refresh_token_key".to_string(),
            ));
        }
        inner.sessions.push(session.clone());
        Ok(())
    }

    async fn find_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .iter()
            .find(|s| s.refresh_token == refresh_token)
            .cloned())
    }

    async fn rotate_session(
        &self,
        old_refresh_token: &str,
        new_token: &str,
        new_refresh_token: &str,
    ) -> Result<Option<Session>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner
            .sessions
            .iter_mut()
            .find(|s| s.refresh_token == old_refresh_token && s.is_active)
        else {
            return Ok(None);
        };
        session.token = new_token.to_string();
        session.refresh_token = new_refresh_token.to_string();
        Ok(Some(session.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn sample_user(email: &str, uid: &str) -> User {
        User::new_local(
            email.to_string(),
            "Test".to_string(),
            "$argon2id$fake".to_string(),
            uid.to_string(),
            UserRole::Stakeholder,
        )
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_case_insensitively() {
        let store = MemoryStore::new();
        store.insert_user(&sample_user("a@x.com", "u1")).await.unwrap();

        let err = store
            .insert_user(&sample_user("A@X.COM", "u2"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(c) if c == "users_email_key"));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_provider_uid_conflicts() {
        let store = MemoryStore::new();
        store.insert_user(&sample_user("a@x.com", "u1")).await.unwrap();

        let err = store
            .insert_user(&sample_user("b@x.com", "u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(c) if c == "users_provider_uid_key"));
    }

    #[tokio::test]
    async fn rotation_is_single_use() {
        let store = MemoryStore::new();
        let session = Session::new(Uuid::new_v4(), "t0".into(), "r0".into(), None, None, 30);
        store.insert_session(&session).await.unwrap();

        let rotated = store.rotate_session("r0", "t1", "r1").await.unwrap();
        assert!(rotated.is_some());
        assert_eq!(rotated.unwrap().id, session.id);

        // The consumed value never works again.
        let again = store.rotate_session("r0", "t2", "r2").await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn token_version_increments() {
        let store = MemoryStore::new();
        let user = sample_user("a@x.com", "u1");
        store.insert_user(&user).await.unwrap();

        store.increment_token_version(user.id).await.unwrap();
        store.increment_token_version(user.id).await.unwrap();

        let live = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(live.token_version, 2);
    }
}
