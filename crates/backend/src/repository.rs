//! User persistence.
//!
//! [`UserStore`] is the seam the auth flow talks to. [`PgUserStore`] backs it
//! with Postgres through the connection pool; [`InMemoryUserStore`] keeps
//! users in a map for tests and database-less local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use shared_types::User;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{self, DbPool};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another user already owns this email
    #[error("user with email {0} already exists")]
    Conflict(String),

    #[error("database connection unavailable")]
    ConnectionPool(#[from] diesel_async::pooled_connection::deadpool::PoolError),

    #[error("database error: {0}")]
    Database(#[source] DieselError),
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lookup and creation of users keyed by id and by unique email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Create an active user. Fails with [`StoreError::Conflict`] when the
    /// email is taken.
    async fn create(&self, email: &str, full_name: Option<&str>) -> StoreResult<User>;

    /// Return the user for `email`, creating it first if absent. Never
    /// creates a second row for the same email.
    async fn find_or_create_by_email(
        &self,
        email: &str,
        full_name: Option<&str>,
    ) -> StoreResult<User>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.pool.get().await?;
        Ok(db::users::get_by_email(&mut conn, email).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let mut conn = self.pool.get().await?;
        Ok(db::users::get_by_id(&mut conn, id).await?)
    }

    async fn create(&self, email: &str, full_name: Option<&str>) -> StoreResult<User> {
        let mut conn = self.pool.get().await?;
        db::users::create(&mut conn, email, full_name)
            .await
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    StoreError::Conflict(email.to_string())
                }
                other => StoreError::Database(other),
            })
    }

    async fn find_or_create_by_email(
        &self,
        email: &str,
        full_name: Option<&str>,
    ) -> StoreResult<User> {
        let mut conn = self.pool.get().await?;
        Ok(db::users::upsert_by_email(&mut conn, email, full_name).await?)
    }
}

/// Map-backed store. Holds the write lock across find-or-create.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Drop a user, as an operator would outside this service.
    pub async fn remove(&self, id: Uuid) -> Option<User> {
        self.users.write().await.remove(&id)
    }

    fn new_user(email: &str, full_name: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: full_name.map(str::to_string),
            is_active: true,
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let guard = self.users.read().await;
        Ok(guard.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, email: &str, full_name: Option<&str>) -> StoreResult<User> {
        let mut guard = self.users.write().await;
        if guard.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict(email.to_string()));
        }
        let user = Self::new_user(email, full_name);
        guard.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_or_create_by_email(
        &self,
        email: &str,
        full_name: Option<&str>,
    ) -> StoreResult<User> {
        let mut guard = self.users.write().await;
        if let Some(existing) = guard.values().find(|u| u.email == email) {
            return Ok(existing.clone());
        }
        let user = Self::new_user(email, full_name);
        guard.insert(user.id, user.clone());
        Ok(user)
    }
}
