//! Authoritative session store, consulted only on trust-cache misses.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// The backing store could not be reached or answered out of protocol.
    /// Callers treat this as a session failure, never as success.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Narrow seam over the session backend. The decision engine only ever asks
/// "does this session still exist" and "record that it was just used".
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn validate(&self, session_id: Uuid) -> Result<bool, SessionStoreError>;
    async fn touch(&self, session_id: Uuid) -> Result<(), SessionStoreError>;
}

/// Postgres-backed store over the `sessions` table.
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn validate(&self, session_id: Uuid) -> Result<bool, SessionStoreError> {
        let active: Option<bool> =
            sqlx::query_scalar("SELECT expires_at > now() FROM sessions WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|err| SessionStoreError::Unavailable(err.to_string()))?;
        Ok(active.unwrap_or(false))
    }

    async fn touch(&self, session_id: Uuid) -> Result<(), SessionStoreError> {
        sqlx::query("UPDATE sessions SET last_seen_at = now() WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|err| SessionStoreError::Unavailable(err.to_string()))?;
        Ok(())
    }
}

/// In-memory store for tests and single-node development.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session_id: Uuid, expires_at: DateTime<Utc>) {
        self.sessions.write().await.insert(session_id, expires_at);
    }

    pub async fn remove(&self, session_id: Uuid) {
        self.sessions.write().await.remove(&session_id);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn validate(&self, session_id: Uuid) -> Result<bool, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&session_id)
            .is_some_and(|expires_at| *expires_at > Utc::now()))
    }

    async fn touch(&self, _session_id: Uuid) -> Result<(), SessionStoreError> {
        Ok(())
    }
}
