use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use libsql::{Builder, Connection, Database, params};
use serde_json::Value;

use super::store::SessionStore;
use crate::errors::StoreError;

/// Session store backed by a local SQLite database through libsql.
///
/// Entries live in one `session_cache` table keyed by cache key, with the
/// expiry stored as epoch milliseconds. Sessions survive process restarts, so a
/// paused run can be resumed from a later CLI invocation.
pub struct SqliteSessionStore {
    _db: Database,
    conn: Connection,
}

impl SqliteSessionStore {
    /// Open (or create) a database at the given path and run migrations.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("Failed to open session database {}", path.display()))?;
        Self::init(db).await
    }

    /// Create an in-memory database (for testing).
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .context("Failed to open in-memory session database")?;
        Self::init(db).await
    }

    async fn init(db: Database) -> anyhow::Result<Self> {
        let conn = db.connect().context("Failed to connect to session database")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .context("Failed to run migrations")?;
        Ok(Self { _db: db, conn })
    }

    /// Delete expired rows, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now().timestamp_millis();
        let removed = self
            .conn
            .execute("DELETE FROM session_cache WHERE expires_at <= ?1", params![now])
            .await
            .map_err(backend)?;
        if removed > 0 {
            tracing::debug!(removed, "Purged expired session cache rows");
        }
        Ok(removed)
    }
}

fn backend(err: libsql::Error) -> StoreError {
    StoreError::Backend(err.into())
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        let text = serde_json::to_string(&value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        self.conn
            .execute(
                "INSERT INTO session_cache (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                params![key.to_string(), text, expires_at],
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = Utc::now().timestamp_millis();
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM session_cache WHERE key = ?1 AND expires_at > ?2",
                params![key.to_string(), now],
            )
            .await
            .map_err(backend)?;
        let Some(row) = rows.next().await.map_err(backend)? else {
            return Ok(None);
        };
        let text: String = row.get(0).map_err(backend)?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
    }
}
