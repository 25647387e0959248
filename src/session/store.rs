//! Key/value session storage with per-entry expiry.
//!
//! The engine persists three kinds of entries:
//! - the whole session under [`keys::state`]
//! - each stage's output under [`keys::step`]
//! - the drawing input under [`keys::input`]
//!
//! Backends implement [`SessionStore`]; [`SessionCache`] layers the typed
//! accessors and TTL policy on top.

use super::{DrawingInput, Session};
use crate::errors::StoreError;
use crate::step::StepNumber;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Cache key format.
pub mod keys {
    use crate::step::StepNumber;

    pub fn state(session_id: &str) -> String {
        format!("pipeline_state:{}", session_id)
    }

    pub fn step(session_id: &str, step: StepNumber) -> String {
        format!("pipeline:{}:step_{}", session_id, step)
    }

    pub fn input(session_id: &str) -> String {
        format!("pipeline_input:{}", session_id)
    }
}

/// A key/value store with per-entry time-to-live. Last writer wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `value` under `key`, replacing any existing entry.
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError>;

    /// Fetch the value under `key`. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
}

struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// In-process store. Entries are dropped lazily on read or by `purge_expired`.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| StoreError::Backend(e.into()))?;
        let entry = Entry {
            value,
            expires_at: Utc::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().await.remove(key);
        Ok(None)
    }
}

/// Time-to-live per kind of entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub step: Duration,
    pub state: Duration,
    pub input: Duration,
}

impl CacheTtl {
    pub fn from_hours(step: u64, state: u64, input: u64) -> Self {
        const HOUR: u64 = 3600;
        Self {
            step: Duration::from_secs(step * HOUR),
            state: Duration::from_secs(state * HOUR),
            input: Duration::from_secs(input * HOUR),
        }
    }
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self::from_hours(24, 48, 48)
    }
}

/// Typed access to sessions, stage outputs, and inputs over a [`SessionStore`].
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn SessionStore>,
    ttl: CacheTtl,
}

impl SessionCache {
    pub fn new(store: Arc<dyn SessionStore>, ttl: CacheTtl) -> Self {
        Self { store, ttl }
    }

    /// A cache over a fresh in-memory store with default TTLs.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStore::new()), CacheTtl::default())
    }

    pub fn ttl(&self) -> CacheTtl {
        self.ttl
    }

    /// Persist the whole session, stamping `saved_at`.
    pub async fn save_session(&self, session: &mut Session) -> Result<(), StoreError> {
        session.saved_at = Some(Utc::now());
        let key = keys::state(&session.id);
        let value = serde_json::to_value(&*session).map_err(|source| StoreError::Serialize {
            key: key.clone(),
            source,
        })?;
        self.store.put(&key, value, self.ttl.state).await
    }

    pub async fn load_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let key = keys::state(session_id);
        match self.store.get(&key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Corrupt { key, source }),
            None => Ok(None),
        }
    }

    /// Cache one stage's output.
    pub async fn cache_step(&self, session_id: &str, step: StepNumber, data: &Value) -> Result<(), StoreError> {
        self.store
            .put(&keys::step(session_id, step), data.clone(), self.ttl.step)
            .await
    }

    /// A previously cached stage output.
    pub async fn cached_step(&self, session_id: &str, step: StepNumber) -> Result<Option<Value>, StoreError> {
        self.store.get(&keys::step(session_id, step)).await
    }

    pub async fn cache_input(&self, session_id: &str, input: &DrawingInput) -> Result<(), StoreError> {
        let key = keys::input(session_id);
        let value = serde_json::to_value(input).map_err(|source| StoreError::Serialize {
            key: key.clone(),
            source,
        })?;
        self.store.put(&key, value, self.ttl.input).await
    }

    /// The cached drawing input. A corrupt entry is logged and treated as absent.
    pub async fn cached_input(&self, session_id: &str) -> Result<Option<DrawingInput>, StoreError> {
        let key = keys::input(session_id);
        let Some(value) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(input) => Ok(Some(input)),
            Err(e) => {
                tracing::warn!(%key, error = %e, "Ignoring corrupt drawing input entry");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InterventionMode;
    use serde_json::json;

    fn step(n: u8) -> StepNumber {
        StepNumber::new(n).unwrap()
    }

    #[test]
    fn test_key_format() {
        assert_eq!(keys::state("abc"), "pipeline_state:abc");
        assert_eq!(keys::step("abc", step(7)), "pipeline:abc:step_7");
        assert_eq!(keys::input("abc"), "pipeline_input:abc");
    }

    #[test]
    fn test_default_ttls() {
        let ttl = CacheTtl::default();
        assert_eq!(ttl.step, Duration::from_secs(24 * 3600));
        assert_eq!(ttl.state, Duration::from_secs(48 * 3600));
        assert_eq!(ttl.input, Duration::from_secs(48 * 3600));
    }

    #[tokio::test]
    async fn test_memory_store_last_writer_wins() {
        let store = MemorySessionStore::new();
        store.put("k", json!(1), Duration::from_secs(60)).await.unwrap();
        store.put("k", json!(2), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_expired_entries_read_as_absent() {
        let store = MemorySessionStore::new();
        store.put("gone", json!("x"), Duration::ZERO).await.unwrap();
        store.put("kept", json!("y"), Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("gone").await.unwrap(), None);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.purge_expired().await, 0);
        assert_eq!(store.get("kept").await.unwrap(), Some(json!("y")));
    }

    #[tokio::test]
    async fn test_memory_store_purge_expired() {
        let store = MemorySessionStore::new();
        store.put("a", json!(1), Duration::ZERO).await.unwrap();
        store.put("b", json!(2), Duration::ZERO).await.unwrap();
        store.put("c", json!(3), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.purge_expired().await, 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_session_cache_roundtrip_stamps_saved_at() {
        let cache = SessionCache::in_memory();
        let mut session = Session::new("pipeline_1", InterventionMode::AllSteps, vec![], "single_image", true);
        assert!(session.saved_at.is_none());

        cache.save_session(&mut session).await.unwrap();
        assert!(session.saved_at.is_some());

        let loaded = cache.load_session("pipeline_1").await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(cache.load_session("pipeline_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_cache_corrupt_session_is_error() {
        let store = Arc::new(MemorySessionStore::new());
        store
            .put(&keys::state("bad"), json!({"id": 5}), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = SessionCache::new(store, CacheTtl::default());
        let err = cache.load_session("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "pipeline_state:bad"));
    }

    #[tokio::test]
    async fn test_session_cache_steps_and_input() {
        let cache = SessionCache::in_memory();
        cache.cache_step("s", step(3), &json!({"notes": []})).await.unwrap();
        assert_eq!(cache.cached_step("s", step(3)).await.unwrap(), Some(json!({"notes": []})));
        assert_eq!(cache.cached_step("s", step(4)).await.unwrap(), None);

        let input = DrawingInput::Multi(vec!["a.png".into(), "b.png".into()]);
        cache.cache_input("s", &input).await.unwrap();
        assert_eq!(cache.cached_input("s").await.unwrap(), Some(input));
    }

    #[tokio::test]
    async fn test_session_cache_corrupt_input_reads_as_absent() {
        let store = Arc::new(MemorySessionStore::new());
        store
            .put(&keys::input("s"), json!({"not": "an input"}), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = SessionCache::new(store, CacheTtl::default());
        assert_eq!(cache.cached_input("s").await.unwrap(), None);
    }
}
