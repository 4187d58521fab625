//! Key-value blob storage.
//!
//! Every persisted piece of state is a string value under a fixed key. The
//! `SqliteStore` keeps them in the `system_state` table; `MemoryStore` keeps them
//! in-process for tests and embedders that bring their own persistence.

use crate::{
    entities::{SystemState, system_state},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tracing::{debug, error, instrument, warn};

/// A string key to string blob mapping.
///
/// Writes complete before the returned future resolves; there is no write-behind.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, `None` if absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Key-value store backed by the `SQLite` `system_state` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: DatabaseConnection,
}

impl SqliteStore {
    /// Wraps an open connection. Tables must already exist.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl KeyValueStore for SqliteStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let state = SystemState::find()
            .filter(system_state::Column::Key.eq(key))
            .one(&self.db)
            .await?;
        debug!("System state for key '{}' present: {}", key, state.is_some());
        Ok(state.map(|s| s.value))
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().naive_utc();

        let existing = SystemState::find()
            .filter(system_state::Column::Key.eq(key))
            .one(&self.db)
            .await?;

        if let Some(state) = existing {
            let mut active_model: system_state::ActiveModel = state.into();
            active_model.value = Set(value.to_string());
            active_model.updated_at = Set(now);
            active_model.update(&self.db).await?;
        } else {
            let new_state = system_state::ActiveModel {
                key: Set(key.to_string()),
                value: Set(value.to_string()),
                updated_at: Set(now),
                ..Default::default()
            };
            new_state.insert(&self.db).await?;
        }

        debug!("Stored {} byte(s) under '{}'", value.len(), key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: &str) -> Result<()> {
        SystemState::delete_many()
            .filter(system_state::Column::Key.eq(key))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

/// In-process key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous read, for callbacks that cannot await.
    #[cfg(test)]
    pub(crate) fn peek(&self, key: &str) -> Option<String> {
        self.lock().ok()?.get(key).cloned()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values.lock().map_err(|_| Error::Storage {
            message: "memory store lock poisoned".to_string(),
        })
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Reads and decodes a JSON blob. A blob that fails to decode is logged and
/// treated as absent so a corrupt value never blocks startup.
pub async fn load_json<S, T>(store: &S, key: &str) -> Result<Option<T>>
where
    S: KeyValueStore,
    T: DeserializeOwned,
{
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            error!("Failed to decode stored value for '{}': {}", key, e);
            Ok(None)
        }
    }
}

/// Encodes `value` as JSON and writes it under `key`.
pub async fn save_json<S, T>(store: &S, key: &str, value: &T) -> Result<()>
where
    S: KeyValueStore,
    T: Serialize + Sync,
{
    let encoded = serde_json::to_string(value)?;
    store.set(key, &encoded).await
}

/// Best-effort persistence: failures are logged and swallowed, the caller's
/// in-memory state stays authoritative.
pub async fn persist_or_log<F>(key: &str, write: F)
where
    F: Future<Output = Result<()>>,
{
    if let Err(e) = write.await {
        warn!("Failed to persist '{}': {}", key, e);
    }
}

/// Reads a boolean stored as `"true"` / `"false"`. Absent or unparsable values
/// yield `default`.
pub async fn load_bool<S: KeyValueStore>(store: &S, key: &str, default: bool) -> Result<bool> {
    Ok(store
        .get(key)
        .await?
        .and_then(|raw| raw.parse::<bool>().ok())
        .unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_tracing, setup_test_db};
    use serde::Deserialize;

    #[tokio::test]
    async fn test_sqlite_set_and_get_new_key() -> Result<()> {
        init_test_tracing();
        let store = SqliteStore::new(setup_test_db().await?);

        store.set("test_key_1", "test_value_1").await?;
        let retrieved = store.get("test_key_1").await?;

        assert_eq!(retrieved, Some("test_value_1".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_set_updates_existing_key() -> Result<()> {
        init_test_tracing();
        let store = SqliteStore::new(setup_test_db().await?);

        store.set("test_key_update", "initial_value").await?;
        store.set("test_key_update", "updated_value").await?;

        assert_eq!(
            store.get("test_key_update").await?,
            Some("updated_value".to_string()),
            "Retrieved value should be the updated value."
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_get_and_remove_missing_key() -> Result<()> {
        init_test_tracing();
        let store = SqliteStore::new(setup_test_db().await?);

        assert!(store.get("this_key_does_not_exist").await?.is_none());
        store.remove("this_key_does_not_exist").await?;

        store.set("present", "1").await?;
        store.remove("present").await?;
        assert!(store.get("present").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() -> Result<()> {
        let store = MemoryStore::new();
        assert!(store.get("k").await?.is_none());
        store.set("k", "v").await?;
        assert_eq!(store.get("k").await?.as_deref(), Some("v"));
        store.remove("k").await?;
        assert!(store.get("k").await?.is_none());
        Ok(())
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_json_helpers() -> Result<()> {
        let store = MemoryStore::new();
        let sample = Sample {
            name: "病院".to_string(),
            count: 2,
        };
        save_json(&store, "sample", &sample).await?;
        let loaded: Option<Sample> = load_json(&store, "sample").await?;
        assert_eq!(loaded, Some(sample));
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_json_treated_as_absent() -> Result<()> {
        init_test_tracing();
        let store = MemoryStore::new();
        store.set("sample", "{not json").await?;
        let loaded: Option<Sample> = load_json(&store, "sample").await?;
        assert!(loaded.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_bool_defaults() -> Result<()> {
        let store = MemoryStore::new();
        assert!(load_bool(&store, "flag", true).await?);
        store.set("flag", "false").await?;
        assert!(!load_bool(&store, "flag", true).await?);
        store.set("flag", "garbage").await?;
        assert!(!load_bool(&store, "flag", false).await?);
        Ok(())
    }
}
