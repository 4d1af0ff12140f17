// # Memory Settings Store
//
// In-memory implementation of SettingsStore.
//
// ## Purpose
//
// Holds settings objects in a map keyed by id. Every clone of the store
// shares the same map, so one handle can mutate settings out-of-band while
// watchers poll through another.
//
// ## When to Use
//
// - Testing environments
// - Embedding, where the application pushes settings into the store itself
// - Prototyping before a persistent backend exists

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::traits::{SettingsStore, WatchableSettings};
use crate::Error;

/// In-memory settings store implementation
///
/// This implementation stores all settings in a HashMap protected by a RwLock.
/// It provides no persistence across restarts.
///
/// # Example
///
/// ```rust,no_run
/// use setwatch_core::store::MemorySettingsStore;
/// use setwatch_core::traits::{JsonSettings, SettingsStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySettingsStore::new();
///
///     store.upsert(JsonSettings::new("app").with("workers", 4)).await;
///
///     let settings = store.find("app").await?;
///     assert!(settings.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MemorySettingsStore<S> {
    inner: Arc<RwLock<HashMap<String, S>>>,
}

impl<S: WatchableSettings + Clone> MemorySettingsStore<S> {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a store pre-populated with settings objects
    ///
    /// Fails with [`Error::DuplicateId`] if two objects share an id.
    pub fn from_settings(settings: impl IntoIterator<Item = S>) -> Result<Self, Error> {
        let mut map = HashMap::new();
        for item in settings {
            let id = item.id().to_string();
            if map.contains_key(&id) {
                return Err(Error::duplicate_id(id));
            }
            map.insert(id, item);
        }

        Ok(Self {
            inner: Arc::new(RwLock::new(map)),
        })
    }

    /// Insert or replace a settings object, returning the previous one
    pub async fn upsert(&self, settings: S) -> Option<S> {
        let mut guard = self.inner.write().await;
        guard.insert(settings.id().to_string(), settings)
    }

    /// Remove a settings object
    pub async fn remove(&self, settings_id: &str) -> Option<S> {
        let mut guard = self.inner.write().await;
        guard.remove(settings_id)
    }

    /// Get the number of settings objects in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// List all ids in the store
    pub async fn ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    /// Clear all settings from the store
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        guard.clear();
    }
}

impl<S> Clone for MemorySettingsStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: WatchableSettings + Clone> Default for MemorySettingsStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: WatchableSettings + Clone> SettingsStore<S> for MemorySettingsStore<S> {
    async fn find(&self, settings_id: &str) -> Result<Option<S>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(settings_id).cloned())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::JsonSettings;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemorySettingsStore::new();

        // Initially empty
        assert!(store.is_empty().await);
        assert_eq!(store.find("app").await.unwrap(), None);

        // Upsert and find
        let settings = JsonSettings::new("app").with("workers", 4);
        assert!(store.upsert(settings.clone()).await.is_none());

        assert_eq!(store.len().await, 1);
        assert_eq!(store.find("app").await.unwrap(), Some(settings.clone()));

        // Replace returns the previous value
        let previous = store.upsert(JsonSettings::new("app").with("workers", 8)).await;
        assert_eq!(previous, Some(settings));

        // Remove
        assert!(store.remove("app").await.is_some());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_state() {
        let store = MemorySettingsStore::new();
        let writer = store.clone();

        writer.upsert(JsonSettings::new("shared")).await;

        assert!(store.find("shared").await.unwrap().is_some());
        assert_eq!(store.ids().await, vec!["shared".to_string()]);

        writer.clear().await;
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_memory_store_rejects_duplicate_ids() {
        let result = MemorySettingsStore::from_settings(vec![
            JsonSettings::new("app"),
            JsonSettings::new("app").with("workers", 2),
        ]);

        assert!(matches!(result, Err(Error::DuplicateId(id)) if id == "app"));
    }
}
