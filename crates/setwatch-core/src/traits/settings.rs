// # Watchable Settings
//
// A settings object the watcher can track: something with a stable id and
// a notion of structural equality.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A settings object identified by an opaque id
///
/// `PartialEq` is the default deep-equality test used to decide whether a
/// freshly fetched snapshot differs from the cached one. Implement it
/// field-by-field (`#[derive(PartialEq)]` does exactly that).
pub trait WatchableSettings: PartialEq + Send + Sync + 'static {
    /// The id this object is stored under
    fn id(&self) -> &str;
}

/// Schemaless settings object: an id plus arbitrary JSON members
///
/// Serializes flat, e.g. `{ "id": "app", "log_level": "debug" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSettings {
    /// Settings id
    pub id: String,

    /// All remaining members
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl JsonSettings {
    /// Create an empty settings object
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: Map::new(),
        }
    }

    /// Set a member, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Get a member
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

impl WatchableSettings for JsonSettings {
    fn id(&self) -> &str {
        &self.id
    }
}
