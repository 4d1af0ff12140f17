// # Settings Comparer
//
// Decides whether a freshly fetched snapshot is a change worth publishing.
//
// ## Implementations
//
// - `StructuralComparer`: `PartialEq` (default)
// - `JsonComparer`: JSON deep equality with members ignored by name

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Deep-equality test between the cached snapshot and a candidate
pub trait SettingsComparer<S>: Send + Sync {
    /// Returns `true` when `candidate` carries no change relative to `current`
    fn equivalent(&self, current: &S, candidate: &S) -> bool;
}

/// Field-by-field comparison through `PartialEq`
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralComparer;

impl<S: PartialEq> SettingsComparer<S> for StructuralComparer {
    fn equivalent(&self, current: &S, candidate: &S) -> bool {
        current == candidate
    }
}

/// Compares the JSON form of two snapshots
///
/// Members listed in `ignored` are stripped at every nesting level before
/// comparing, so volatile fields such as timestamps do not count as
/// changes. A snapshot that fails to serialize is treated as changed.
#[derive(Debug, Clone, Default)]
pub struct JsonComparer {
    ignored: HashSet<String>,
}

impl JsonComparer {
    /// Create a comparer that ignores nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore a member name wherever it appears
    pub fn ignoring(mut self, member: impl Into<String>) -> Self {
        self.ignored.insert(member.into());
        self
    }

    fn normalize(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| !self.ignored.contains(key))
                    .map(|(key, value)| (key, self.normalize(value)))
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.normalize(item)).collect())
            }
            other => other,
        }
    }
}

impl<S: Serialize> SettingsComparer<S> for JsonComparer {
    fn equivalent(&self, current: &S, candidate: &S) -> bool {
        match (serde_json::to_value(current), serde_json::to_value(candidate)) {
            (Ok(current), Ok(candidate)) => self.normalize(current) == self.normalize(candidate),
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!("Snapshot serialization failed, treating as changed: {}", e);
                false
            }
        }
    }
}
