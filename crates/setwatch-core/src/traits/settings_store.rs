// # Settings Store Trait
//
// Defines the lookup-by-id interface the watcher polls.
//
// ## Contract
//
// - `Ok(Some(settings))`: the id currently resolves
// - `Ok(None)`: the id does not resolve right now ("not found", not an error)
// - `Err(Error)`: the lookup itself failed (I/O, parse, duplicate ids, ...)
//
// The watcher treats `Err` as transient and retries on its next cycle.
//
// ## Implementations
//
// - In-memory: `MemorySettingsStore`
// - JSON file: `FileSettingsStore`
// - Future: database or remote configuration services
//
// ## Usage
//
// ```rust,ignore
// use setwatch_core::SettingsStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* SettingsStore implementation */;
//
//     match store.find("app").await? {
//         Some(settings) => println!("found {:?}", settings),
//         None => println!("not configured yet"),
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

/// Trait for settings store implementations
///
/// # Thread Safety
///
/// A single store may be shared by many watchers, each polling from its own
/// task. All methods must be safe to call concurrently.
///
/// # Trust Level
///
/// Stores only answer lookups. They must not:
/// - Spawn background tasks (polling is owned by `SettingsWatcher`)
/// - Cache results across calls in a way that hides out-of-band changes
/// - Decide when a change is significant (owned by the comparer)
#[async_trait]
pub trait SettingsStore<S>: Send + Sync {
    /// Look up the settings object with the given id
    ///
    /// # Parameters
    ///
    /// - `settings_id`: Opaque id of the settings object
    ///
    /// # Returns
    ///
    /// - `Ok(Some(S))`: The current snapshot
    /// - `Ok(None)`: No settings object with this id
    /// - `Err(Error)`: Lookup failure
    async fn find(&self, settings_id: &str) -> Result<Option<S>, crate::Error>;

    /// Short name used in diagnostics
    fn store_name(&self) -> &'static str {
        "custom"
    }
}
