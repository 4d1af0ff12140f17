// # setwatch-core
//
// Core library for live, self-refreshing views of settings objects.
//
// ## Architecture Overview
//
// - **SettingsStore**: Trait for looking up a settings object by id
// - **SettingsComparer**: Trait for deep equality between two snapshots
// - **SettingsWatcher**: Polling state machine that caches the latest
//   snapshot and reports changes through a callback
// - **MemorySettingsStore** / **FileSettingsStore**: Bundled stores
//
// ## Design Principles
//
// 1. **Polling Only**: Stores make no push guarantees, so the watcher polls
//    at a fixed interval
// 2. **Whole-Object Replace**: A changed snapshot replaces the cached one;
//    fields are never merged
// 3. **Resilient Loop**: Lookup and callback failures are logged, never fatal
// 4. **Explicit Lifecycle**: Startup, fault, restart and dispose are
//    observable states, not inferred flags
// 5. **Library-First**: Binaries only wire stores and watchers together

pub mod traits;
pub mod watcher;
pub mod store;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{JsonSettings, SettingsComparer, SettingsStore, WatchableSettings};
pub use watcher::{ChangeCallback, SettingsWatcher, WatchOptions, WatcherState};
pub use config::WatcherConfig;
pub use error::{Error, Result};
pub use store::{FileSettingsStore, MemorySettingsStore};
