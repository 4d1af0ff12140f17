//! Core traits for the settings watcher
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`SettingsStore`]: Look up a settings object by id
//! - [`WatchableSettings`]: A settings object with a stable id
//! - [`SettingsComparer`]: Deep equality between two snapshots

pub mod comparer;
pub mod settings;
pub mod settings_store;

pub use comparer::{JsonComparer, SettingsComparer, StructuralComparer};
pub use settings::{JsonSettings, WatchableSettings};
pub use settings_store::SettingsStore;
