// # Settings Store Implementations
//
// This module provides implementations of the SettingsStore trait for
// different backing strategies.

pub mod file;
pub mod memory;

pub use file::FileSettingsStore;
pub use memory::MemorySettingsStore;
