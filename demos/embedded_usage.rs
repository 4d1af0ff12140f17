//! Minimal embedding example for setwatch-core
//!
//! An application keeps its feature flags in a shared store, watches them,
//! and reacts to every change. The watcher lifecycle is fully managed by the
//! application: start, health checks, restart and dispose.

use serde::Serialize;
use setwatch_core::traits::JsonComparer;
use setwatch_core::{
    Error, MemorySettingsStore, Result, SettingsStore, SettingsWatcher, WatchOptions,
    WatchableSettings, WatcherConfig,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Application-defined settings type
#[derive(Debug, Clone, PartialEq, Serialize)]
struct FeatureFlags {
    id: String,
    dark_mode: bool,
    max_upload_mb: u32,
    /// Bumped on every save, not a meaningful change on its own
    revision: u64,
}

impl FeatureFlags {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            dark_mode: false,
            max_upload_mb: 10,
            revision: 1,
        }
    }
}

impl WatchableSettings for FeatureFlags {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Store wrapper that fails every third lookup, like a flaky backend
struct FlakyStore {
    inner: MemorySettingsStore<FeatureFlags>,
    calls: AtomicUsize,
}

impl FlakyStore {
    fn new(inner: MemorySettingsStore<FeatureFlags>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl SettingsStore<FeatureFlags> for FlakyStore {
    async fn find(&self, settings_id: &str) -> Result<Option<FeatureFlags>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) % 3 == 2 {
            return Err(Error::store("backend briefly unavailable"));
        }
        self.inner.find(settings_id).await
    }

    fn store_name(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let backing = MemorySettingsStore::new();
    backing.upsert(FeatureFlags::new("web")).await;

    // Cancelling the application scope stops the watcher too
    let app_scope = CancellationToken::new();

    let options = WatchOptions::new()
        .with_config(WatcherConfig::new().with_poll_interval(Duration::from_millis(100)))
        .with_comparer(JsonComparer::new().ignoring("revision"))
        .with_cancellation(app_scope.child_token());

    let watcher = SettingsWatcher::with_options(
        Arc::new(FlakyStore::new(backing.clone())),
        "web",
        |flags: Arc<FeatureFlags>| {
            info!(
                dark_mode = flags.dark_mode,
                max_upload_mb = flags.max_upload_mb,
                "Feature flags changed"
            );
            Ok(())
        },
        options,
    )?;

    if !watcher.wait_for_startup(Duration::from_secs(2)).await? {
        warn!("Watcher did not start in time");
    }
    info!(flags = ?watcher.get_settings(), "Initial snapshot");

    // A revision-only save is ignored by the comparer
    let mut flags = FeatureFlags::new("web");
    flags.revision = 2;
    backing.upsert(flags.clone()).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    // A real change is published
    flags.dark_mode = true;
    flags.revision = 3;
    backing.upsert(flags).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    info!(flags = ?watcher.get_settings(), "Current snapshot");

    // Removing the settings keeps the last good snapshot
    backing.remove("web").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    info!(flags = ?watcher.get_settings(), "Snapshot after removal");

    // Restart replaces the polling task, whatever its state
    backing.upsert(FeatureFlags::new("web")).await;
    if watcher.restart(Duration::from_secs(2)).await? {
        info!(state = %watcher.state(), "Watcher restarted");
    }

    // Cancelling the scope faults the watcher; dispose still cleans up
    app_scope.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(faulted = watcher.is_faulted(), "Application scope cancelled");

    watcher.dispose().await;
    info!(state = %watcher.state(), "Watcher disposed");

    Ok(())
}
