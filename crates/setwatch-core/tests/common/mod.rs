//! Test doubles and common utilities for watcher contract tests
//!
//! This module provides minimal stores and callbacks that let tests steer
//! what the watcher sees on each poll and observe what it publishes.

#![allow(dead_code)]

use serde::Serialize;
use setwatch_core::error::{Error, Result};
use setwatch_core::traits::{SettingsStore, WatchableSettings};
use setwatch_core::{SettingsWatcher, WatchOptions, WatcherConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Settings type used across contract tests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppSettings {
    pub id: String,
    pub max_connections: u32,
    pub revision: String,
}

impl AppSettings {
    pub fn new(id: &str, max_connections: u32) -> Self {
        Self {
            id: id.to_string(),
            max_connections,
            revision: "r1".to_string(),
        }
    }

    pub fn with_revision(mut self, revision: &str) -> Self {
        self.revision = revision.to_string();
        self
    }
}

impl WatchableSettings for AppSettings {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A store whose answer the test controls between polls
#[derive(Clone)]
pub struct ControlledStore {
    current: Arc<Mutex<Option<AppSettings>>>,
    failing: Arc<AtomicBool>,
    find_call_count: Arc<AtomicUsize>,
}

impl ControlledStore {
    pub fn new(initial: Option<AppSettings>) -> Self {
        Self {
            current: Arc::new(Mutex::new(initial)),
            failing: Arc::new(AtomicBool::new(false)),
            find_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace what subsequent lookups return
    pub fn set(&self, settings: Option<AppSettings>) {
        *self.current.lock().unwrap() = settings;
    }

    /// Make subsequent lookups fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Get the number of times find() was called
    pub fn find_call_count(&self) -> usize {
        self.find_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SettingsStore<AppSettings> for ControlledStore {
    async fn find(&self, settings_id: &str) -> Result<Option<AppSettings>> {
        self.find_call_count.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::store("simulated backend outage"));
        }

        Ok(self
            .current
            .lock()
            .unwrap()
            .clone()
            .filter(|settings| settings.id == settings_id))
    }

    fn store_name(&self) -> &'static str {
        "controlled"
    }
}

/// A store whose lookups never complete
pub struct HangingStore;

#[async_trait::async_trait]
impl SettingsStore<AppSettings> for HangingStore {
    async fn find(&self, _settings_id: &str) -> Result<Option<AppSettings>> {
        std::future::pending().await
    }
}

/// Records every snapshot passed to the change callback
#[derive(Clone, Default)]
pub struct ChangeRecorder {
    seen: Arc<Mutex<Vec<Arc<AppSettings>>>>,
}

impl ChangeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that records into this recorder
    pub fn callback(&self) -> impl Fn(Arc<AppSettings>) -> anyhow::Result<()> + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move |settings| {
            seen.lock().unwrap().push(settings);
            Ok(())
        }
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Arc<AppSettings>> {
        self.seen.lock().unwrap().last().cloned()
    }
}

/// Timings short enough for tests to observe many cycles quickly
pub fn fast_config() -> WatcherConfig {
    WatcherConfig::new()
        .with_poll_interval(Duration::from_millis(20))
        .with_settings_poll_interval(Duration::from_millis(5))
        .with_startup_poll_interval(Duration::from_millis(2))
        .with_dispose_grace(Duration::from_secs(2))
}

pub fn fast_options() -> WatchOptions<AppSettings> {
    WatchOptions::new().with_config(fast_config())
}

/// Start a watcher on `store` with fast timings
pub fn spawn_watcher<St>(store: St, settings_id: &str, recorder: &ChangeRecorder) -> SettingsWatcher<AppSettings>
where
    St: SettingsStore<AppSettings> + 'static,
{
    SettingsWatcher::with_options(Arc::new(store), settings_id, recorder.callback(), fast_options())
        .expect("watcher construction succeeds")
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Sleep long enough for several poll cycles to run
pub async fn let_cycles_run(cycles: u32) {
    tokio::time::sleep(fast_config().poll_interval() * cycles).await;
}
