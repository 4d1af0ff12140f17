//! Settings watcher
//!
//! The SettingsWatcher is responsible for:
//! - Polling a SettingsStore for one settings id at a fixed interval
//! - Detecting structural changes against the cached snapshot
//! - Invoking the change callback for every detected change
//! - Exposing startup, fault and restart controls with bounded waits
//!
//! ## Architecture
//!
//! ```text
//!   callers                          polling task (one per run)
//! ┌──────────────────┐             ┌────────────────────────────┐
//! │ get_settings     │◄── cache ───│ find ─► compare ─► notify  │
//! │ wait_for_startup │◄── state ───│        sleep               │
//! │ restart/dispose  │── token ───►│                            │
//! └──────────────────┘             └────────────────────────────┘
//!                                               │
//!                                               ▼
//!                                     ┌──────────────────┐
//!                                     │  SettingsStore   │
//!                                     └──────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! new ─► Starting ─► Running ─┬─► Faulted ─┐
//!           ▲                 │            │
//!           └── Restarting ◄──┴────────────┘ (restart)
//!
//! any state ─► Disposed (dispose, terminal)
//! ```

mod poll;
mod state;

pub use state::WatcherState;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::error::{Error, Result};
use crate::traits::{SettingsComparer, SettingsStore, StructuralComparer, WatchableSettings};
use poll::{PollLoop, Shared};

/// Callback invoked with every changed snapshot
///
/// Runs on the polling task. An `Err` is logged and polling continues.
pub type ChangeCallback<S> = Arc<dyn Fn(Arc<S>) -> anyhow::Result<()> + Send + Sync>;

/// Optional construction parameters for a [`SettingsWatcher`]
pub struct WatchOptions<S> {
    /// Timing configuration
    pub config: WatcherConfig,

    /// Custom deep-equality test (defaults to [`StructuralComparer`])
    pub comparer: Option<Arc<dyn SettingsComparer<S>>>,

    /// Parent cancellation scope
    ///
    /// Every polling run uses a child of this token. Cancelling it stops the
    /// current run and leaves the watcher `Faulted`.
    pub cancellation: Option<CancellationToken>,
}

impl<S> WatchOptions<S> {
    pub fn new() -> Self {
        Self {
            config: WatcherConfig::default(),
            comparer: None,
            cancellation: None,
        }
    }

    pub fn with_config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_comparer(mut self, comparer: impl SettingsComparer<S> + 'static) -> Self {
        self.comparer = Some(Arc::new(comparer));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl<S> Default for WatchOptions<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// One polling run: its cancellation scope and task
struct LoopRun {
    epoch: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Live, self-refreshing view of one settings object
///
/// Construction spawns the polling task immediately; there is no separate
/// start call. All accessors only read shared state and never run the loop
/// body themselves.
///
/// ## Threading
///
/// The cached snapshot is an `ArcSwapOption` and the lifecycle state a
/// single atomic word, both written only by the polling task of the current
/// epoch. Readers never observe a torn update but may skip intermediate
/// values between polls.
///
/// ## Blocking variants
///
/// `wait_for_startup_blocking`, `restart_blocking` and `dispose_blocking`
/// sleep the calling thread. Call them from plain threads or
/// `spawn_blocking`, never from inside an async task.
pub struct SettingsWatcher<S: WatchableSettings> {
    shared: Arc<Shared<S>>,
    store: Arc<dyn SettingsStore<S>>,
    comparer: Arc<dyn SettingsComparer<S>>,
    on_change: ChangeCallback<S>,
    config: WatcherConfig,
    parent: CancellationToken,
    runtime: tokio::runtime::Handle,
    run: Mutex<Option<LoopRun>>,
}

impl<S: WatchableSettings> SettingsWatcher<S> {
    /// Start watching `settings_id` with default options
    ///
    /// # Errors
    ///
    /// - [`Error::NoRuntime`]: called outside a Tokio runtime
    pub fn new<F>(
        store: Arc<dyn SettingsStore<S>>,
        settings_id: impl Into<String>,
        on_change: F,
    ) -> Result<Self>
    where
        F: Fn(Arc<S>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::with_options(store, settings_id, on_change, WatchOptions::default())
    }

    /// Start watching the id of an existing settings object
    pub fn for_settings<F>(store: Arc<dyn SettingsStore<S>>, settings: &S, on_change: F) -> Result<Self>
    where
        F: Fn(Arc<S>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(store, settings.id().to_string(), on_change)
    }

    /// Start watching `settings_id`
    ///
    /// # Errors
    ///
    /// - [`Error::Config`]: invalid timing configuration
    /// - [`Error::NoRuntime`]: called outside a Tokio runtime
    pub fn with_options<F>(
        store: Arc<dyn SettingsStore<S>>,
        settings_id: impl Into<String>,
        on_change: F,
        options: WatchOptions<S>,
    ) -> Result<Self>
    where
        F: Fn(Arc<S>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        options.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let watcher = Self {
            shared: Arc::new(Shared::new(settings_id.into())),
            store,
            comparer: options
                .comparer
                .unwrap_or_else(|| Arc::new(StructuralComparer)),
            on_change: Arc::new(on_change),
            config: options.config,
            parent: options.cancellation.unwrap_or_else(CancellationToken::new),
            runtime,
            run: Mutex::new(None),
        };

        debug!(settings_id = %watcher.shared.settings_id, "Calling start on a polling task");
        {
            let mut slot = watcher.lock_run();
            watcher.launch(&mut slot, WatcherState::Starting)?;
        }
        debug!(settings_id = %watcher.shared.settings_id, "Finished calling start on a polling task");

        Ok(watcher)
    }

    /// Id of the watched settings object
    pub fn settings_id(&self) -> &str {
        &self.shared.settings_id
    }

    /// Timing configuration in effect
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Current cached snapshot, without waiting
    pub fn get_settings(&self) -> Option<Arc<S>> {
        self.shared.snapshot.load_full()
    }

    /// Wait until a snapshot is cached or `cancel` fires
    ///
    /// Returns whatever is cached at that point, which is still `None` when
    /// cancelled first or when the watcher is disposed.
    pub async fn get_settings_async(&self, cancel: CancellationToken) -> Option<Arc<S>> {
        loop {
            if let Some(settings) = self.get_settings() {
                return Some(settings);
            }
            if self.state() == WatcherState::Disposed {
                return None;
            }

            tokio::select! {
                _ = cancel.cancelled() => return self.get_settings(),
                _ = tokio::time::sleep(self.config.settings_poll_interval()) => {}
            }
        }
    }

    /// Deadline form of [`get_settings_async`](Self::get_settings_async)
    pub async fn get_settings_within(&self, timeout: Duration) -> Option<Arc<S>> {
        tokio::time::timeout(timeout, self.get_settings_async(CancellationToken::new()))
            .await
            .unwrap_or_else(|_| self.get_settings())
    }

    /// Wait until the first polling cycle has completed
    ///
    /// A zero `timeout` waits indefinitely. Returns `Ok(false)` on timeout,
    /// or as soon as the run has faulted since it can then never start up.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`]: the watcher has been disposed
    pub async fn wait_for_startup(&self, timeout: Duration) -> Result<bool> {
        let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);

        loop {
            if let Some(started) = self.startup_outcome()? {
                return Ok(started);
            }
            if deadline.is_some_and(|deadline| tokio::time::Instant::now() >= deadline) {
                return Ok(false);
            }
            tokio::time::sleep(self.config.startup_poll_interval()).await;
        }
    }

    /// Thread-blocking form of [`wait_for_startup`](Self::wait_for_startup)
    pub fn wait_for_startup_blocking(&self, timeout: Duration) -> Result<bool> {
        let deadline = (!timeout.is_zero()).then(|| std::time::Instant::now() + timeout);

        loop {
            if let Some(started) = self.startup_outcome()? {
                return Ok(started);
            }
            if deadline.is_some_and(|deadline| std::time::Instant::now() >= deadline) {
                return Ok(false);
            }
            std::thread::sleep(self.config.startup_poll_interval());
        }
    }

    /// Stop the current polling run and start a fresh one
    ///
    /// Safe on healthy and faulted watchers alike. The new run begins only
    /// after the old task has finished. Returns the outcome of
    /// [`wait_for_startup`](Self::wait_for_startup) for the new run.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`]: the watcher has been disposed
    pub async fn restart(&self, timeout: Duration) -> Result<bool> {
        self.relaunch()?;
        self.wait_for_startup(timeout).await
    }

    /// Thread-blocking form of [`restart`](Self::restart)
    pub fn restart_blocking(&self, timeout: Duration) -> Result<bool> {
        self.relaunch()?;
        self.wait_for_startup_blocking(timeout)
    }

    /// Lifecycle state at this instant
    pub fn state(&self) -> WatcherState {
        self.shared.state.state()
    }

    /// Startup completed and the polling task is alive
    pub fn is_running(&self) -> bool {
        self.state() == WatcherState::Running
    }

    /// Not running and not disposed
    pub fn is_faulted(&self) -> bool {
        !matches!(self.state(), WatcherState::Running | WatcherState::Disposed)
    }

    /// Stop polling for good and wait for the task to finish
    ///
    /// The wait is bounded by the configured dispose grace; a task still
    /// running after it is aborted. Calling this again is a no-op.
    pub async fn dispose(&self) {
        let Some(run) = self.begin_dispose() else {
            return;
        };

        let grace = self.config.dispose_grace();
        let mut handle = run.handle;
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => debug!(settings_id = %self.shared.settings_id, "Polling task stopped"),
            Ok(Err(e)) => self.log_join_error(run.epoch, &e),
            Err(_) => {
                warn!(
                    settings_id = %self.shared.settings_id,
                    "Polling task did not stop within {:?}, aborting",
                    grace
                );
                handle.abort();
            }
        }

        debug!(settings_id = %self.shared.settings_id, "Settings watcher disposed");
    }

    /// Thread-blocking form of [`dispose`](Self::dispose)
    pub fn dispose_blocking(&self) {
        let Some(run) = self.begin_dispose() else {
            return;
        };

        let deadline = std::time::Instant::now() + self.config.dispose_grace();
        while !run.handle.is_finished() {
            if std::time::Instant::now() >= deadline {
                warn!(
                    settings_id = %self.shared.settings_id,
                    "Polling task did not stop within {:?}, aborting",
                    self.config.dispose_grace()
                );
                run.handle.abort();
                break;
            }
            std::thread::sleep(self.config.startup_poll_interval());
        }

        debug!(settings_id = %self.shared.settings_id, "Settings watcher disposed");
    }

    /// `Some(true)` once running, `Some(false)` once faulted, `None` while pending
    fn startup_outcome(&self) -> Result<Option<bool>> {
        match self.state() {
            WatcherState::Running => Ok(Some(true)),
            WatcherState::Faulted => Ok(Some(false)),
            WatcherState::Disposed => Err(Error::Disposed),
            WatcherState::NotStarted | WatcherState::Starting | WatcherState::Restarting => {
                Ok(None)
            }
        }
    }

    fn relaunch(&self) -> Result<()> {
        let mut slot = self.lock_run();
        info!(settings_id = %self.shared.settings_id, "Restarting settings watcher");
        self.launch(&mut slot, WatcherState::Restarting)
    }

    /// Open a new epoch and spawn its polling task
    ///
    /// Must be called with the run slot locked. A previous run is cancelled
    /// and the new task awaits it before polling.
    fn launch(&self, slot: &mut Option<LoopRun>, initial: WatcherState) -> Result<()> {
        let epoch = self.shared.state.begin_epoch(initial).ok_or(Error::Disposed)?;

        let previous = slot.take();
        if let Some(previous) = &previous {
            previous.token.cancel();
        }

        let token = self.parent.child_token();
        let poll = PollLoop {
            shared: Arc::clone(&self.shared),
            store: Arc::clone(&self.store),
            comparer: Arc::clone(&self.comparer),
            on_change: Arc::clone(&self.on_change),
            poll_interval: self.config.poll_interval(),
            epoch,
            token: token.clone(),
        };

        let handle = self.runtime.spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.handle.await {
                    if e.is_panic() {
                        warn!(
                            settings_id = %poll.shared.settings_id,
                            epoch = previous.epoch,
                            "Previous polling task panicked: {}",
                            e
                        );
                    }
                }

                let started = poll.shared.state.transition(
                    epoch,
                    &[WatcherState::Restarting],
                    WatcherState::Starting,
                );
                if !started {
                    debug!(
                        settings_id = %poll.shared.settings_id,
                        epoch,
                        "Polling run superseded before it started"
                    );
                    return;
                }
            }

            poll.run().await;
        });

        *slot = Some(LoopRun {
            epoch,
            token,
            handle,
        });
        Ok(())
    }

    /// Mark disposed and cancel the current run
    ///
    /// Returns the run to wait on, or `None` if already disposed.
    fn begin_dispose(&self) -> Option<LoopRun> {
        let mut slot = self.lock_run();
        if !self.shared.state.dispose() {
            return None;
        }

        let run = slot.take()?;
        run.token.cancel();
        Some(run)
    }

    fn log_join_error(&self, epoch: u64, e: &tokio::task::JoinError) {
        if e.is_panic() {
            warn!(
                settings_id = %self.shared.settings_id,
                epoch,
                "Polling task panicked: {}",
                e
            );
        } else {
            debug!(settings_id = %self.shared.settings_id, epoch, "Polling task cancelled");
        }
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<LoopRun>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cancels the polling task without waiting for it
///
/// A cycle already past its lookup may still publish one snapshot after the
/// drop. Call [`SettingsWatcher::dispose`] first when no callback may follow.
impl<S: WatchableSettings> Drop for SettingsWatcher<S> {
    fn drop(&mut self) {
        if self.begin_dispose().is_some() {
            debug!(
                settings_id = %self.shared.settings_id,
                "Settings watcher dropped without dispose, polling task cancelled"
            );
        }
    }
}

impl<S: WatchableSettings> std::fmt::Debug for SettingsWatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsWatcher")
            .field("settings_id", &self.shared.settings_id)
            .field("state", &self.state())
            .field("store", &self.store.store_name())
            .finish()
    }
}
