//! The polling loop
//!
//! One [`PollLoop`] value drives exactly one run of a watcher. It is the only
//! writer of the cached snapshot and of the startup transition for its epoch.

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::state::{StateCell, WatcherState};
use super::ChangeCallback;
use crate::error::Result;
use crate::traits::{SettingsComparer, SettingsStore};

/// State shared between a watcher handle and its polling runs
pub(crate) struct Shared<S> {
    pub(crate) settings_id: String,
    pub(crate) snapshot: ArcSwapOption<S>,
    pub(crate) state: StateCell,
}

impl<S> Shared<S> {
    pub(crate) fn new(settings_id: String) -> Self {
        Self {
            settings_id,
            snapshot: ArcSwapOption::empty(),
            state: StateCell::new(),
        }
    }
}

/// Faults the watcher when a run ends while its epoch still owns the state
///
/// Runs on normal exit, on panic unwinding, and when the task is aborted.
/// Restart and dispose open a new epoch before cancelling, so runs they stop
/// leave the state alone.
struct FaultGuard<S> {
    shared: Arc<Shared<S>>,
    epoch: u64,
}

impl<S> Drop for FaultGuard<S> {
    fn drop(&mut self) {
        let faulted = self.shared.state.transition(
            self.epoch,
            &[WatcherState::Starting, WatcherState::Running],
            WatcherState::Faulted,
        );
        if faulted {
            warn!(
                settings_id = %self.shared.settings_id,
                epoch = self.epoch,
                "Polling task ended on its own, watcher is faulted"
            );
        }
    }
}

pub(crate) struct PollLoop<S> {
    pub(crate) shared: Arc<Shared<S>>,
    pub(crate) store: Arc<dyn SettingsStore<S>>,
    pub(crate) comparer: Arc<dyn SettingsComparer<S>>,
    pub(crate) on_change: ChangeCallback<S>,
    pub(crate) poll_interval: Duration,
    pub(crate) epoch: u64,
    pub(crate) token: CancellationToken,
}

impl<S: Send + Sync + 'static> PollLoop<S> {
    /// Poll until the run's token is cancelled
    pub(crate) async fn run(self) {
        let _guard = FaultGuard {
            shared: Arc::clone(&self.shared),
            epoch: self.epoch,
        };

        trace!(
            settings_id = %self.shared.settings_id,
            epoch = self.epoch,
            "Starting a polling task"
        );

        while !self.token.is_cancelled() {
            let lookup = tokio::select! {
                _ = self.token.cancelled() => break,
                result = self.store.find(&self.shared.settings_id) => result,
            };

            self.complete_cycle(lookup);

            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        trace!(
            settings_id = %self.shared.settings_id,
            epoch = self.epoch,
            "Ending a polling task"
        );
    }

    /// Compare, publish and record startup for one lookup result
    fn complete_cycle(&self, lookup: Result<Option<S>>) {
        let found = match lookup {
            Ok(found) => found,
            Err(e) => {
                error!(
                    settings_id = %self.shared.settings_id,
                    store = self.store.store_name(),
                    "Settings lookup failed: {}",
                    e
                );
                return;
            }
        };

        // Restart or dispose took over while the lookup was in flight
        if !self.owns_epoch() {
            return;
        }

        if let Some(candidate) = found {
            let changed = match self.shared.snapshot.load_full() {
                Some(current) => !self.comparer.equivalent(&current, &candidate),
                None => true,
            };

            if changed {
                trace!(settings_id = %self.shared.settings_id, "Settings updated");
                let snapshot = Arc::new(candidate);
                self.shared.snapshot.store(Some(Arc::clone(&snapshot)));
                self.notify(snapshot);
            }
        }

        if self.shared.snapshot.load().is_none() {
            warn!(settings_id = %self.shared.settings_id, "Settings not found");
        }

        if self
            .shared
            .state
            .transition(self.epoch, &[WatcherState::Starting], WatcherState::Running)
        {
            debug!(
                settings_id = %self.shared.settings_id,
                epoch = self.epoch,
                "Startup complete"
            );
        }
    }

    fn notify(&self, snapshot: Arc<S>) {
        match (self.on_change)(snapshot) {
            Ok(()) => trace!(settings_id = %self.shared.settings_id, "Settings watcher notified"),
            Err(e) => error!(
                settings_id = %self.shared.settings_id,
                "Settings change callback failed: {:#}",
                e
            ),
        }
    }

    fn owns_epoch(&self) -> bool {
        self.shared.state.load().0 == self.epoch
    }
}
