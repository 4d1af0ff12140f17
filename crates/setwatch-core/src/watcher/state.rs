//! Lifecycle state of a settings watcher
//!
//! The state lives in a single atomic word together with the epoch of the
//! polling run that owns it. Every restart and the final dispose open a new
//! epoch, so a run that has been superseded can no longer move the state:
//! its transitions are compare-and-swap operations that require its own
//! epoch.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const STATE_BITS: u32 = 8;
const STATE_MASK: u64 = (1 << STATE_BITS) - 1;

/// Lifecycle status of a [`SettingsWatcher`](crate::SettingsWatcher)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WatcherState {
    /// Constructed, polling task not yet launched
    NotStarted = 0,
    /// Polling task launched, first cycle not yet completed
    Starting = 1,
    /// At least one cycle completed and the polling task is alive
    Running = 2,
    /// The polling task ended without being stopped by restart or dispose
    Faulted = 3,
    /// Old polling task cancelled, new one being launched
    Restarting = 4,
    /// Terminal
    Disposed = 5,
}

impl WatcherState {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => Self::NotStarted,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Faulted,
            4 => Self::Restarting,
            _ => Self::Disposed,
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        self == Self::Disposed
    }
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Faulted => "faulted",
            Self::Restarting => "restarting",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

fn pack(epoch: u64, state: WatcherState) -> u64 {
    (epoch << STATE_BITS) | state as u64
}

fn unpack(word: u64) -> (u64, WatcherState) {
    (word >> STATE_BITS, WatcherState::from_bits(word & STATE_MASK))
}

/// Epoch-tagged lifecycle state
#[derive(Debug)]
pub(crate) struct StateCell {
    word: AtomicU64,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            word: AtomicU64::new(pack(0, WatcherState::NotStarted)),
        }
    }

    pub(crate) fn load(&self) -> (u64, WatcherState) {
        unpack(self.word.load(Ordering::Acquire))
    }

    pub(crate) fn state(&self) -> WatcherState {
        self.load().1
    }

    /// Move run `epoch` from any state in `from` to `to`
    ///
    /// Returns `false` when the cell belongs to another epoch or is in a
    /// state not listed in `from`.
    pub(crate) fn transition(&self, epoch: u64, from: &[WatcherState], to: WatcherState) -> bool {
        self.word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (current_epoch, state) = unpack(word);
                (current_epoch == epoch && from.contains(&state)).then(|| pack(epoch, to))
            })
            .is_ok()
    }

    /// Open a new epoch in state `to`
    ///
    /// Returns the new epoch, or `None` once the cell is disposed.
    pub(crate) fn begin_epoch(&self, to: WatcherState) -> Option<u64> {
        self.word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (epoch, state) = unpack(word);
                (!state.is_terminal()).then(|| pack(epoch + 1, to))
            })
            .ok()
            .map(|previous| unpack(previous).0 + 1)
    }

    /// Move to `Disposed` under a fresh epoch
    ///
    /// Returns `false` if the cell was already disposed.
    pub(crate) fn dispose(&self) -> bool {
        self.begin_epoch(WatcherState::Disposed).is_some()
    }
}
