//! Per-path settle detection.
//!
//! `SettleTracker` converts a burst of write events for the same file into a
//! single settle signal. Every write resets the path's countdown; every tick
//! decrements it; once a countdown reaches zero the path is handed to the
//! delivery queue and forgotten.

use crate::delivery::DeliverySender;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of quiet ticks a file must see before it is considered settled.
pub const DEFAULT_SETTLE_TICKS: u32 = 5;

/// Tracks pending files and emits each one once it has gone quiet.
///
/// The countdown map is guarded by a single mutex. Both `touch` and the
/// `tick` sweep hold it for their full critical section, so no caller ever
/// observes a half-updated entry.
#[derive(Debug)]
pub struct SettleTracker {
    /// Remaining ticks per pending path, always in `1..=settle_ticks`.
    countdowns: Mutex<HashMap<PathBuf, u32>>,
    /// Countdown value a path is reset to on every write.
    settle_ticks: u32,
    /// Where settled paths go.
    emitter: DeliverySender,
}

impl SettleTracker {
    /// Creates a tracker that emits into `emitter` after `settle_ticks` quiet ticks.
    ///
    /// A `settle_ticks` of zero is treated as one, since a path can only be
    /// emitted by a tick.
    pub fn new(settle_ticks: u32, emitter: DeliverySender) -> Self {
        Self {
            countdowns: Mutex::new(HashMap::new()),
            settle_ticks: settle_ticks.max(1),
            emitter,
        }
    }

    /// Records a write to `path`, (re)starting its countdown.
    pub fn touch(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut countdowns = self.lock();
        if countdowns.insert(path.clone(), self.settle_ticks).is_none() {
            tracing::debug!("Tracking {}", path.display());
        }
    }

    /// Advances every countdown by one tick.
    ///
    /// Paths whose countdown reaches zero are enqueued for archiving and
    /// removed from tracking. Returns the paths emitted by this tick.
    pub fn tick(&self) -> Vec<PathBuf> {
        let mut countdowns = self.lock();
        let mut settled = Vec::new();

        countdowns.retain(|path, remaining| {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                settled.push(path.clone());
                false
            } else {
                true
            }
        });

        for path in &settled {
            tracing::info!("Settled: {}", path.display());
            if let Err(e) = self.emitter.enqueue(path.clone()) {
                tracing::warn!("Dropping settled file {}: {}", path.display(), e);
            }
        }

        settled
    }

    /// Remaining ticks for `path`, or `None` if it is not pending.
    pub fn countdown(&self, path: &Path) -> Option<u32> {
        self.lock().get(path).copied()
    }

    /// Snapshot of every pending path.
    pub fn pending(&self) -> Vec<PathBuf> {
        self.lock().keys().cloned().collect()
    }

    /// Number of pending paths.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The configured countdown length.
    pub fn settle_ticks(&self) -> u32 {
        self.settle_ticks
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, u32>> {
        // The map holds plain integers; a panic mid-update cannot leave it torn.
        self.countdowns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
