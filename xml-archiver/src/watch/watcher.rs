//! Filesystem watcher that feeds XML write events into the settle tracker.
//!
//! Raw notify events arrive on a callback thread and are bridged into a
//! tokio channel. The consuming task keeps only write-type events on paths
//! ending in `.xml` (any case) and touches the tracker for each of them.

use crate::settle::SettleTracker;
use notify::{
    event::{AccessKind, AccessMode, ModifyKind},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Suffix, compared case-insensitively, of files that get archived.
pub const XML_EXTENSION: &str = "xml";

/// Errors that can occur in the file watcher system.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    WatcherCreation(#[from] notify::Error),

    #[error("Failed to watch path {}: {source}", .path.display())]
    WatchPath {
        path: PathBuf,
        source: notify::Error,
    },
}

/// Whether `kind` means file content was written.
pub fn is_write_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

/// Whether `path` ends in `.xml`, ignoring case.
pub fn is_xml_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(XML_EXTENSION))
}

/// Paths in `event` that should restart a settle countdown.
pub fn xml_writes(event: &Event) -> impl Iterator<Item = &PathBuf> {
    let relevant = is_write_event(&event.kind);
    event
        .paths
        .iter()
        .filter(move |path| relevant && is_xml_path(path))
}

/// Watches a directory tree and touches the tracker on every XML write.
pub struct XmlWriteWatcher {
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<Result<Event, notify::Error>>,
}

impl XmlWriteWatcher {
    /// Creates a watcher backed by the platform's native notification API.
    pub fn new() -> Result<Self, WatcherError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let config = Config::default()
            .with_poll_interval(Duration::from_millis(100))
            .with_compare_contents(false);

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let _ = tx.send(res);
            },
            config,
        )?;

        Ok(Self {
            watcher,
            event_rx: rx,
        })
    }

    /// Start watching a path recursively.
    pub fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchPath {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Consume events until the watcher shuts down.
    ///
    /// Never blocks on the delivery queue or the archiver: all it does per
    /// event is a `touch`.
    pub async fn run(mut self, tracker: Arc<SettleTracker>) {
        while let Some(result) = self.event_rx.recv().await {
            match result {
                Ok(event) => {
                    forward_event(&event, &tracker);
                }
                Err(e) => tracing::warn!("Watcher error: {}", e),
            }
        }
        tracing::debug!("Watcher event stream ended");
    }
}

/// Touch the tracker for every XML write in `event`. Returns how many paths were touched.
pub fn forward_event(event: &Event, tracker: &SettleTracker) -> usize {
    let mut touched = 0;
    for path in xml_writes(event) {
        tracing::debug!("Write event: {}", path.display());
        tracker.touch(path.clone());
        touched += 1;
    }
    touched
}
