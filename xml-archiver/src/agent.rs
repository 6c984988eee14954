//! Wiring of the three long-running activities.
//!
//! ```text
//! XmlWriteWatcher ──touch──▶ SettleTracker ◀──tick── Ticker
//!                                 │
//!                           DeliveryQueue
//!                                 │
//!                        DeliveryConsumer ──commit──▶ Archiver ──▶ archive
//! ```
//!
//! The watcher task only touches the tracker, the ticker only ticks it, and
//! the consumer is the sole writer of the archive.

use crate::archive::{absolute_root, ArchiveError, Archiver};
use crate::config::AgentConfig;
use crate::delivery::{delivery_queue, DeliveryConsumer, DeliveryReceiver, DeliverySender};
use crate::settle::{SettleTracker, Ticker};
use crate::watch::XmlWriteWatcher;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A configured but not yet running agent.
pub struct Agent {
    config: AgentConfig,
    tracker: Arc<SettleTracker>,
    archiver: Arc<Archiver>,
    sender: DeliverySender,
    receiver: DeliveryReceiver,
}

impl Agent {
    /// Build the tracker, queue and archiver described by `config`.
    pub fn new(config: AgentConfig) -> Result<Self, ArchiveError> {
        let (sender, receiver) = delivery_queue();
        let tracker = Arc::new(SettleTracker::new(config.settle_ticks, sender.clone()));
        let archiver = Arc::new(
            Archiver::new(config.archive_path.clone())?
                .with_entry_root(absolute_root(&config.watch_dir)),
        );

        Ok(Self {
            config,
            tracker,
            archiver,
            sender,
            receiver,
        })
    }

    /// The settle tracker, for feeding events from sources other than the watcher.
    pub fn tracker(&self) -> Arc<SettleTracker> {
        Arc::clone(&self.tracker)
    }

    /// The archiver this agent commits through.
    pub fn archiver(&self) -> Arc<Archiver> {
        Arc::clone(&self.archiver)
    }

    /// Spawn the ticker and archive consumer, plus the watcher task if given.
    pub fn spawn(self, watcher: Option<XmlWriteWatcher>) -> RunningAgent {
        let mut tasks = Vec::with_capacity(3);

        if let Some(watcher) = watcher {
            tasks.push(tokio::spawn(watcher.run(Arc::clone(&self.tracker))));
        }

        let ticker = Ticker::new(self.config.tick_interval);
        tasks.push(tokio::spawn(ticker.run(Arc::clone(&self.tracker))));

        let consumer = DeliveryConsumer::new(
            Arc::clone(&self.archiver),
            self.receiver,
            self.sender,
            self.config.retry,
        );
        tasks.push(tokio::spawn(consumer.run()));

        tracing::info!(
            "Archiving settled XML writes under {} into {}",
            self.config.watch_dir.display(),
            self.config.archive_path.display()
        );

        RunningAgent {
            tracker: self.tracker,
            archiver: self.archiver,
            tasks,
        }
    }
}

/// Handle to a running agent.
pub struct RunningAgent {
    tracker: Arc<SettleTracker>,
    archiver: Arc<Archiver>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningAgent {
    /// The settle tracker the tasks share.
    pub fn tracker(&self) -> Arc<SettleTracker> {
        Arc::clone(&self.tracker)
    }

    /// The archiver the consumer commits through.
    pub fn archiver(&self) -> Arc<Archiver> {
        Arc::clone(&self.archiver)
    }

    /// Stop every task.
    ///
    /// A commit already running on the blocking pool is not interrupted;
    /// it completes before the runtime exits.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!("Agent task ended abnormally: {}", e);
                }
            }
        }
        let pending = self.tracker.len();
        if pending > 0 {
            tracing::warn!("Shutting down with {} unsettled file(s)", pending);
        }
    }
}
