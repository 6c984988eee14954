//! The single archive consumer.
//!
//! Pops one settled path at a time and hands it to a [`Committer`]. A failed
//! commit puts the same path back on the queue and pauses for the retry delay
//! before the next pop, so commits are strictly serialized.

use super::queue::{DeliveryReceiver, DeliverySender};
use crate::archive::ArchiveError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default pause after a failed commit.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Something that can fold one file into the archive.
///
/// Implemented by [`crate::archive::Archiver`]; tests substitute their own.
pub trait Committer: Send + Sync + 'static {
    /// Incorporate `path` into the archive.
    fn commit(&self, path: &Path) -> Result<(), ArchiveError>;
}

/// How failed commits are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed pause after each failure.
    pub delay: Duration,
    /// Consecutive failures after which a path is dropped. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever with a fixed delay.
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up on a path after `max_attempts` consecutive failures.
    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(DEFAULT_RETRY_DELAY)
    }
}

/// Result of processing one queued path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The path is in the archive.
    Committed,
    /// The commit failed and the path was queued again.
    Requeued { attempts: u32 },
    /// The commit failed and the retry policy gave up on the path.
    Abandoned { attempts: u32 },
}

/// Drains the delivery queue into a committer, one path at a time.
pub struct DeliveryConsumer<C: Committer> {
    committer: Arc<C>,
    receiver: DeliveryReceiver,
    /// Used to put failed paths back on the queue.
    resubmit: DeliverySender,
    policy: RetryPolicy,
    /// Consecutive failures per path, cleared on success.
    failures: HashMap<PathBuf, u32>,
}

impl<C: Committer> DeliveryConsumer<C> {
    /// Creates a consumer.
    ///
    /// # Arguments
    /// * `committer` - Performs the actual archive rewrite
    /// * `receiver` - The queue to drain
    /// * `resubmit` - A sender on the same queue, used for retries
    /// * `policy` - Retry behaviour for failed commits
    pub fn new(
        committer: Arc<C>,
        receiver: DeliveryReceiver,
        resubmit: DeliverySender,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            committer,
            receiver,
            resubmit,
            policy,
            failures: HashMap::new(),
        }
    }

    /// Run until every sender is gone.
    ///
    /// The consumer itself holds a sender for resubmission, so in practice
    /// this runs until the task is aborted.
    pub async fn run(mut self) {
        while let Some(path) = self.receiver.recv().await {
            self.process(path).await;
        }
        tracing::debug!("Delivery queue closed, archive consumer stopping");
    }

    /// Commit one path and apply the retry policy on failure.
    pub async fn process(&mut self, path: PathBuf) -> CommitOutcome {
        let committer = Arc::clone(&self.committer);
        let target = path.clone();
        let result = tokio::task::spawn_blocking(move || committer.commit(&target)).await;

        let error = match result {
            Ok(Ok(())) => {
                self.failures.remove(&path);
                return CommitOutcome::Committed;
            }
            Ok(Err(e)) => e.to_string(),
            Err(join_error) => format!("commit task failed: {}", join_error),
        };

        let attempts = {
            let count = self.failures.entry(path.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let outcome = if self.policy.exhausted(attempts) {
            self.failures.remove(&path);
            tracing::error!(
                "Giving up on {} after {} attempts: {}",
                path.display(),
                attempts,
                error
            );
            CommitOutcome::Abandoned { attempts }
        } else {
            tracing::warn!("Retry with {}: {}", path.display(), error);
            if let Err(e) = self.resubmit.enqueue(path) {
                tracing::error!("Could not requeue failed file: {}", e);
            }
            CommitOutcome::Requeued { attempts }
        };

        tokio::time::sleep(self.policy.delay).await;
        outcome
    }
}
