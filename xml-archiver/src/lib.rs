//! XML Archiver
//!
//! A single-instance background agent that watches a directory for writes to
//! XML files and folds every settled file into one zip archive.
//!
//! ## How it works
//!
//! ```text
//! Filesystem write
//!        ↓
//! XmlWriteWatcher (keeps *.xml write events only)
//!        ↓
//! SettleTracker.touch() [countdown reset to N]
//!        ↓
//! Ticker, once per second → SettleTracker.tick()
//!        ↓  countdown hit zero
//! DeliveryQueue (unbounded)
//!        ↓
//! DeliveryConsumer → Archiver.commit() [one at a time]
//!        ↓  failure: requeue, pause, try again
//! xml_archive.zip
//! ```
//!
//! A file is archived once it has been quiet for N consecutive ticks. Each
//! commit moves the current archive aside, copies every existing entry into a
//! fresh archive, appends the new file last and drops the staging copy.
//! Entries are never replaced: committing the same file twice leaves two
//! entries with that name, the newest last.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use xml_archiver::{agent::Agent, config::AgentConfig, watch::XmlWriteWatcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AgentConfig::default().with_env_overrides()?;
//!
//!     let mut watcher = XmlWriteWatcher::new()?;
//!     watcher.watch(&config.watch_dir)?;
//!
//!     let running = Agent::new(config)?.spawn(Some(watcher));
//!     tokio::signal::ctrl_c().await?;
//!     running.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`settle`]: countdown tracking and the periodic ticker
//! - [`delivery`]: the hand-off queue and the retrying archive consumer
//! - [`archive`]: the merge-and-swap archive rewrite
//! - [`watch`]: notify adapter and the XML write filter
//! - [`instance`]: machine-wide singleton lock
//! - [`config`]: defaults, builder and environment overrides
//! - [`agent`]: spawns and stops the long-running tasks

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod agent;
pub mod archive;
pub mod config;
pub mod delivery;
pub mod instance;
pub mod settle;
pub mod watch;

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::agent::{Agent, RunningAgent};
    pub use crate::archive::{ArchiveEntry, ArchiveError, Archiver};
    pub use crate::config::{AgentConfig, AgentConfigBuilder, ConfigError};
    pub use crate::delivery::{
        delivery_queue, CommitOutcome, Committer, DeliveryConsumer, DeliverySender, RetryPolicy,
    };
    pub use crate::instance::{InstanceLock, InstanceLockError};
    pub use crate::settle::{SettleTracker, Ticker};
    pub use crate::watch::{WatcherError, XmlWriteWatcher};
}
