//! Periodic driver for the settle tracker.

use super::SettleTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Default period between settle ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Calls [`SettleTracker::tick`] once per interval for as long as it runs.
///
/// The first tick fires one full interval after start. If the runtime
/// stalls, late ticks are delayed rather than replayed in a burst.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
}

impl Ticker {
    /// Creates a ticker with the given period.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The tick period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the tick loop forever.
    pub async fn run(self, tracker: Arc<SettleTracker>) {
        let mut ticks = interval_at(Instant::now() + self.interval, self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;
            let settled = tracker.tick();
            if !settled.is_empty() {
                tracing::debug!("Tick settled {} file(s)", settled.len());
            }
        }
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::delivery_queue;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_ticker_drives_emission() {
        let (tx, mut rx) = delivery_queue();
        let tracker = Arc::new(SettleTracker::new(3, tx));
        tracker.touch("a.xml");

        let handle = tokio::spawn(Ticker::new(Duration::from_millis(10)).run(tracker.clone()));

        let settled = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("ticker never settled the file");
        assert_eq!(settled, Some(PathBuf::from("a.xml")));
        assert!(tracker.is_empty());

        handle.abort();
    }

    #[tokio::test]
    async fn test_ticker_does_not_fire_immediately() {
        let (tx, _rx) = delivery_queue();
        let tracker = Arc::new(SettleTracker::new(1, tx));
        tracker.touch("a.xml");

        let handle = tokio::spawn(Ticker::new(Duration::from_secs(60)).run(tracker.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(tracker.len(), 1);
        handle.abort();
    }
}
