//! Delivery of settled files to the archiver.
//!
//! - `queue`: the unbounded sender/receiver pair
//! - `consumer`: the single activity that drains the queue with retries

pub mod consumer;
pub mod queue;

pub use consumer::{CommitOutcome, Committer, DeliveryConsumer, RetryPolicy, DEFAULT_RETRY_DELAY};
pub use queue::{delivery_queue, DeliveryError, DeliveryReceiver, DeliverySender};
