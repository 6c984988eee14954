//! Unbounded hand-off queue between settle detection and the archiver.

use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised when handing a path to the queue.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("delivery queue is closed, {} was not enqueued", .0.display())]
    Closed(PathBuf),
}

/// Producer half of the delivery queue.
///
/// Cheap to clone. Enqueueing never blocks: the queue has no capacity limit.
#[derive(Debug, Clone)]
pub struct DeliverySender {
    tx: mpsc::UnboundedSender<PathBuf>,
}

impl DeliverySender {
    /// Push a path onto the queue.
    pub fn enqueue(&self, path: PathBuf) -> Result<(), DeliveryError> {
        self.tx
            .send(path)
            .map_err(|mpsc::error::SendError(path)| DeliveryError::Closed(path))
    }

    /// Whether the consuming side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the delivery queue.
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::UnboundedReceiver<PathBuf>,
}

impl DeliveryReceiver {
    /// Wait for the next path. Returns `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<PathBuf> {
        self.rx.recv().await
    }

    /// Take the next path if one is already queued.
    pub fn try_recv(&mut self) -> Option<PathBuf> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected sender/receiver pair.
pub fn delivery_queue() -> (DeliverySender, DeliveryReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DeliverySender { tx }, DeliveryReceiver { rx })
}
