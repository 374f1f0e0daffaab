//! Writer to updater insert notifications
//!
//! One bounded queue per updater. A document is announced to updater
//! `doc_num mod updaters`. When a queue is full the writer waits for space, so
//! notifications are never dropped.

use docload_interfaces::DocumentRevisionPair;
use tokio::sync::mpsc;
use tracing::warn;

/// Outcome of a writer's attempt to insert one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Inserted {
        doc_num: u64,
        pair: DocumentRevisionPair,
        channels: Vec<String>,
    },
    /// The document was not created and will never be announced
    Abandoned { doc_num: u64 },
}

impl Notification {
    pub fn doc_num(&self) -> u64 {
        match self {
            Notification::Inserted { doc_num, .. } | Notification::Abandoned { doc_num } => *doc_num,
        }
    }
}

/// Sending side shared by all writers
#[derive(Debug, Clone, Default)]
pub struct UpdateNotifier {
    queues: Vec<mpsc::Sender<Notification>>,
}

impl UpdateNotifier {
    /// A notifier with no updaters behind it
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.queues.is_empty()
    }

    /// Deliver to the owning updater, waiting while its queue is full
    pub async fn notify(&self, notification: Notification) {
        if self.queues.is_empty() {
            return;
        }
        let index = (notification.doc_num() % self.queues.len() as u64) as usize;
        if let Err(mpsc::error::SendError(lost)) = self.queues[index].send(notification).await {
            // The updater already ended; its own failure is what the run reports
            warn!(updater = index, doc_num = lost.doc_num(), "updater queue closed");
        }
    }
}

/// Create the notifier and one receiver per updater
pub fn notification_queues(
    num_updaters: usize,
    capacity: usize,
) -> (UpdateNotifier, Vec<mpsc::Receiver<Notification>>) {
    let (queues, receivers) = (0..num_updaters)
        .map(|_| mpsc::channel(capacity.max(1)))
        .unzip();
    (UpdateNotifier { queues }, receivers)
}
