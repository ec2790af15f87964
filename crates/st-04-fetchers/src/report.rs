//! Fire-and-forget usage reporting.
//!
//! The response path pushes one record per retrieval onto an unbounded
//! queue and moves on; a background task batches the queue into the
//! log-ingestion collaborator. Ingestor failures are logged and the batch
//! is dropped, never retried into the response path.

use std::sync::Arc;
use std::time::Duration;

use shared_types::{LogIngestor, RetrievalRecord};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const FLUSH_INTERVAL: Duration = Duration::from_secs(10);
const MAX_BATCH: usize = 500;

/// Handle used by the response path. Cheap to clone.
#[derive(Clone)]
pub struct UsageReporter {
    sender: mpsc::UnboundedSender<RetrievalRecord>,
}

impl UsageReporter {
    /// Start the drain task and return the reporting handle.
    pub fn spawn(ingestor: Arc<dyn LogIngestor>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(drain(ingestor, receiver));
        Self { sender }
    }

    /// A reporter whose records go nowhere.
    pub fn disabled() -> Self {
        let (sender, _) = mpsc::unbounded_channel();
        Self { sender }
    }

    /// Queue one record. Never blocks, never fails the caller.
    pub fn report(&self, record: RetrievalRecord) {
        let _ = self.sender.send(record);
    }
}

async fn drain(
    ingestor: Arc<dyn LogIngestor>,
    mut receiver: mpsc::UnboundedReceiver<RetrievalRecord>,
) {
    let mut batch: Vec<RetrievalRecord> = Vec::new();
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            record = receiver.recv() => match record {
                Some(record) => {
                    batch.push(record);
                    if batch.len() >= MAX_BATCH {
                        flush(&*ingestor, &mut batch).await;
                    }
                }
                None => {
                    flush(&*ingestor, &mut batch).await;
                    return;
                }
            },
            _ = interval.tick() => flush(&*ingestor, &mut batch).await,
        }
    }
}

async fn flush(ingestor: &dyn LogIngestor, batch: &mut Vec<RetrievalRecord>) {
    if batch.is_empty() {
        return;
    }
    let records = std::mem::take(batch);
    let count = records.len();
    match ingestor.submit(records).await {
        Ok(()) => debug!(count, "submitted usage records"),
        Err(e) => warn!(count, error = %e, "dropping usage records after submit failure"),
    }
}
