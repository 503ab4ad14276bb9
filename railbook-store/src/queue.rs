use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

use railbook_core::repository::{DelayQueue, StoreError};

/// Tokio-timer delay queue with per-key dedup. Keys (booking codes) are
/// delivered at-least-once into the worker channel when due; the expiry
/// handler itself is the idempotency boundary, so duplicate delivery after
/// a crash-replay is acceptable.
pub struct TokioDelayQueue {
    tx: mpsc::UnboundedSender<String>,
    scheduled: Arc<Mutex<HashSet<String>>>,
}

impl TokioDelayQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                scheduled: Arc::new(Mutex::new(HashSet::new())),
            },
            rx,
        )
    }
}

#[async_trait]
impl DelayQueue for TokioDelayQueue {
    async fn enqueue(&self, key: &str, due_at: DateTime<Utc>) -> Result<(), StoreError> {
        {
            let mut scheduled = self.scheduled.lock().unwrap();
            if !scheduled.insert(key.to_string()) {
                debug!(key, "expiry task already scheduled, skipping");
                return Ok(());
            }
        }

        let tx = self.tx.clone();
        let scheduled = Arc::clone(&self.scheduled);
        let key = key.to_string();
        let delay = (due_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduled.lock().unwrap().remove(&key);
            // Receiver gone means the worker shut down; nothing to do.
            let _ = tx.send(key);
        });

        Ok(())
    }
}
