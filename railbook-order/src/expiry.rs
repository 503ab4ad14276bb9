use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use railbook_core::CoreError;

use crate::manager::BookingManager;

/// Consumes due booking codes from the delay queue and expires them.
/// Delivery is at-least-once, so the handler leans on `expire` being a
/// no-op for anything no longer PENDING; only infrastructure errors are
/// retried, a bounded number of times.
pub struct ExpiryWorker {
    manager: Arc<BookingManager>,
    max_retries: u32,
}

impl ExpiryWorker {
    pub fn new(manager: Arc<BookingManager>, max_retries: u32) -> Self {
        Self {
            manager,
            max_retries,
        }
    }

    /// Drain the queue until the sending side closes. Intended to be
    /// spawned once at startup.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<String>) {
        info!("expiry worker started");
        while let Some(code) = rx.recv().await {
            self.handle(&code).await;
        }
        info!("expiry worker stopped");
    }

    async fn handle(&self, code: &str) {
        let mut attempt = 0;
        loop {
            match self.manager.expire(code).await {
                Ok(()) => return,
                Err(CoreError::Infra(msg)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(code, attempt, error = %msg, "expiry attempt failed, retrying");
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
                Err(e) => {
                    // Gave up; the booking stays PENDING until an operator
                    // or a later sweep picks it up.
                    error!(code, error = %e, "expiry abandoned");
                    return;
                }
            }
        }
    }
}
