use std::future::Future;
use std::pin::Pin;
use tracing::{error, info};

use railbook_core::repository::StoreError;

type CompensateFut = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send>>;

/// Compensating-transaction helper for the deduct-then-confirm-else-refund
/// shape: after each irreversible step, register the action that undoes it;
/// if a later step fails, run the registered compensators in reverse order.
///
/// Compensators are futures built eagerly over owned data, so they stay
/// runnable no matter where the forward path stopped.
#[must_use = "a dropped saga neither commits nor compensates"]
pub struct Saga {
    compensators: Vec<(&'static str, CompensateFut)>,
}

impl Saga {
    pub fn new() -> Self {
        Self {
            compensators: Vec::new(),
        }
    }

    /// Register the compensator for a step that just succeeded.
    pub fn push<F>(&mut self, label: &'static str, compensate: F)
    where
        F: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        self.compensators.push((label, Box::pin(compensate)));
    }

    /// Forward path finished; discard the compensators.
    pub fn commit(mut self) {
        self.compensators.clear();
    }

    /// Forward path failed after irreversible steps; unwind in reverse.
    /// A failing compensator is logged loudly (money may be in limbo and
    /// needs operator attention) but does not stop the remaining ones.
    pub async fn compensate(self) {
        for (label, fut) in self.compensators.into_iter().rev() {
            match fut.await {
                Ok(()) => info!(step = label, "compensated"),
                Err(e) => error!(step = label, error = %e, "compensation failed"),
            }
        }
    }
}

impl Default for Saga {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn compensates_in_reverse_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut saga = Saga::new();

        for step in ["first", "second"] {
            let order = Arc::clone(&order);
            saga.push(step, async move {
                order.lock().unwrap().push(step);
                Ok(())
            });
        }

        saga.compensate().await;
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn commit_runs_nothing() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut saga = Saga::new();
        let counter = Arc::clone(&ran);
        saga.push("refund", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        saga.commit();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_compensator_does_not_stop_the_rest() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut saga = Saga::new();

        let counter = Arc::clone(&ran);
        saga.push("outer", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        saga.push("inner", async move { Err("boom".into()) });

        saga.compensate().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
