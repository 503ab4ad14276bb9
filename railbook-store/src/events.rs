use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use railbook_core::repository::{EventPublisher, StoreError};
use railbook_shared::SeatLockEvent;

/// In-process fan-out of seat lock/release/booked events. The realtime
/// transport (websocket/SSE layer) subscribes here and forwards to clients
/// keyed by trip; that layer is a collaborator, not part of this core.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<SeatLockEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeatLockEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: SeatLockEvent) -> Result<(), StoreError> {
        // No subscribers is not an error; holds work with nobody watching.
        match self.tx.send(event) {
            Ok(n) => debug!(receivers = n, "seat lock event published"),
            Err(_) => debug!("seat lock event dropped, no receivers"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railbook_shared::SeatLockKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn delivers_to_subscribers() {
        let publisher = BroadcastPublisher::new(16);
        let mut rx = publisher.subscribe();

        let event = SeatLockEvent {
            trip_id: Uuid::new_v4(),
            seat_ids: vec![Uuid::new_v4()],
            kind: SeatLockKind::Locked,
            at: 0,
        };
        publisher.publish(event.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.trip_id, event.trip_id);
        assert_eq!(received.kind, SeatLockKind::Locked);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let publisher = BroadcastPublisher::new(16);
        let event = SeatLockEvent {
            trip_id: Uuid::new_v4(),
            seat_ids: vec![],
            kind: SeatLockKind::Released,
            at: 0,
        };
        assert!(publisher.publish(event).await.is_ok());
    }
}
