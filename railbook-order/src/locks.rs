use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use railbook_core::repository::{EventPublisher, SeatLockCache, StoreError};
use railbook_core::{CoreError, CoreResult};
use railbook_shared::{SeatLockEvent, SeatLockKind};

/// Advisory seat-hold coordinator: a TTL-bounded held-seat set per trip plus
/// an event stream observers use for near-real-time repaints and forced
/// de-selection. Holds are a lease for early conflict feedback; the ticket
/// uniqueness constraint at confirmation time is the authority.
pub struct SeatLockCoordinator {
    cache: Arc<dyn SeatLockCache>,
    events: Arc<dyn EventPublisher>,
    lease: Duration,
}

impl SeatLockCoordinator {
    /// `lease` must be the same configured hold duration the expiry
    /// scheduler uses, so locks and bookings lapse together.
    pub fn new(
        cache: Arc<dyn SeatLockCache>,
        events: Arc<dyn EventPublisher>,
        lease: Duration,
    ) -> Self {
        Self {
            cache,
            events,
            lease,
        }
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Add seats to the trip's held set. Idempotent: already-present IDs are
    /// skipped, and the "locked" event carries only the delta actually
    /// added. Returns that delta so callers can detect partial grabs.
    pub async fn lock(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> CoreResult<Vec<Uuid>> {
        let added = self
            .cache
            .add(trip_id, seat_ids, self.lease)
            .await
            .map_err(infra)?;
        if !added.is_empty() {
            info!(trip_id = %trip_id, count = added.len(), "seats locked");
            self.broadcast(trip_id, &added, SeatLockKind::Locked).await;
        }
        Ok(added)
    }

    /// Remove seats from the held set and broadcast the release.
    pub async fn release(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> CoreResult<Vec<Uuid>> {
        let removed = self.cache.remove(trip_id, seat_ids).await.map_err(infra)?;
        if !removed.is_empty() {
            info!(trip_id = %trip_id, count = removed.len(), "seats released");
            self.broadcast(trip_id, &removed, SeatLockKind::Released)
                .await;
        }
        Ok(removed)
    }

    /// The currently held set, used to seed a newly connecting client.
    pub async fn query(&self, trip_id: Uuid) -> CoreResult<Vec<Uuid>> {
        self.cache.members(trip_id).await.map_err(infra)
    }

    /// Broadcast-only signal that seats became permanently ticketed.
    pub async fn booked(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> CoreResult<()> {
        self.broadcast(trip_id, seat_ids, SeatLockKind::Booked).await;
        Ok(())
    }

    async fn broadcast(&self, trip_id: Uuid, seat_ids: &[Uuid], kind: SeatLockKind) {
        let event = SeatLockEvent {
            trip_id,
            seat_ids: seat_ids.to_vec(),
            kind,
            at: Utc::now().timestamp(),
        };
        // Event loss degrades the UI, not correctness; log and move on.
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(trip_id = %trip_id, error = %e, "seat lock event not published");
        }
    }
}

fn infra(e: StoreError) -> CoreError {
    match e.downcast::<CoreError>() {
        Ok(core) => *core,
        Err(e) => CoreError::Infra(e.to_string()),
    }
}
