use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a set of seats on a trip.
///
/// `Locked`/`Released` track advisory holds by unpaid bookings; `Booked` is a
/// broadcast-only signal that seats became permanently ticketed, so observers
/// can repaint without re-querying the whole trip.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatLockKind {
    Locked,
    Released,
    Booked,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeatLockEvent {
    pub trip_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub kind: SeatLockKind,
    pub at: i64, // Unix timestamp
}
