use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The part of a route's stops a ticket covers, as [from, to) stop indices.
/// Used both for pricing and for seat-overlap detection: two tickets for the
/// same seat may coexist only when their segments do not overlap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub from_stop: u32,
    pub to_stop: u32,
}

impl Segment {
    pub fn new(from_stop: u32, to_stop: u32) -> Self {
        Self { from_stop, to_stop }
    }

    /// Half-open interval overlap: [a, b) intersects [c, d).
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.from_stop < other.to_stop && other.from_stop < self.to_stop
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Paid,
    Cancelled,
    PaymentFailed,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Paid => "PAID",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::PaymentFailed => "PAYMENT_FAILED",
        };
        write!(f, "{}", s)
    }
}

/// One passenger entry inside a priced draft. `document: None` is the
/// sentinel for child passengers, who are exempt from identity documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftPassenger {
    pub full_name: String,
    pub document: Option<String>,
    pub group_id: Uuid,
    pub seat_id: Uuid,
    pub price: i64,
}

/// Typed scratch space for a booking's in-flight selection, authoritative
/// only while the booking is PENDING. Replaces an untyped metadata blob:
/// every read goes through the variant, so a half-written state is
/// unrepresentable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingDraft {
    #[default]
    Empty,
    SeatsOnly {
        seat_ids: Vec<Uuid>,
        segment: Segment,
    },
    Priced {
        segment: Segment,
        passengers: Vec<DraftPassenger>,
    },
}

impl BookingDraft {
    /// Seats the draft currently references, in draft order.
    pub fn seat_ids(&self) -> Vec<Uuid> {
        match self {
            BookingDraft::Empty => Vec::new(),
            BookingDraft::SeatsOnly { seat_ids, .. } => seat_ids.clone(),
            BookingDraft::Priced { passengers, .. } => {
                passengers.iter().map(|p| p.seat_id).collect()
            }
        }
    }

    pub fn segment(&self) -> Option<Segment> {
        match self {
            BookingDraft::Empty => None,
            BookingDraft::SeatsOnly { segment, .. } => Some(*segment),
            BookingDraft::Priced { segment, .. } => Some(*segment),
        }
    }
}

/// The unit of reservation. `user_id` is None for guest bookings; ownership
/// is assigned explicitly from the authenticated caller, never defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub code: String,
    pub user_id: Option<Uuid>,
    pub trip_id: Uuid,
    pub total_price: i64,
    pub status: BookingStatus,
    pub draft: BookingDraft,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        code: String,
        user_id: Option<Uuid>,
        trip_id: Uuid,
        draft: BookingDraft,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code,
            user_id,
            trip_id,
            total_price: 0,
            status: BookingStatus::Pending,
            draft,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Durable record of a paid seat consumption. Immutable once created; the
/// only entity that permanently consumes a seat for a trip segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub seat_id: Uuid,
    pub passenger_name: String,
    pub document: Option<String>,
    pub group_id: Uuid,
    pub segment: Segment,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_overlap() {
        let a = Segment::new(0, 3);
        assert!(a.overlaps(&Segment::new(2, 5)));
        assert!(a.overlaps(&Segment::new(0, 1)));
        // Touching endpoints do not overlap: one passenger alights where
        // the next boards.
        assert!(!a.overlaps(&Segment::new(3, 6)));
        assert!(!Segment::new(3, 6).overlaps(&a));
    }

    #[test]
    fn draft_seat_ids_follow_variant() {
        let seat = Uuid::new_v4();
        assert!(BookingDraft::Empty.seat_ids().is_empty());

        let seats_only = BookingDraft::SeatsOnly {
            seat_ids: vec![seat],
            segment: Segment::new(0, 2),
        };
        assert_eq!(seats_only.seat_ids(), vec![seat]);

        let priced = BookingDraft::Priced {
            segment: Segment::new(0, 2),
            passengers: vec![DraftPassenger {
                full_name: "A Nguyen".into(),
                document: None,
                group_id: Uuid::new_v4(),
                seat_id: seat,
                price: 110_000,
            }],
        };
        assert_eq!(priced.seat_ids(), vec![seat]);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(BookingStatus::Paid.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::PaymentFailed.is_terminal());
    }
}
