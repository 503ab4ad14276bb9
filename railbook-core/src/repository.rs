use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::booking::{Booking, BookingDraft, BookingStatus, Ticket};
use crate::payment::{DepositOutcome, Transaction};
use railbook_shared::SeatLockEvent;

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Booking persistence port. Implementations must make `issue_tickets` a
/// single atomic unit that enforces the (trip, seat, overlapping-segment)
/// uniqueness rule; that constraint, not the advisory seat locks, is what
/// finally resolves seat contention.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>, StoreError>;

    /// Persist draft/price changes, guarded on the stored status still
    /// being PENDING (checked under the same lock as the write). Returns
    /// false when payment finished first; a stale draft must never
    /// overwrite a terminal booking.
    async fn update_draft(
        &self,
        code: &str,
        draft: BookingDraft,
        total_price: i64,
    ) -> Result<bool, StoreError>;

    /// Compare-and-set status transition. Returns false when the booking was
    /// not in `from` (e.g. an expiry firing after a user cancel).
    async fn transition(
        &self,
        code: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool, StoreError>;

    /// Atomically: verify the booking is PENDING, check every ticket against
    /// existing tickets for the same (trip, seat) with an overlapping
    /// segment, insert all tickets, set status PAID, and clear the draft.
    /// Either everything applies or nothing does; a seat conflict surfaces
    /// as `CoreError::Conflict`.
    async fn issue_tickets(&self, code: &str, tickets: &[Ticket]) -> Result<Booking, StoreError>;

    async fn tickets_for_trip(&self, trip_id: Uuid) -> Result<Vec<Ticket>, StoreError>;

    async fn tickets_for_booking(&self, booking_id: Uuid) -> Result<Vec<Ticket>, StoreError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, StoreError>;
}

/// Wallet persistence port. Every balance mutation is a single atomic
/// read-modify-write scoped to one user; callers never read-then-write
/// across two calls.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> Result<i64, StoreError>;

    async fn ledger(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError>;

    async fn find_transaction(&self, txn_id: Uuid) -> Result<Option<Transaction>, StoreError>;

    /// PENDING deposit entry; the balance is untouched until the gateway
    /// confirms and `complete_deposit` runs.
    async fn record_deposit_pending(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> Result<Transaction, StoreError>;

    /// CAS PENDING -> COMPLETED, crediting the balance. Idempotent against
    /// duplicate gateway callbacks.
    async fn complete_deposit(&self, txn_id: Uuid) -> Result<DepositOutcome, StoreError>;

    /// Atomic check-balance-and-debit with a COMPLETED payment entry.
    /// Fails without mutation when balance < amount.
    async fn deduct_payment(
        &self,
        user_id: Uuid,
        amount: i64,
        reference: &str,
    ) -> Result<Transaction, StoreError>;

    /// Compensating credit restoring a previously deducted amount.
    async fn refund(
        &self,
        user_id: Uuid,
        amount: i64,
        reference: &str,
    ) -> Result<Transaction, StoreError>;

    /// Atomic check-balance-and-debit with a PENDING withdraw entry,
    /// awaiting admin settlement.
    async fn request_withdraw(&self, user_id: Uuid, amount: i64)
        -> Result<Transaction, StoreError>;

    /// Approve (COMPLETED, no balance change) or reject (FAILED, debit
    /// reversed) a pending withdraw.
    async fn settle_withdraw(&self, txn_id: Uuid, approve: bool)
        -> Result<Transaction, StoreError>;

    async fn set_pin_hash(&self, user_id: Uuid, hash: &str) -> Result<(), StoreError>;

    async fn pin_hash(&self, user_id: Uuid) -> Result<Option<String>, StoreError>;
}

/// TTL-bearing shared cache of advisory seat holds, keyed by trip. A lease,
/// not a mutex: entries may outlive or predecease the owning booking by a
/// small margin, and correctness does not depend on them.
#[async_trait]
pub trait SeatLockCache: Send + Sync {
    /// Add seats to the held set, returning only the delta actually added
    /// (already-present IDs are a no-op).
    async fn add(
        &self,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        ttl: Duration,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Remove seats, returning the delta actually removed.
    async fn remove(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError>;

    /// The currently held set, used to seed a newly connecting client.
    async fn members(&self, trip_id: Uuid) -> Result<Vec<Uuid>, StoreError>;
}

/// Publish side of the lock/release/booked event stream. Fan-out to
/// connected clients is the realtime transport's job, not ours.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: SeatLockEvent) -> Result<(), StoreError>;
}

/// Delayed-task port with at-least-once delivery and per-key dedup.
/// Keys are booking codes; the expiry worker consumes due keys.
#[async_trait]
pub trait DelayQueue: Send + Sync {
    async fn enqueue(&self, key: &str, due_at: DateTime<Utc>) -> Result<(), StoreError>;
}
