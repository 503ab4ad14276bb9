use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use railbook_catalog::repository::CatalogStore;
use railbook_catalog::{Coach, PassengerGroup, Route, Seat, Trip};
use railbook_core::booking::{Booking, BookingDraft, BookingStatus, Ticket};
use railbook_core::payment::{
    DepositOutcome, Transaction, TransactionStatus, TransactionType,
};
use railbook_core::repository::{BookingStore, SeatLockCache, StoreError, WalletStore};
use railbook_core::CoreError;

fn not_found(what: std::fmt::Arguments<'_>) -> StoreError {
    Box::new(CoreError::NotFound(what.to_string()))
}

#[derive(Default)]
struct WalletRecord {
    balance: i64,
    pin_hash: Option<String>,
}

#[derive(Default)]
struct Inner {
    bookings: HashMap<String, Booking>,
    tickets: Vec<Ticket>,
    wallets: HashMap<Uuid, WalletRecord>,
    ledger: Vec<Transaction>,
    trips: HashMap<Uuid, Trip>,
    routes: HashMap<Uuid, Route>,
    seats: HashMap<Uuid, Seat>,
    coaches: HashMap<Uuid, Coach>,
    groups: HashMap<Uuid, PassengerGroup>,
}

/// Single-process store implementing every persistence port. One mutex over
/// the whole state gives the same atomicity the relational store provides
/// with row locks and the ticket uniqueness constraint; critical sections
/// never await.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding helpers for composition roots and tests.

    pub fn add_trip(&self, trip: Trip) {
        self.inner.lock().unwrap().trips.insert(trip.id, trip);
    }

    pub fn add_route(&self, route: Route) {
        self.inner.lock().unwrap().routes.insert(route.id, route);
    }

    pub fn add_seat(&self, seat: Seat) {
        self.inner.lock().unwrap().seats.insert(seat.id, seat);
    }

    pub fn add_coach(&self, coach: Coach) {
        self.inner.lock().unwrap().coaches.insert(coach.id, coach);
    }

    pub fn add_group(&self, group: PassengerGroup) {
        self.inner.lock().unwrap().groups.insert(group.id, group);
    }

    pub fn open_wallet(&self, user_id: Uuid, balance: i64) {
        self.inner.lock().unwrap().wallets.insert(
            user_id,
            WalletRecord {
                balance,
                pin_hash: None,
            },
        );
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.bookings.contains_key(&booking.code) {
            return Err(Box::new(CoreError::Conflict(format!(
                "booking code {} already exists",
                booking.code
            ))));
        }
        inner.bookings.insert(booking.code.clone(), booking.clone());
        Ok(())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.lock().unwrap().bookings.get(code).cloned())
    }

    async fn update_draft(
        &self,
        code: &str,
        draft: BookingDraft,
        total_price: i64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let booking = inner
            .bookings
            .get_mut(code)
            .ok_or_else(|| not_found(format_args!("booking {}", code)))?;
        // Terminal bookings are frozen; a draft written from a stale read
        // must not undo a concurrent confirmation.
        if booking.status != BookingStatus::Pending {
            return Ok(false);
        }
        booking.draft = draft;
        booking.total_price = total_price;
        booking.touch();
        Ok(true)
    }

    async fn transition(
        &self,
        code: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let booking = inner
            .bookings
            .get_mut(code)
            .ok_or_else(|| not_found(format_args!("booking {}", code)))?;
        if booking.status != from {
            return Ok(false);
        }
        booking.status = to;
        booking.touch();
        Ok(true)
    }

    async fn issue_tickets(&self, code: &str, tickets: &[Ticket]) -> Result<Booking, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        let status = inner
            .bookings
            .get(code)
            .map(|b| b.status)
            .ok_or_else(|| not_found(format_args!("booking {}", code)))?;

        match status {
            // Lost the confirm race to ourselves: the other call already
            // issued the tickets, so this one is a no-op success.
            BookingStatus::Paid => return Ok(inner.bookings[code].clone()),
            BookingStatus::Pending => {}
            other => {
                return Err(Box::new(CoreError::Conflict(format!(
                    "booking {} is {}, not payable",
                    code, other
                ))))
            }
        }

        // The uniqueness constraint: no two tickets for the same (trip,
        // seat) with overlapping segments. Checked and inserted under one
        // lock, so concurrent confirmations cannot both pass.
        for candidate in tickets {
            let taken = inner.tickets.iter().any(|t| {
                t.trip_id == candidate.trip_id
                    && t.seat_id == candidate.seat_id
                    && t.segment.overlaps(&candidate.segment)
            });
            if taken {
                return Err(Box::new(CoreError::Conflict(format!(
                    "seat {} already ticketed for an overlapping segment",
                    candidate.seat_id
                ))));
            }
        }

        inner.tickets.extend_from_slice(tickets);
        let booking = inner.bookings.get_mut(code).unwrap();
        booking.status = BookingStatus::Paid;
        booking.draft = BookingDraft::Empty;
        booking.touch();
        Ok(booking.clone())
    }

    async fn tickets_for_trip(&self, trip_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tickets
            .iter()
            .filter(|t| t.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn tickets_for_booking(&self, booking_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tickets
            .iter()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let mut bookings: Vec<Booking> = self
            .inner
            .lock()
            .unwrap()
            .bookings
            .values()
            .filter(|b| b.user_id == Some(user_id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }
}

#[async_trait]
impl WalletStore for InMemoryStore {
    async fn balance(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let inner = self.inner.lock().unwrap();
        match inner.wallets.get(&user_id) {
            Some(w) => Ok(w.balance),
            None => Err(Box::new(CoreError::NotFound(format!("wallet {}", user_id)))),
        }
    }

    async fn ledger(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_transaction(&self, txn_id: Uuid) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .ledger
            .iter()
            .find(|t| t.id == txn_id)
            .cloned())
    }

    async fn record_deposit_pending(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> Result<Transaction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.wallets.entry(user_id).or_default();
        let txn = Transaction::new(
            user_id,
            amount,
            TransactionType::Deposit,
            TransactionStatus::Pending,
            None,
        );
        inner.ledger.push(txn.clone());
        Ok(txn)
    }

    async fn complete_deposit(&self, txn_id: Uuid) -> Result<DepositOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let txn = inner
            .ledger
            .iter_mut()
            .find(|t| t.id == txn_id)
            .ok_or_else(|| not_found(format_args!("transaction {}", txn_id)))?;

        if txn.txn_type != TransactionType::Deposit {
            return Err(Box::new(CoreError::Conflict(format!(
                "transaction {} is not a deposit",
                txn_id
            ))));
        }
        match txn.status {
            TransactionStatus::Completed => Ok(DepositOutcome::AlreadyCompleted),
            TransactionStatus::Failed => Err(Box::new(CoreError::Conflict(format!(
                "deposit {} already failed",
                txn_id
            )))),
            TransactionStatus::Pending => {
                txn.status = TransactionStatus::Completed;
                txn.updated_at = Utc::now();
                let (user_id, amount) = (txn.user_id, txn.amount);
                inner.wallets.entry(user_id).or_default().balance += amount;
                Ok(DepositOutcome::Completed)
            }
        }
    }

    async fn deduct_payment(
        &self,
        user_id: Uuid,
        amount: i64,
        reference: &str,
    ) -> Result<Transaction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let wallet = inner
            .wallets
            .get_mut(&user_id)
            .ok_or_else(|| not_found(format_args!("wallet {}", user_id)))?;
        if wallet.balance < amount {
            return Err(Box::new(CoreError::Validation(format!(
                "insufficient balance: have {}, need {}",
                wallet.balance, amount
            ))));
        }
        wallet.balance -= amount;
        let txn = Transaction::new(
            user_id,
            -amount,
            TransactionType::Payment,
            TransactionStatus::Completed,
            Some(reference.to_string()),
        );
        inner.ledger.push(txn.clone());
        Ok(txn)
    }

    async fn refund(
        &self,
        user_id: Uuid,
        amount: i64,
        reference: &str,
    ) -> Result<Transaction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let wallet = inner
            .wallets
            .get_mut(&user_id)
            .ok_or_else(|| not_found(format_args!("wallet {}", user_id)))?;
        wallet.balance += amount;
        let txn = Transaction::new(
            user_id,
            amount,
            TransactionType::Refund,
            TransactionStatus::Completed,
            Some(reference.to_string()),
        );
        inner.ledger.push(txn.clone());
        Ok(txn)
    }

    async fn request_withdraw(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> Result<Transaction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let wallet = inner
            .wallets
            .get_mut(&user_id)
            .ok_or_else(|| not_found(format_args!("wallet {}", user_id)))?;
        if wallet.balance < amount {
            return Err(Box::new(CoreError::Validation(format!(
                "insufficient balance: have {}, need {}",
                wallet.balance, amount
            ))));
        }
        wallet.balance -= amount;
        let txn = Transaction::new(
            user_id,
            -amount,
            TransactionType::Withdraw,
            TransactionStatus::Pending,
            None,
        );
        inner.ledger.push(txn.clone());
        Ok(txn)
    }

    async fn settle_withdraw(
        &self,
        txn_id: Uuid,
        approve: bool,
    ) -> Result<Transaction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let txn = inner
            .ledger
            .iter_mut()
            .find(|t| t.id == txn_id)
            .ok_or_else(|| not_found(format_args!("transaction {}", txn_id)))?;

        if txn.txn_type != TransactionType::Withdraw
            || txn.status != TransactionStatus::Pending
        {
            return Err(Box::new(CoreError::Conflict(format!(
                "transaction {} is not a pending withdraw",
                txn_id
            ))));
        }

        txn.updated_at = Utc::now();
        if approve {
            // Balance was already debited at request time.
            txn.status = TransactionStatus::Completed;
            Ok(txn.clone())
        } else {
            txn.status = TransactionStatus::Failed;
            let (user_id, amount) = (txn.user_id, txn.amount);
            let settled = txn.clone();
            inner.wallets.entry(user_id).or_default().balance += -amount;
            Ok(settled)
        }
    }

    async fn set_pin_hash(&self, user_id: Uuid, hash: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.wallets.entry(user_id).or_default().pin_hash = Some(hash.to_string());
        Ok(())
    }

    async fn pin_hash(&self, user_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .wallets
            .get(&user_id)
            .and_then(|w| w.pin_hash.clone()))
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError> {
        Ok(self.inner.lock().unwrap().trips.get(&trip_id).cloned())
    }

    async fn get_route(&self, route_id: Uuid) -> Result<Option<Route>, StoreError> {
        Ok(self.inner.lock().unwrap().routes.get(&route_id).cloned())
    }

    async fn get_seat(&self, seat_id: Uuid) -> Result<Option<Seat>, StoreError> {
        Ok(self.inner.lock().unwrap().seats.get(&seat_id).cloned())
    }

    async fn get_coach(&self, coach_id: Uuid) -> Result<Option<Coach>, StoreError> {
        Ok(self.inner.lock().unwrap().coaches.get(&coach_id).cloned())
    }

    async fn get_group(&self, group_id: Uuid) -> Result<Option<PassengerGroup>, StoreError> {
        Ok(self.inner.lock().unwrap().groups.get(&group_id).cloned())
    }

    async fn trips_for_train(&self, train_id: Uuid) -> Result<Vec<Trip>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .trips
            .values()
            .filter(|t| t.train_id == train_id)
            .cloned()
            .collect())
    }
}

/// In-process twin of the redis seat-lock cache, with per-seat lease
/// expiry. Used by tests and single-node deployments.
#[derive(Default)]
pub struct InMemorySeatLocks {
    held: Mutex<HashMap<Uuid, HashMap<Uuid, Instant>>>,
}

impl InMemorySeatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge(trip: &mut HashMap<Uuid, Instant>) {
        let now = Instant::now();
        trip.retain(|_, expires| *expires > now);
    }
}

#[async_trait]
impl SeatLockCache for InMemorySeatLocks {
    async fn add(
        &self,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        ttl: Duration,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut held = self.held.lock().unwrap();
        let trip = held.entry(trip_id).or_default();
        Self::purge(trip);

        let expires = Instant::now() + ttl;
        let mut added = Vec::new();
        for seat_id in seat_ids {
            if !trip.contains_key(seat_id) {
                trip.insert(*seat_id, expires);
                added.push(*seat_id);
            }
        }
        Ok(added)
    }

    async fn remove(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError> {
        let mut held = self.held.lock().unwrap();
        let Some(trip) = held.get_mut(&trip_id) else {
            return Ok(Vec::new());
        };
        Self::purge(trip);

        let wanted: HashSet<&Uuid> = seat_ids.iter().collect();
        let mut removed = Vec::new();
        for seat_id in wanted {
            if trip.remove(seat_id).is_some() {
                removed.push(*seat_id);
            }
        }
        Ok(removed)
    }

    async fn members(&self, trip_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let mut held = self.held.lock().unwrap();
        let Some(trip) = held.get_mut(&trip_id) else {
            return Ok(Vec::new());
        };
        Self::purge(trip);
        Ok(trip.keys().copied().collect())
    }
}
