use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use async_trait::async_trait;
use railbook_catalog::schedule::{schedule_conflict, trip_window};
use railbook_catalog::{
    seat_price, CatalogStore, Coach, PassengerGroup, PriceInputs, Route, Seat, SeatStatus, Trip,
    TripStatus,
};
use railbook_core::booking::{
    Booking, BookingDraft, BookingStatus, DraftPassenger, Segment, Ticket,
};
use railbook_core::identity;
use railbook_core::payment::BookingConfirmer;
use railbook_core::repository::{BookingStore, DelayQueue, StoreError};
use railbook_core::{CoreError, CoreResult};
use railbook_shared::code::booking_code;
use railbook_shared::pii::mask_document;

use crate::gateway::GatewaySigner;
use crate::locks::SeatLockCoordinator;
use crate::models::{
    CreateBookingRequest, InitBookingRequest, PassengerSpec, PaymentInitResponse,
    UpdatePassengersRequest,
};
use crate::saga::Saga;

/// Owns the booking lifecycle: creation (single- and two-phase), passenger
/// validation and pricing, confirmation into tickets, cancellation and
/// expiry. Status changes flow through the store's CAS transition or the
/// atomic ticket issue; nothing writes a status directly.
pub struct BookingManager {
    bookings: Arc<dyn BookingStore>,
    catalog: Arc<dyn CatalogStore>,
    locks: Arc<SeatLockCoordinator>,
    queue: Arc<dyn DelayQueue>,
    signer: Arc<GatewaySigner>,
    hold: Duration,
}

impl BookingManager {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        catalog: Arc<dyn CatalogStore>,
        locks: Arc<SeatLockCoordinator>,
        queue: Arc<dyn DelayQueue>,
        signer: Arc<GatewaySigner>,
        hold: Duration,
    ) -> Self {
        Self {
            bookings,
            catalog,
            locks,
            queue,
            signer,
            hold,
        }
    }

    /// Two-phase creation, step 1: validate and lock the seats, create a
    /// PENDING booking with a seats-only draft, schedule its expiry.
    pub async fn init_booking(&self, req: InitBookingRequest) -> CoreResult<Booking> {
        let (trip, route) = self.load_open_trip(req.trip_id).await?;
        check_segment(&route, req.segment)?;
        self.validate_seats(&trip, &req.seat_ids, req.segment).await?;

        self.acquire_locks(trip.id, &req.seat_ids).await?;
        let mut saga = Saga::new();
        self.push_release(&mut saga, trip.id, req.seat_ids.clone());

        let booking = Booking::new(
            booking_code(),
            req.user_id,
            trip.id,
            BookingDraft::SeatsOnly {
                seat_ids: req.seat_ids,
                segment: req.segment,
            },
            self.hold_deadline(),
        );
        self.persist_new(&mut saga, &booking).await?;
        saga.commit();

        info!(code = %booking.code, trip_id = %trip.id, "booking initialized");
        Ok(booking)
    }

    /// Two-phase creation, step 2: attach passengers to the seats claimed in
    /// step 1, price them, and hand back the gateway payment URL.
    pub async fn update_passengers(
        &self,
        req: UpdatePassengersRequest,
    ) -> CoreResult<PaymentInitResponse> {
        let mut booking = self.get_by_code(&req.code).await?;
        if booking.status != BookingStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "booking {} is {}",
                booking.code, booking.status
            )));
        }
        if booking.expires_at <= Utc::now() {
            return Err(CoreError::Conflict("booking hold has expired".into()));
        }

        let segment = booking
            .draft
            .segment()
            .ok_or_else(|| CoreError::Validation("booking has no seat selection".into()))?;
        let reserved: HashSet<Uuid> = booking.draft.seat_ids().into_iter().collect();
        let submitted: HashSet<Uuid> = req.passengers.iter().map(|p| p.seat_id).collect();
        if reserved != submitted {
            return Err(CoreError::Validation(
                "passenger seats must match the reserved seats".into(),
            ));
        }

        let (trip, route) = self.load_open_trip(booking.trip_id).await?;
        let (passengers, total) = self
            .price_passengers(&trip, &route, segment, req.passengers)
            .await?;

        let draft = BookingDraft::Priced {
            segment,
            passengers,
        };
        let updated = self
            .bookings
            .update_draft(&booking.code, draft.clone(), total)
            .await
            .map_err(store_err)?;
        if !updated {
            // Payment finished between our read and this write; the
            // terminal booking stays exactly as confirmation left it.
            return Err(CoreError::Conflict(format!(
                "payment already completed for booking {}",
                booking.code
            )));
        }
        booking.draft = draft;
        booking.total_price = total;
        booking.touch();

        let pay_url = self.payment_url(&booking, &req.client_ip);
        info!(code = %booking.code, total, "booking priced");
        Ok(PaymentInitResponse { booking, pay_url })
    }

    /// Single-phase creation: seats and passengers in one request, priced
    /// immediately. Used by guest checkout.
    pub async fn create_booking(
        &self,
        req: CreateBookingRequest,
    ) -> CoreResult<PaymentInitResponse> {
        let (trip, route) = self.load_open_trip(req.trip_id).await?;
        check_segment(&route, req.segment)?;
        let seat_ids: Vec<Uuid> = req.passengers.iter().map(|p| p.seat_id).collect();
        self.validate_seats(&trip, &seat_ids, req.segment).await?;

        self.acquire_locks(trip.id, &seat_ids).await?;
        let mut saga = Saga::new();
        self.push_release(&mut saga, trip.id, seat_ids);

        let (passengers, total) = match self
            .price_passengers(&trip, &route, req.segment, req.passengers)
            .await
        {
            Ok(priced) => priced,
            Err(e) => {
                saga.compensate().await;
                return Err(e);
            }
        };

        let mut booking = Booking::new(
            booking_code(),
            req.user_id,
            trip.id,
            BookingDraft::Priced {
                segment: req.segment,
                passengers,
            },
            self.hold_deadline(),
        );
        booking.total_price = total;
        self.persist_new(&mut saga, &booking).await?;
        saga.commit();

        let pay_url = self.payment_url(&booking, &req.client_ip);
        info!(code = %booking.code, total, "booking created");
        Ok(PaymentInitResponse { booking, pay_url })
    }

    /// Idempotent confirmation: turn a priced PENDING booking into PAID with
    /// one ticket per passenger. The store's atomic issue enforces seat
    /// uniqueness; on success the advisory locks are released and the seats
    /// broadcast as permanently booked.
    pub async fn confirm(&self, code: &str) -> CoreResult<Booking> {
        let booking = self.get_by_code(code).await?;
        if booking.status == BookingStatus::Paid {
            info!(code, "confirm on already-paid booking, no-op");
            return Ok(booking);
        }
        if booking.status != BookingStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "booking {} is {}",
                booking.code, booking.status
            )));
        }
        let BookingDraft::Priced {
            segment,
            passengers,
        } = &booking.draft
        else {
            return Err(CoreError::Validation(
                "booking has no passenger details".into(),
            ));
        };

        let now = Utc::now();
        let tickets: Vec<Ticket> = passengers
            .iter()
            .map(|p| Ticket {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                trip_id: booking.trip_id,
                seat_id: p.seat_id,
                passenger_name: p.full_name.clone(),
                document: p.document.clone(),
                group_id: p.group_id,
                segment: *segment,
                price: p.price,
                created_at: now,
            })
            .collect();
        let seat_ids: Vec<Uuid> = tickets.iter().map(|t| t.seat_id).collect();

        let paid = self
            .bookings
            .issue_tickets(code, &tickets)
            .await
            .map_err(store_err)?;

        // The booking is durably PAID; lock cleanup is best-effort (the
        // lease lapses on its own if this fails).
        if let Err(e) = self.locks.release(paid.trip_id, &seat_ids).await {
            warn!(code, error = %e, "seat locks not released after confirm");
        }
        let _ = self.locks.booked(paid.trip_id, &seat_ids).await;

        info!(code = %paid.code, tickets = tickets.len(), "booking paid");
        Ok(paid)
    }

    /// User-driven cancellation of a PENDING booking. Owned bookings demand
    /// the owner; guest bookings are cancellable by whoever holds the code.
    pub async fn cancel(&self, code: &str, requester: Option<Uuid>) -> CoreResult<Booking> {
        let mut booking = self.get_by_code(code).await?;
        if let Some(owner) = booking.user_id {
            if requester != Some(owner) {
                return Err(CoreError::Forbidden(
                    "booking belongs to another user".into(),
                ));
            }
        }
        if booking.status != BookingStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "booking {} is {}",
                booking.code, booking.status
            )));
        }

        let moved = self
            .bookings
            .transition(code, BookingStatus::Pending, BookingStatus::Cancelled)
            .await
            .map_err(store_err)?;
        if !moved {
            return Err(CoreError::Conflict("booking already finalized".into()));
        }

        let seat_ids = booking.draft.seat_ids();
        if let Err(e) = self.locks.release(booking.trip_id, &seat_ids).await {
            warn!(code, error = %e, "seat locks not released after cancel");
        }
        booking.status = BookingStatus::Cancelled;
        booking.touch();
        info!(code, "booking cancelled");
        Ok(booking)
    }

    /// Expiry-scheduler entry point. Duplicate or late deliveries are
    /// harmless: anything not PENDING anymore is left alone.
    pub async fn expire(&self, code: &str) -> CoreResult<()> {
        let booking = match self.bookings.get_by_code(code).await.map_err(store_err)? {
            Some(b) => b,
            None => {
                warn!(code, "expiry fired for unknown booking");
                return Ok(());
            }
        };
        if booking.status != BookingStatus::Pending {
            return Ok(());
        }

        let moved = self
            .bookings
            .transition(code, BookingStatus::Pending, BookingStatus::Cancelled)
            .await
            .map_err(store_err)?;
        if moved {
            let seat_ids = booking.draft.seat_ids();
            if let Err(e) = self.locks.release(booking.trip_id, &seat_ids).await {
                warn!(code, error = %e, "seat locks not released after expiry");
            }
            info!(code, "booking expired");
        }
        Ok(())
    }

    pub async fn get_by_code(&self, code: &str) -> CoreResult<Booking> {
        self.bookings
            .get_by_code(code)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("booking {code}")))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Booking>> {
        self.bookings.list_for_user(user_id).await.map_err(store_err)
    }

    pub async fn tickets_for_booking(&self, code: &str) -> CoreResult<Vec<Ticket>> {
        let booking = self.get_by_code(code).await?;
        self.bookings
            .tickets_for_booking(booking.id)
            .await
            .map_err(store_err)
    }

    /// Quote one seat for one passenger group over a segment, through the
    /// same pricing path a booking uses.
    pub async fn estimate_price(
        &self,
        trip_id: Uuid,
        seat_id: Uuid,
        group_id: Uuid,
        segment: Segment,
    ) -> CoreResult<i64> {
        let (trip, route) = self.load_open_trip(trip_id).await?;
        check_segment(&route, segment)?;
        let (seat, coach) = self.load_seat(&trip, seat_id).await?;
        let group = self.load_group(group_id).await?;
        price_for(&route, &seat, &coach, &group, segment)
    }

    /// Guard for trip scheduling: a train cannot run two trips whose
    /// occupation windows (travel plus turnaround) overlap.
    pub async fn validate_trip_schedule(
        &self,
        train_id: Uuid,
        route_id: Uuid,
        departure: DateTime<Utc>,
    ) -> CoreResult<()> {
        let route = self
            .catalog
            .get_route(route_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("route {route_id}")))?;

        let mut windows = Vec::new();
        for trip in self
            .catalog
            .trips_for_train(train_id)
            .await
            .map_err(store_err)?
        {
            let r = self
                .catalog
                .get_route(trip.route_id)
                .await
                .map_err(store_err)?
                .ok_or_else(|| CoreError::Infra(format!("route missing for trip {}", trip.id)))?;
            windows.push(trip_window(&r, trip.departure));
        }

        if schedule_conflict(&windows, &route, departure) {
            return Err(CoreError::Conflict(
                "train already has an overlapping trip".into(),
            ));
        }
        Ok(())
    }

    async fn load_open_trip(&self, trip_id: Uuid) -> CoreResult<(Trip, Route)> {
        let trip = self
            .catalog
            .get_trip(trip_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("trip {trip_id}")))?;
        if trip.status != TripStatus::Scheduled {
            return Err(CoreError::Conflict("trip is not open for booking".into()));
        }
        let route = self
            .catalog
            .get_route(trip.route_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::Infra(format!("route missing for trip {trip_id}")))?;
        Ok((trip, route))
    }

    async fn load_seat(&self, trip: &Trip, seat_id: Uuid) -> CoreResult<(Seat, Coach)> {
        let seat = self
            .catalog
            .get_seat(seat_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::Validation(format!("unknown seat {seat_id}")))?;
        let coach = self
            .catalog
            .get_coach(seat.coach_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::Infra(format!("coach missing for seat {seat_id}")))?;
        if coach.train_id != trip.train_id {
            return Err(CoreError::Validation(format!(
                "seat {seat_id} does not belong to this trip's train"
            )));
        }
        Ok((seat, coach))
    }

    async fn load_group(&self, group_id: Uuid) -> CoreResult<PassengerGroup> {
        self.catalog
            .get_group(group_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::Validation(format!("unknown passenger group {group_id}")))
    }

    async fn validate_seats(
        &self,
        trip: &Trip,
        seat_ids: &[Uuid],
        segment: Segment,
    ) -> CoreResult<()> {
        if seat_ids.is_empty() {
            return Err(CoreError::Validation("no seats selected".into()));
        }
        let distinct: HashSet<Uuid> = seat_ids.iter().copied().collect();
        if distinct.len() != seat_ids.len() {
            return Err(CoreError::Validation("duplicate seats selected".into()));
        }

        for &seat_id in seat_ids {
            let (seat, _) = self.load_seat(trip, seat_id).await?;
            if seat.status != SeatStatus::Available {
                return Err(CoreError::Validation(format!(
                    "seat {seat_id} is not open for sale"
                )));
            }
        }

        // Existing tickets beat the advisory locks: a seat already ticketed
        // over an overlapping segment can never be selected again.
        for ticket in self
            .bookings
            .tickets_for_trip(trip.id)
            .await
            .map_err(store_err)?
        {
            if distinct.contains(&ticket.seat_id) && ticket.segment.overlaps(&segment) {
                return Err(CoreError::Conflict(format!(
                    "seat {} already ticketed",
                    ticket.seat_id
                )));
            }
        }
        Ok(())
    }

    /// Grab the advisory locks for a fresh booking. A partial grab means
    /// another booking already holds part of the selection: give back only
    /// the delta we added and report the conflict.
    async fn acquire_locks(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> CoreResult<()> {
        let added = self.locks.lock(trip_id, seat_ids).await?;
        if added.len() != seat_ids.len() {
            if let Err(e) = self.locks.release(trip_id, &added).await {
                warn!(trip_id = %trip_id, error = %e, "partial lock delta not released");
            }
            return Err(CoreError::Conflict(
                "one or more seats are held by another booking".into(),
            ));
        }
        Ok(())
    }

    fn push_release(&self, saga: &mut Saga, trip_id: Uuid, seat_ids: Vec<Uuid>) {
        let locks = Arc::clone(&self.locks);
        saga.push("release-seat-locks", async move {
            locks
                .release(trip_id, &seat_ids)
                .await
                .map(|_| ())
                .map_err(|e| -> StoreError { Box::new(e) })
        });
    }

    /// Create the booking and schedule its expiry; unwind on any failure so
    /// no locked seat is left without a PENDING booking behind it.
    async fn persist_new(&self, saga: &mut Saga, booking: &Booking) -> CoreResult<()> {
        if let Err(e) = self.bookings.create_booking(booking).await {
            let saga = std::mem::take(saga);
            saga.compensate().await;
            return Err(store_err(e));
        }
        {
            let bookings = Arc::clone(&self.bookings);
            let code = booking.code.clone();
            saga.push("cancel-booking", async move {
                bookings
                    .transition(&code, BookingStatus::Pending, BookingStatus::Cancelled)
                    .await
                    .map(|_| ())
            });
        }
        if let Err(e) = self.queue.enqueue(&booking.code, booking.expires_at).await {
            let saga = std::mem::take(saga);
            saga.compensate().await;
            return Err(CoreError::Infra(format!("expiry not scheduled: {e}")));
        }
        Ok(())
    }

    async fn price_passengers(
        &self,
        trip: &Trip,
        route: &Route,
        segment: Segment,
        specs: Vec<PassengerSpec>,
    ) -> CoreResult<(Vec<DraftPassenger>, i64)> {
        if specs.is_empty() {
            return Err(CoreError::Validation("no passengers submitted".into()));
        }

        let mut passengers = Vec::with_capacity(specs.len());
        let mut total = 0i64;
        for spec in specs {
            let (seat, coach) = self.load_seat(trip, spec.seat_id).await?;
            let group = self.load_group(spec.group_id).await?;

            let document = if group.requires_document {
                let doc = spec
                    .document
                    .map(|d| d.into_inner())
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| {
                        CoreError::Validation(format!(
                            "passenger {} requires an identity document",
                            spec.full_name
                        ))
                    })?;
                identity::validate_cccd_for_group_now(&doc, group.min_age, group.max_age)
                    .map_err(|e| {
                        CoreError::Validation(format!(
                            "document {}: {e}",
                            mask_document(&doc)
                        ))
                    })?;
                Some(doc)
            } else {
                // Children carry no document; None is the sentinel.
                None
            };

            let price = price_for(route, &seat, &coach, &group, segment)?;
            total += price;
            passengers.push(DraftPassenger {
                full_name: spec.full_name,
                document,
                group_id: group.id,
                seat_id: seat.id,
                price,
            });
        }
        Ok((passengers, total))
    }

    fn hold_deadline(&self) -> DateTime<Utc> {
        Utc::now()
            + ChronoDuration::from_std(self.hold).unwrap_or_else(|_| ChronoDuration::minutes(10))
    }

    fn payment_url(&self, booking: &Booking, client_ip: &str) -> String {
        self.signer.build_payment_url(
            &booking.code,
            booking.total_price,
            &format!("Booking {}", booking.code),
            "train-ticket",
            client_ip,
            None,
            Utc::now(),
        )
    }
}

#[async_trait]
impl BookingConfirmer for BookingManager {
    async fn confirm(&self, code: &str) -> Result<Booking, StoreError> {
        BookingManager::confirm(self, code)
            .await
            .map_err(|e| -> StoreError { Box::new(e) })
    }

    /// Terminal state for a wallet payment that lost the seat race after the
    /// refund was applied. Locks go back so the seats free up immediately.
    async fn mark_payment_failed(&self, code: &str) -> Result<(), StoreError> {
        let booking = self
            .bookings
            .get_by_code(code)
            .await?
            .ok_or_else(|| -> StoreError {
                Box::new(CoreError::NotFound(format!("booking {code}")))
            })?;

        let moved = self
            .bookings
            .transition(code, BookingStatus::Pending, BookingStatus::PaymentFailed)
            .await?;
        if moved {
            let seat_ids = booking.draft.seat_ids();
            if let Err(e) = self.locks.release(booking.trip_id, &seat_ids).await {
                warn!(code, error = %e, "seat locks not released after failed payment");
            }
            info!(code, "booking marked payment-failed");
        }
        Ok(())
    }
}

/// The single fare formula. Distance is |to - from| so a return-direction
/// segment prices the same as the outbound one.
fn price_for(
    route: &Route,
    seat: &Seat,
    coach: &Coach,
    group: &PassengerGroup,
    segment: Segment,
) -> CoreResult<i64> {
    let from_km = route
        .km_at(segment.from_stop)
        .ok_or_else(|| CoreError::Validation(format!("unknown stop index {}", segment.from_stop)))?;
    let to_km = route
        .km_at(segment.to_stop)
        .ok_or_else(|| CoreError::Validation(format!("unknown stop index {}", segment.to_stop)))?;
    Ok(seat_price(&PriceInputs {
        from_km,
        to_km,
        per_km_rate: route.per_km_rate,
        station_fee: route.station_fee,
        coach_multiplier: coach.multiplier,
        tier_multiplier: coach.tier_multiplier(seat.tier),
        discount_rate: group.discount_rate,
    }))
}

fn check_segment(route: &Route, segment: Segment) -> CoreResult<()> {
    if segment.from_stop >= segment.to_stop {
        return Err(CoreError::Validation(
            "segment must run from an earlier stop to a later one".into(),
        ));
    }
    if route.km_at(segment.from_stop).is_none() || route.km_at(segment.to_stop).is_none() {
        return Err(CoreError::Validation(
            "segment references a stop outside the route".into(),
        ));
    }
    Ok(())
}

fn store_err(e: StoreError) -> CoreError {
    match e.downcast::<CoreError>() {
        Ok(core) => *core,
        Err(e) => CoreError::Infra(e.to_string()),
    }
}
