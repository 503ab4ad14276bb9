//! End-to-end flows over the in-memory store: two-phase booking through
//! gateway confirmation, wallet payment with compensation, expiry, and the
//! top-up callback paths.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use railbook_catalog::{
    Coach, PassengerGroup, Route, RouteStop, Seat, SeatStatus, Trip, TripStatus,
};
use railbook_core::booking::{BookingDraft, BookingStatus, Segment};
use railbook_core::payment::{TransactionStatus, TransactionType};
use railbook_core::repository::WalletStore;
use railbook_core::CoreError;
use railbook_order::{
    BookingManager, CallbackAck, ExpiryWorker, GatewayCallbackHandler, GatewayConfig,
    GatewaySigner, SeatLockCoordinator, WalletService,
};
use railbook_order::models::{InitBookingRequest, PassengerSpec, UpdatePassengersRequest};
use railbook_shared::pii::Masked;
use railbook_store::{BroadcastPublisher, InMemorySeatLocks, InMemoryStore, TokioDelayQueue};

const ADULT_CCCD: &str = "001203012345"; // born 2003
const IP: &str = "203.0.113.7";

struct Fixture {
    store: Arc<InMemoryStore>,
    locks: Arc<SeatLockCoordinator>,
    manager: Arc<BookingManager>,
    wallet: Arc<WalletService>,
    handler: GatewayCallbackHandler,
    signer: Arc<GatewaySigner>,
    queue_rx: tokio::sync::mpsc::UnboundedReceiver<String>,
    trip: Trip,
    seats: Vec<Seat>,
    adult: PassengerGroup,
    child: PassengerGroup,
}

/// Catalog seeded so that a full-route adult ticket costs exactly 110 000:
/// 100 km at 1 000/km with 1.0 multipliers plus a 10 000 station fee.
fn fixture(hold: Duration, lease: Duration) -> Fixture {
    let store = Arc::new(InMemoryStore::new());

    let train_id = Uuid::new_v4();
    let route = Route {
        id: Uuid::new_v4(),
        name: "SG-NT".into(),
        per_km_rate: 1000.0,
        station_fee: 10_000,
        duration_minutes: 480,
        turnaround_minutes: 60,
        stops: vec![
            RouteStop {
                station_id: Uuid::new_v4(),
                order: 0,
                km: 0.0,
            },
            RouteStop {
                station_id: Uuid::new_v4(),
                order: 1,
                km: 100.0,
            },
        ],
    };
    let trip = Trip {
        id: Uuid::new_v4(),
        train_id,
        route_id: route.id,
        departure: Utc::now() + ChronoDuration::days(7),
        status: TripStatus::Scheduled,
    };
    let coach = Coach {
        id: Uuid::new_v4(),
        train_id,
        name: "C1".into(),
        multiplier: 1.0,
        tier_multipliers: HashMap::new(),
    };
    let seats: Vec<Seat> = (0..4)
        .map(|row| Seat {
            id: Uuid::new_v4(),
            coach_id: coach.id,
            row,
            col: 0,
            tier: 1,
            status: SeatStatus::Available,
        })
        .collect();
    let adult = PassengerGroup {
        id: Uuid::new_v4(),
        name: "Adult".into(),
        min_age: Some(12),
        max_age: None,
        discount_rate: 0.0,
        requires_document: true,
    };
    let child = PassengerGroup {
        id: Uuid::new_v4(),
        name: "Child".into(),
        min_age: None,
        max_age: Some(11),
        discount_rate: 0.25,
        requires_document: false,
    };

    store.add_route(route);
    store.add_trip(trip.clone());
    store.add_coach(coach);
    for seat in &seats {
        store.add_seat(seat.clone());
    }
    store.add_group(adult.clone());
    store.add_group(child.clone());

    let signer = Arc::new(GatewaySigner::new(GatewayConfig {
        version: "2.1.0".into(),
        merchant_code: "RAILBOOK".into(),
        hash_secret: "integration-secret".into(),
        pay_url: "https://sandbox.gateway.test/paymentv2/vpcpay.html".into(),
        return_url: "https://railbook.test/payment/return".into(),
        locale: "vn".into(),
        currency: "VND".into(),
    }));
    let locks = Arc::new(SeatLockCoordinator::new(
        Arc::new(InMemorySeatLocks::new()),
        Arc::new(BroadcastPublisher::new(64)),
        lease,
    ));
    let (queue, queue_rx) = TokioDelayQueue::new();
    let manager = Arc::new(BookingManager::new(
        store.clone(),
        store.clone(),
        locks.clone(),
        Arc::new(queue),
        signer.clone(),
        hold,
    ));
    let wallet = Arc::new(WalletService::new(
        store.clone(),
        store.clone(),
        manager.clone(),
        signer.clone(),
    ));
    let handler = GatewayCallbackHandler::new(
        signer.clone(),
        store.clone(),
        store.clone(),
        manager.clone(),
        wallet.clone(),
    );

    Fixture {
        store,
        locks,
        manager,
        wallet,
        handler,
        signer,
        queue_rx,
        trip,
        seats,
        adult,
        child,
    }
}

fn spec(name: &str, doc: Option<&str>, group: &PassengerGroup, seat: &Seat) -> PassengerSpec {
    PassengerSpec {
        full_name: name.into(),
        document: doc.map(|d| Masked(d.to_string())),
        group_id: group.id,
        seat_id: seat.id,
    }
}

/// A signed success (or failure) callback as the gateway would send it.
fn callback_params(
    signer: &GatewaySigner,
    txn_ref: &str,
    amount: i64,
    response_code: &str,
) -> std::collections::BTreeMap<String, String> {
    let mut params = signer.build_params(
        txn_ref,
        amount,
        "callback",
        "other",
        IP,
        None,
        Utc::now(),
    );
    params.insert("vnp_ResponseCode".into(), response_code.into());
    params.insert("vnp_TransactionNo".into(), "14226112".into());
    let sig = signer.sign_params(&params);
    params.insert("vnp_SecureHash".into(), sig);
    params
}

#[tokio::test]
async fn two_phase_booking_paid_via_gateway() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let segment = Segment::new(0, 1);

    let booking = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id, fx.seats[1].id],
            segment,
            user_id: None,
        })
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.total_price, 0);
    assert_eq!(fx.locks.query(fx.trip.id).await.unwrap().len(), 2);

    let priced = fx
        .manager
        .update_passengers(UpdatePassengersRequest {
            code: booking.code.clone(),
            passengers: vec![
                spec("An Nguyen", Some(ADULT_CCCD), &fx.adult, &fx.seats[0]),
                spec("Bin Nguyen", None, &fx.child, &fx.seats[1]),
            ],
            client_ip: IP.into(),
        })
        .await
        .unwrap();
    // 110 000 adult + 82 500 child (25% off).
    assert_eq!(priced.booking.total_price, 192_500);
    assert!(priced.pay_url.contains(&booking.code));
    assert!(priced.pay_url.contains("vnp_SecureHash="));

    let params = callback_params(&fx.signer, &booking.code, 192_500, "00");
    assert_eq!(fx.handler.handle(&params).await, CallbackAck::OK);

    let paid = fx.manager.get_by_code(&booking.code).await.unwrap();
    assert_eq!(paid.status, BookingStatus::Paid);
    assert!(matches!(paid.draft, BookingDraft::Empty));
    let tickets = fx.manager.tickets_for_booking(&booking.code).await.unwrap();
    assert_eq!(tickets.len(), 2);
    assert_eq!(tickets.iter().map(|t| t.price).sum::<i64>(), 192_500);
    // Tickets issued, advisory locks gone.
    assert!(fx.locks.query(fx.trip.id).await.unwrap().is_empty());

    // Duplicate callback: already confirmed, nothing changes.
    assert_eq!(fx.handler.handle(&params).await, CallbackAck::OK);
    assert_eq!(
        fx.manager
            .tickets_for_booking(&booking.code)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn tampered_callback_leaves_booking_pending() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let booking = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment: Segment::new(0, 1),
            user_id: None,
        })
        .await
        .unwrap();
    fx.manager
        .update_passengers(UpdatePassengersRequest {
            code: booking.code.clone(),
            passengers: vec![spec("An Nguyen", Some(ADULT_CCCD), &fx.adult, &fx.seats[0])],
            client_ip: IP.into(),
        })
        .await
        .unwrap();

    let mut params = callback_params(&fx.signer, &booking.code, 110_000, "00");
    params.insert("vnp_Amount".into(), "100".into());
    assert_eq!(
        fx.handler.handle(&params).await,
        CallbackAck::INVALID_SIGNATURE
    );

    // A verified gateway failure is acknowledged but changes nothing either.
    let failure = callback_params(&fx.signer, &booking.code, 110_000, "24");
    assert_eq!(fx.handler.handle(&failure).await, CallbackAck::OK);

    let after = fx.manager.get_by_code(&booking.code).await.unwrap();
    assert_eq!(after.status, BookingStatus::Pending);
    assert!(fx
        .manager
        .tickets_for_booking(&booking.code)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn passenger_update_is_rejected_once_paid() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let booking = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment: Segment::new(0, 1),
            user_id: None,
        })
        .await
        .unwrap();
    fx.manager
        .update_passengers(UpdatePassengersRequest {
            code: booking.code.clone(),
            passengers: vec![spec("An Nguyen", Some(ADULT_CCCD), &fx.adult, &fx.seats[0])],
            client_ip: IP.into(),
        })
        .await
        .unwrap();
    fx.manager.confirm(&booking.code).await.unwrap();

    // A rename arriving after confirmation must bounce off the terminal
    // state, not resurrect a PENDING draft over the issued tickets.
    let err = fx
        .manager
        .update_passengers(UpdatePassengersRequest {
            code: booking.code.clone(),
            passengers: vec![spec("Someone Else", Some(ADULT_CCCD), &fx.adult, &fx.seats[0])],
            client_ip: IP.into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let after = fx.manager.get_by_code(&booking.code).await.unwrap();
    assert_eq!(after.status, BookingStatus::Paid);
    assert!(matches!(after.draft, BookingDraft::Empty));
    let tickets = fx.manager.tickets_for_booking(&booking.code).await.unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].passenger_name, "An Nguyen");
}

#[tokio::test]
async fn init_conflicts_on_seats_held_by_another_booking() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let segment = Segment::new(0, 1);

    fx.manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment,
            user_id: None,
        })
        .await
        .unwrap();

    // Second selection overlaps on seats[0]; its partial grab (seats[1])
    // must be given back.
    let err = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id, fx.seats[1].id],
            segment,
            user_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(
        fx.locks.query(fx.trip.id).await.unwrap(),
        vec![fx.seats[0].id]
    );
}

#[tokio::test]
async fn wallet_payment_pays_owned_booking() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let user = Uuid::new_v4();
    fx.store.open_wallet(user, 500_000);
    fx.wallet
        .set_pin(user, None, Masked("123456".into()))
        .await
        .unwrap();

    let booking = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment: Segment::new(0, 1),
            user_id: Some(user),
        })
        .await
        .unwrap();
    fx.manager
        .update_passengers(UpdatePassengersRequest {
            code: booking.code.clone(),
            passengers: vec![spec("An Nguyen", Some(ADULT_CCCD), &fx.adult, &fx.seats[0])],
            client_ip: IP.into(),
        })
        .await
        .unwrap();

    let paid = fx
        .wallet
        .pay_booking(user, &booking.code, Masked("123456".into()))
        .await
        .unwrap();
    assert_eq!(paid.status, BookingStatus::Paid);
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 390_000);

    // Wrong PIN and guest bookings are both refused outright.
    let err = fx
        .wallet
        .pay_booking(user, &booking.code, Masked("654321".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
}

#[tokio::test]
async fn lost_seat_race_refunds_wallet_and_fails_booking() {
    // Leases short enough that both bookings can claim the same seat.
    let fx = fixture(Duration::from_secs(600), Duration::from_millis(50));
    let user = Uuid::new_v4();
    fx.store.open_wallet(user, 500_000);
    fx.wallet
        .set_pin(user, None, Masked("123456".into()))
        .await
        .unwrap();
    let segment = Segment::new(0, 1);

    let winner = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment,
            user_id: None,
        })
        .await
        .unwrap();
    fx.manager
        .update_passengers(UpdatePassengersRequest {
            code: winner.code.clone(),
            passengers: vec![spec("An Nguyen", Some(ADULT_CCCD), &fx.adult, &fx.seats[0])],
            client_ip: IP.into(),
        })
        .await
        .unwrap();

    // The advisory lease lapses; a second booking grabs the same seat.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let loser = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment,
            user_id: Some(user),
        })
        .await
        .unwrap();
    fx.manager
        .update_passengers(UpdatePassengersRequest {
            code: loser.code.clone(),
            passengers: vec![spec("Binh Tran", Some(ADULT_CCCD), &fx.adult, &fx.seats[0])],
            client_ip: IP.into(),
        })
        .await
        .unwrap();

    // The first booking confirms; the ticket uniqueness rule now owns the
    // seat no matter what the locks said.
    fx.manager.confirm(&winner.code).await.unwrap();

    let err = fx
        .wallet
        .pay_booking(user, &loser.code, Masked("123456".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    // Deducted then refunded: balance intact, both legs on the ledger.
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 500_000);
    let ledger = fx.wallet.ledger(user).await.unwrap();
    assert!(ledger
        .iter()
        .any(|t| t.txn_type == TransactionType::Payment && t.amount == -110_000));
    assert!(ledger
        .iter()
        .any(|t| t.txn_type == TransactionType::Refund && t.amount == 110_000));

    let after = fx.manager.get_by_code(&loser.code).await.unwrap();
    assert_eq!(after.status, BookingStatus::PaymentFailed);
}

#[tokio::test]
async fn expired_booking_is_cancelled_and_seats_freed() {
    let fx = fixture(Duration::from_millis(150), Duration::from_millis(150));
    let booking = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment: Segment::new(0, 1),
            user_id: None,
        })
        .await
        .unwrap();

    let worker = ExpiryWorker::new(fx.manager.clone(), 3);
    let handle = tokio::spawn(worker.run(fx.queue_rx));

    tokio::time::sleep(Duration::from_millis(400)).await;
    let after = fx.manager.get_by_code(&booking.code).await.unwrap();
    assert_eq!(after.status, BookingStatus::Cancelled);

    // The seat can be claimed by a fresh booking.
    let again = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment: Segment::new(0, 1),
            user_id: None,
        })
        .await
        .unwrap();
    assert_eq!(again.status, BookingStatus::Pending);
    handle.abort();
}

#[tokio::test]
async fn cancel_enforces_ownership() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let owned = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment: Segment::new(0, 1),
            user_id: Some(owner),
        })
        .await
        .unwrap();

    let err = fx
        .manager
        .cancel(&owned.code, Some(stranger))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
    let err = fx.manager.cancel(&owned.code, None).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let cancelled = fx.manager.cancel(&owned.code, Some(owner)).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(fx.locks.query(fx.trip.id).await.unwrap().is_empty());

    // Guest bookings: the code is the credential.
    let guest = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[1].id],
            segment: Segment::new(0, 1),
            user_id: None,
        })
        .await
        .unwrap();
    let cancelled = fx.manager.cancel(&guest.code, None).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn passenger_validation_rejects_bad_documents() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let booking = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment: Segment::new(0, 1),
            user_id: None,
        })
        .await
        .unwrap();

    // Adult without a document.
    let err = fx
        .manager
        .update_passengers(UpdatePassengersRequest {
            code: booking.code.clone(),
            passengers: vec![spec("An Nguyen", None, &fx.adult, &fx.seats[0])],
            client_ip: IP.into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    // Adult with a child's birth year (2020: too young for the group).
    let err = fx
        .manager
        .update_passengers(UpdatePassengersRequest {
            code: booking.code.clone(),
            passengers: vec![spec(
                "An Nguyen",
                Some("001220012345"),
                &fx.adult,
                &fx.seats[0],
            )],
            client_ip: IP.into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    // A child needs no document at all; the booking still prices.
    let priced = fx
        .manager
        .update_passengers(UpdatePassengersRequest {
            code: booking.code.clone(),
            passengers: vec![spec("Bin Nguyen", None, &fx.child, &fx.seats[0])],
            client_ip: IP.into(),
        })
        .await
        .unwrap();
    assert_eq!(priced.booking.total_price, 82_500);
    let ticketless = priced.booking.draft.seat_ids();
    assert_eq!(ticketless, vec![fx.seats[0].id]);
}

#[tokio::test]
async fn deposit_completes_once_via_callback() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let user = Uuid::new_v4();
    fx.store.open_wallet(user, 0);

    let (txn, pay_url) = fx.wallet.create_deposit(user, 300_000, IP).await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Pending);
    assert!(pay_url.contains(&txn.id.to_string()));
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 0);

    let params = callback_params(&fx.signer, &txn.id.to_string(), 300_000, "00");
    assert_eq!(fx.handler.handle(&params).await, CallbackAck::OK);
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 300_000);

    // Gateway retry: acknowledged as already confirmed, balance unchanged.
    assert_eq!(
        fx.handler.handle(&params).await,
        CallbackAck::ALREADY_CONFIRMED
    );
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 300_000);

    // A signed callback whose amount disagrees with the ledger entry.
    let wrong = callback_params(&fx.signer, &txn.id.to_string(), 999_999, "00");
    assert_eq!(fx.handler.handle(&wrong).await, CallbackAck::INVALID_AMOUNT);

    // Unknown refs are reported, not guessed at.
    let missing = callback_params(&fx.signer, &Uuid::new_v4().to_string(), 300_000, "00");
    assert_eq!(
        fx.handler.handle(&missing).await,
        CallbackAck::ORDER_NOT_FOUND
    );
}

#[tokio::test]
async fn withdraw_settlement_paths() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let user = Uuid::new_v4();
    fx.store.open_wallet(user, 400_000);
    fx.wallet
        .set_pin(user, None, Masked("123456".into()))
        .await
        .unwrap();

    let approved = fx
        .wallet
        .request_withdraw(user, 150_000, Masked("123456".into()))
        .await
        .unwrap();
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 250_000);
    fx.wallet.approve_withdraw(approved.id).await.unwrap();
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 250_000);

    let rejected = fx
        .wallet
        .request_withdraw(user, 100_000, Masked("123456".into()))
        .await
        .unwrap();
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 150_000);
    fx.wallet.reject_withdraw(rejected.id).await.unwrap();
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 250_000);

    // Overdraw is refused without touching the balance.
    let err = fx
        .wallet
        .request_withdraw(user, 1_000_000, Masked("123456".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 250_000);
}

#[tokio::test]
async fn pin_rotation_requires_current_pin() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let user = Uuid::new_v4();
    fx.store.open_wallet(user, 0);

    // Malformed PINs never reach the store.
    let err = fx
        .wallet
        .set_pin(user, None, Masked("12ab56".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(fx.store.pin_hash(user).await.unwrap().is_none());

    fx.wallet
        .set_pin(user, None, Masked("123456".into()))
        .await
        .unwrap();

    let err = fx
        .wallet
        .set_pin(user, None, Masked("654321".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
    let err = fx
        .wallet
        .set_pin(user, Some(Masked("000000".into())), Masked("654321".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    fx.wallet
        .set_pin(user, Some(Masked("123456".into())), Masked("654321".into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn guest_booking_cannot_be_paid_by_wallet() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let user = Uuid::new_v4();
    fx.store.open_wallet(user, 500_000);
    fx.wallet
        .set_pin(user, None, Masked("123456".into()))
        .await
        .unwrap();

    let guest = fx
        .manager
        .init_booking(InitBookingRequest {
            trip_id: fx.trip.id,
            seat_ids: vec![fx.seats[0].id],
            segment: Segment::new(0, 1),
            user_id: None,
        })
        .await
        .unwrap();

    let err = fx
        .wallet
        .pay_booking(user, &guest.code, Masked("123456".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
    assert_eq!(fx.wallet.balance(user).await.unwrap(), 500_000);
}

#[tokio::test]
async fn estimate_matches_booked_price() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));
    let segment = Segment::new(0, 1);

    let adult = fx
        .manager
        .estimate_price(fx.trip.id, fx.seats[0].id, fx.adult.id, segment)
        .await
        .unwrap();
    assert_eq!(adult, 110_000);
    let child = fx
        .manager
        .estimate_price(fx.trip.id, fx.seats[0].id, fx.child.id, segment)
        .await
        .unwrap();
    assert_eq!(child, 82_500);
}

#[tokio::test]
async fn schedule_guard_rejects_overlapping_trip() {
    let fx = fixture(Duration::from_secs(600), Duration::from_secs(600));

    // Occupation window: 480 min travel + 60 min turnaround. A departure
    // inside it conflicts; one after it does not.
    let err = fx
        .manager
        .validate_trip_schedule(
            fx.trip.train_id,
            fx.trip.route_id,
            fx.trip.departure + ChronoDuration::minutes(120),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    fx.manager
        .validate_trip_schedule(
            fx.trip.train_id,
            fx.trip.route_id,
            fx.trip.departure + ChronoDuration::minutes(540),
        )
        .await
        .unwrap();
}
