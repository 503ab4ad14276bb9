use serde::{Deserialize, Serialize};
use uuid::Uuid;

use railbook_core::booking::{Booking, Segment};
use railbook_shared::pii::Masked;

/// One passenger as submitted by the client. `document` travels through the
/// PII mask so a logged request never prints the CCCD.
#[derive(Debug, Clone, Deserialize)]
pub struct PassengerSpec {
    pub full_name: String,
    pub document: Option<Masked<String>>,
    pub group_id: Uuid,
    pub seat_id: Uuid,
}

/// Two-phase creation, step 1: claim seats, no passengers yet.
#[derive(Debug, Deserialize)]
pub struct InitBookingRequest {
    pub trip_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub segment: Segment,
    /// From the authenticated caller; None for guest checkout.
    pub user_id: Option<Uuid>,
}

/// Two-phase creation, step 2: passenger details for an existing booking.
#[derive(Debug, Deserialize)]
pub struct UpdatePassengersRequest {
    pub code: String,
    pub passengers: Vec<PassengerSpec>,
    pub client_ip: String,
}

/// Single-phase (legacy/guest) creation: seats and passengers together.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub trip_id: Uuid,
    pub segment: Segment,
    pub passengers: Vec<PassengerSpec>,
    pub user_id: Option<Uuid>,
    pub client_ip: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentInitResponse {
    pub booking: Booking,
    pub pay_url: String,
}
