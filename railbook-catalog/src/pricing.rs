use serde::{Deserialize, Serialize};

/// Inputs for one seat-price computation. Assembled identically by the
/// booking-creation, passenger-update, and read-time estimation call sites
/// so that all three produce byte-identical numbers for identical inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceInputs {
    pub from_km: f64,
    pub to_km: f64,
    pub per_km_rate: f64,
    pub station_fee: i64,
    pub coach_multiplier: f64,
    pub tier_multiplier: f64,
    /// In [0, 1); omitted upstream means 0.
    pub discount_rate: f64,
}

/// Pure price function:
/// `round((station_fee + |to - from| * rate * coach * tier) * (1 - discount))`
/// rounded to the nearest whole currency unit, half away from zero.
pub fn seat_price(inputs: &PriceInputs) -> i64 {
    let distance = (inputs.to_km - inputs.from_km).abs();
    let base = distance * inputs.per_km_rate * inputs.coach_multiplier * inputs.tier_multiplier;
    let subtotal = inputs.station_fee as f64 + base;
    (subtotal * (1.0 - inputs.discount_rate)).round() as i64
}
