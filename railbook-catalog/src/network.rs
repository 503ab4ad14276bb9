use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub id: Uuid,
    pub name: String,
}

/// One ordered stop on a route, with the cumulative distance from the
/// route's origin. A passenger's travelled segment is priced from the
/// difference of two stops' `km` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub station_id: Uuid,
    pub order: u32,
    pub km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub name: String,
    pub per_km_rate: f64,
    pub station_fee: i64,
    pub duration_minutes: i64,
    pub turnaround_minutes: i64,
    /// Ordered by `order`, origin first.
    pub stops: Vec<RouteStop>,
}

impl Route {
    /// Cumulative distance at a stop index, if the index exists.
    pub fn km_at(&self, stop_index: u32) -> Option<f64> {
        self.stops
            .iter()
            .find(|s| s.order == stop_index)
            .map(|s| s.km)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Train {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Scheduled,
    InProgress,
    Completed,
}

/// An immutable-for-this-core scheduling of a train over a route at a
/// departure time. Status advancement is a collaborator's cron job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub train_id: Uuid,
    pub route_id: Uuid,
    pub departure: DateTime<Utc>,
    pub status: TripStatus,
}
