use async_trait::async_trait;
use uuid::Uuid;

use crate::coach::{Coach, Seat};
use crate::groups::PassengerGroup;
use crate::network::{Route, Trip};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Read port over the catalog CRUD surface (stations, routes, trains,
/// coaches, seats, groups live behind it; their admin CRUD is out of
/// scope for this core).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError>;

    async fn get_route(&self, route_id: Uuid) -> Result<Option<Route>, StoreError>;

    async fn get_seat(&self, seat_id: Uuid) -> Result<Option<Seat>, StoreError>;

    async fn get_coach(&self, coach_id: Uuid) -> Result<Option<Coach>, StoreError>;

    async fn get_group(&self, group_id: Uuid) -> Result<Option<PassengerGroup>, StoreError>;

    /// Existing trips for a train, used by the schedule-overlap guard.
    async fn trips_for_train(&self, train_id: Uuid) -> Result<Vec<Trip>, StoreError>;
}
