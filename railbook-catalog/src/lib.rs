pub mod coach;
pub mod groups;
pub mod network;
pub mod pricing;
pub mod repository;
pub mod schedule;

pub use coach::{Coach, Seat, SeatStatus};
pub use groups::PassengerGroup;
pub use network::{Route, RouteStop, Station, Train, Trip, TripStatus};
pub use pricing::{seat_price, PriceInputs};
pub use repository::CatalogStore;
