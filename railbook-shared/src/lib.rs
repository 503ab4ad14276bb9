pub mod code;
pub mod models;
pub mod pii;

pub use models::events::{SeatLockEvent, SeatLockKind};
