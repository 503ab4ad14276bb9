pub mod expiry;
pub mod gateway;
pub mod locks;
pub mod manager;
pub mod models;
pub mod saga;
pub mod wallet;

pub use expiry::ExpiryWorker;
pub use gateway::{CallbackAck, GatewayCallbackHandler, GatewayConfig, GatewaySigner};
pub use locks::SeatLockCoordinator;
pub use manager::BookingManager;
pub use saga::Saga;
pub use wallet::WalletService;
