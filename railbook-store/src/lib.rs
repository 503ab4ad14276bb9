pub mod app_config;
pub mod events;
pub mod memory;
pub mod queue;
pub mod redis_repo;

pub use app_config::{BusinessRules, Config, GatewayConfig};
pub use events::BroadcastPublisher;
pub use memory::{InMemorySeatLocks, InMemoryStore};
pub use queue::TokioDelayQueue;
pub use redis_repo::RedisSeatLocks;
