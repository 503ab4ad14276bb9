use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use railbook_core::repository::{SeatLockCache, StoreError};

/// Redis-backed held-seat sets, one set per trip, with a whole-set TTL
/// refreshed on every add. The lease is deliberately coarse: a lock may
/// expire slightly before or after the owning booking does, and the store's
/// ticket uniqueness constraint remains the authority.
#[derive(Clone)]
pub struct RedisSeatLocks {
    client: redis::Client,
}

impl RedisSeatLocks {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    fn key(trip_id: Uuid) -> String {
        format!("trip:{}:held", trip_id)
    }
}

#[async_trait]
impl SeatLockCache for RedisSeatLocks {
    async fn add(
        &self,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        ttl: Duration,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SADD one by one inside Lua so we learn exactly which members were
        // newly added (the delta we broadcast), then refresh the set TTL.
        let script = redis::Script::new(
            r#"
            local added = {}
            for i = 2, #ARGV do
                if redis.call("SADD", KEYS[1], ARGV[i]) == 1 then
                    table.insert(added, ARGV[i])
                end
            end
            if redis.call("EXISTS", KEYS[1]) == 1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end
            return added
        "#,
        );

        let mut invocation = script.key(Self::key(trip_id));
        invocation.arg(ttl.as_secs());
        for id in seat_ids {
            invocation.arg(id.to_string());
        }
        let added: Vec<String> = invocation.invoke_async(&mut conn).await?;

        info!(trip_id = %trip_id, added = added.len(), "seat locks added");
        Ok(added.iter().filter_map(|s| Uuid::parse_str(s).ok()).collect())
    }

    async fn remove(&self, trip_id: Uuid, seat_ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let script = redis::Script::new(
            r#"
            local removed = {}
            for i = 1, #ARGV do
                if redis.call("SREM", KEYS[1], ARGV[i]) == 1 then
                    table.insert(removed, ARGV[i])
                end
            end
            return removed
        "#,
        );

        let mut invocation = script.key(Self::key(trip_id));
        for id in seat_ids {
            invocation.arg(id.to_string());
        }
        let removed: Vec<String> = invocation.invoke_async(&mut conn).await?;

        info!(trip_id = %trip_id, removed = removed.len(), "seat locks released");
        Ok(removed
            .iter()
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect())
    }

    async fn members(&self, trip_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let members: Vec<String> = conn.smembers(Self::key(trip_id)).await?;
        Ok(members
            .iter()
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect())
    }
}
