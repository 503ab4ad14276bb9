use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Persisted seat status, set by admins. Orthogonal to booking state: an
/// AVAILABLE seat may still be transiently held by a pending booking or
/// permanently consumed by a ticket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Locked,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub row: u32,
    pub col: u32,
    /// Berth tier (1 = lower). Keys the coach's tier multiplier map.
    pub tier: u8,
    pub status: SeatStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coach {
    pub id: Uuid,
    pub train_id: Uuid,
    pub name: String,
    pub multiplier: f64,
    /// Per-tier price multipliers; a missing tier means 1.0.
    pub tier_multipliers: HashMap<u8, f64>,
}

impl Coach {
    pub fn tier_multiplier(&self, tier: u8) -> f64 {
        self.tier_multipliers.get(&tier).copied().unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tier_defaults_to_one() {
        let coach = Coach {
            id: Uuid::new_v4(),
            train_id: Uuid::new_v4(),
            name: "C1".into(),
            multiplier: 1.2,
            tier_multipliers: HashMap::from([(1, 1.1)]),
        };
        assert_eq!(coach.tier_multiplier(1), 1.1);
        assert_eq!(coach.tier_multiplier(3), 1.0);
    }
}
