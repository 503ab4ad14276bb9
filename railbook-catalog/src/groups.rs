use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named discount tier (adult/student/elderly/child) with an optional
/// age window and a discount rate in [0, 1). Groups that do not require a
/// document (children) are stored with a sentinel `None` document on the
/// draft passenger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassengerGroup {
    pub id: Uuid,
    pub name: String,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub discount_rate: f64,
    pub requires_document: bool,
}

impl PassengerGroup {
    pub fn new(
        name: &str,
        min_age: Option<i32>,
        max_age: Option<i32>,
        discount_rate: f64,
        requires_document: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            min_age,
            max_age,
            discount_rate,
            requires_document,
        }
    }
}
