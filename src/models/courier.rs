use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourierStatus {
    Available,
    Busy,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierAvailability {
    pub courier_id: Uuid,
    pub status: CourierStatus,
    pub location: Option<GeoPoint>,
    pub updated_at: DateTime<Utc>,
}

impl CourierAvailability {
    pub fn new(courier_id: Uuid) -> Self {
        Self {
            courier_id,
            status: CourierStatus::Available,
            location: None,
            updated_at: Utc::now(),
        }
    }
}
