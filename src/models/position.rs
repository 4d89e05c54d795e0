use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One accepted position report. Stored in history and as the courier's
/// latest position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionRecord {
    pub id: Uuid,
    pub courier_id: Uuid,
    pub order_id: Uuid,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationUpdate {
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&PositionRecord> for LocationUpdate {
    fn from(record: &PositionRecord) -> Self {
        Self {
            order_id: record.order_id,
            courier_id: record.courier_id,
            lat: record.lat,
            lon: record.lon,
            timestamp: record.timestamp,
        }
    }
}
