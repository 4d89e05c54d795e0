//! Frames exchanged over the order-tracking socket.
//!
//! Every frame is `{"event": "<kebab-case name>", "data": {...}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{Order, OrderStatus};
use crate::models::position::LocationUpdate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Initial snapshot pushed to a session right after it joins a room.
    OrderData(Order),
    OrderUpdated(Order),
    LocationUpdated(LocationUpdate),
    /// Only ever sent to the session whose request failed.
    Error { message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderData(_) => "order-data",
            Self::OrderUpdated(_) => "order-updated",
            Self::LocationUpdated(_) => "location-updated",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Authenticate {
        token: String,
    },
    JoinOrderRoom {
        order_id: Uuid,
    },
    LeaveOrderRoom {
        order_id: Uuid,
    },
    UpdateLocation {
        order_id: Uuid,
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    UpdateOrderStatus {
        order_id: Uuid,
        status: OrderStatus,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::{ClientEvent, ServerEvent};

    #[test]
    fn join_frame_parses() {
        let order_id = Uuid::new_v4();
        let frame = json!({ "event": "join-order-room", "data": { "order_id": order_id } });

        let parsed: ClientEvent = serde_json::from_value(frame).unwrap();
        assert!(matches!(parsed, ClientEvent::JoinOrderRoom { order_id: id } if id == order_id));
    }

    #[test]
    fn location_frame_timestamp_is_optional() {
        let frame = json!({
            "event": "update-location",
            "data": { "order_id": Uuid::new_v4(), "latitude": 19.0476, "longitude": 73.0699 }
        });

        let parsed: ClientEvent = serde_json::from_value(frame).unwrap();
        match parsed {
            ClientEvent::UpdateLocation { timestamp, .. } => assert!(timestamp.is_none()),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn error_frame_shape() {
        let event = ServerEvent::Error {
            message: "order not found".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["message"], "order not found");
        assert_eq!(event.name(), "error");
    }
}
