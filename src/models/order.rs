use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::position::PositionRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// A courier is on the road for this order and may report positions.
    pub fn is_active_delivery(self) -> bool {
        matches!(self, Self::Assigned | Self::PickedUp | Self::InTransit)
    }

    /// The forward path plus cancellation from any non-terminal state.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if next == Self::Cancelled {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Self::Pending, Self::Assigned)
                | (Self::Assigned, Self::PickedUp)
                | (Self::PickedUp, Self::InTransit)
                | (Self::InTransit, Self::Delivered)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Assigned => "ASSIGNED",
            Self::PickedUp => "PICKED_UP",
            Self::InTransit => "IN_TRANSIT",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub vendor_id: Uuid,
    pub customer_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order with its courier's current position, `None` until the first report.
#[derive(Debug, Clone, Serialize)]
pub struct OrderTracking {
    pub order: Order,
    pub location: Option<PositionRecord>,
}
