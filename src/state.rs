use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::rooms::RoomRegistry;
use crate::models::courier::CourierAvailability;
use crate::models::order::Order;
use crate::models::position::PositionRecord;
use crate::models::user::User;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy)]
pub struct HistoryLimits {
    pub default: usize,
    pub max: usize,
}

impl HistoryLimits {
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default).clamp(1, self.max)
    }
}

pub struct AppState {
    pub users: DashMap<Uuid, User>,
    /// Bearer token -> user id.
    pub tokens: DashMap<String, Uuid>,
    pub orders: DashMap<Uuid, Order>,
    pub couriers: DashMap<Uuid, CourierAvailability>,
    /// Keyed by courier id.
    pub latest_positions: DashMap<Uuid, PositionRecord>,
    /// Keyed by order id, in acceptance order.
    pub history: DashMap<Uuid, Vec<PositionRecord>>,
    pub rooms: RoomRegistry,
    pub metrics: Metrics,
    pub session_buffer_size: usize,
    pub history_limits: HistoryLimits,
    order_seq: AtomicU64,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let metrics = Metrics::new();

        Self {
            users: DashMap::new(),
            tokens: DashMap::new(),
            orders: DashMap::new(),
            couriers: DashMap::new(),
            latest_positions: DashMap::new(),
            history: DashMap::new(),
            rooms: RoomRegistry::new(metrics.clone()),
            metrics,
            session_buffer_size: config.session_buffer_size,
            history_limits: HistoryLimits {
                default: config.history_default_limit,
                max: config.history_max_limit,
            },
            order_seq: AtomicU64::new(1),
        }
    }

    pub fn next_order_number(&self) -> String {
        let seq = self.order_seq.fetch_add(1, Ordering::Relaxed);
        format!("ORD-{}-{seq:06}", Utc::now().format("%Y%m%d"))
    }
}
