//! Order rooms: the set of sessions subscribed to one order.
//!
//! A room maps session ids to that session's outbound queue. Publishing is a
//! non-blocking `try_send` per member, so a slow or vanished session never
//! stalls the writer that triggered the event. Dropped deliveries are counted
//! and logged; subscribers reconcile by fetching the order again.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::events::ServerEvent;
use crate::observability::metrics::Metrics;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct RoomRegistry {
    rooms: DashMap<Uuid, HashMap<Uuid, mpsc::Sender<ServerEvent>>>,
    metrics: Metrics,
}

impl RoomRegistry {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            rooms: DashMap::new(),
            metrics,
        }
    }

    /// Returns `false` when the session was already a member.
    pub fn join(&self, order_id: Uuid, session_id: Uuid, outbound: mpsc::Sender<ServerEvent>) -> bool {
        self.rooms
            .entry(order_id)
            .or_default()
            .insert(session_id, outbound)
            .is_none()
    }

    /// Idempotent. Empty rooms are dropped.
    pub fn leave(&self, order_id: Uuid, session_id: Uuid) -> bool {
        let removed = match self.rooms.get_mut(&order_id) {
            Some(mut room) => room.remove(&session_id).is_some(),
            None => false,
        };

        self.rooms.remove_if(&order_id, |_, room| room.is_empty());
        removed
    }

    pub fn publish(&self, order_id: Uuid, event: ServerEvent) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();

        let Some(room) = self.rooms.get(&order_id) else {
            return outcome;
        };

        for (session_id, outbound) in room.iter() {
            match outbound.try_send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        order_id = %order_id,
                        session_id = %session_id,
                        event = event.name(),
                        "session queue full; dropping event"
                    );
                    outcome.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        order_id = %order_id,
                        session_id = %session_id,
                        "session queue closed; dropping event"
                    );
                    outcome.dropped += 1;
                }
            }
        }
        drop(room);

        self.metrics
            .room_broadcasts_total
            .with_label_values(&[event.name(), "delivered"])
            .inc_by(outcome.delivered as u64);
        self.metrics
            .room_broadcasts_total
            .with_label_values(&[event.name(), "dropped"])
            .inc_by(outcome.dropped as u64);

        outcome
    }

    pub fn members(&self, order_id: Uuid) -> usize {
        self.rooms.get(&order_id).map(|room| room.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::RoomRegistry;
    use crate::models::events::ServerEvent;
    use crate::observability::metrics::Metrics;

    fn ping(message: &str) -> ServerEvent {
        ServerEvent::Error {
            message: message.to_string(),
        }
    }

    #[test]
    fn every_member_receives_each_publish_once() {
        let rooms = RoomRegistry::new(Metrics::new());
        let order_id = Uuid::new_v4();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);

        rooms.join(order_id, Uuid::new_v4(), tx_a);
        rooms.join(order_id, Uuid::new_v4(), tx_b);

        let outcome = rooms.publish(order_id, ping("one"));
        assert_eq!(outcome.delivered, 2);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn rejoining_does_not_duplicate_delivery() {
        let rooms = RoomRegistry::new(Metrics::new());
        let order_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);

        assert!(rooms.join(order_id, session_id, tx.clone()));
        assert!(!rooms.join(order_id, session_id, tx));

        rooms.publish(order_id, ping("once"));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn left_sessions_receive_nothing() {
        let rooms = RoomRegistry::new(Metrics::new());
        let order_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);

        rooms.join(order_id, session_id, tx);
        assert!(rooms.leave(order_id, session_id));
        assert!(!rooms.leave(order_id, session_id));
        assert_eq!(rooms.room_count(), 0);

        let outcome = rooms.publish(order_id, ping("late"));
        assert_eq!(outcome.delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rooms_are_isolated() {
        let rooms = RoomRegistry::new(Metrics::new());
        let (tx, mut rx) = mpsc::channel(8);
        rooms.join(Uuid::new_v4(), Uuid::new_v4(), tx);

        rooms.publish(Uuid::new_v4(), ping("elsewhere"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let rooms = RoomRegistry::new(Metrics::new());
        let order_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(1);
        rooms.join(order_id, Uuid::new_v4(), tx);

        assert_eq!(rooms.publish(order_id, ping("first")).delivered, 1);
        let outcome = rooms.publish(order_id, ping("second"));
        assert_eq!(outcome.dropped, 1);

        match rx.try_recv().unwrap() {
            ServerEvent::Error { message } => assert_eq!(message, "first"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
