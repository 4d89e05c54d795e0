//! One connected client.
//!
//! A [`Session`] is owned by the task driving its socket and passed to every
//! handler; there is no process-wide connection registry beyond the rooms it
//! joins. Memberships live only as long as the session: [`Session::close`]
//! drops all of them and a reconnecting client starts from scratch.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::guard::{authorize, Operation};
use crate::auth::identity;
use crate::engine::lifecycle;
use crate::engine::location::{self, PositionReport};
use crate::error::AppError;
use crate::models::events::{ClientEvent, ServerEvent};
use crate::models::user::Actor;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticated(Actor),
    Closed,
}

pub struct Session {
    id: Uuid,
    state: SessionState,
    rooms: HashSet<Uuid>,
    outbound: mpsc::Sender<ServerEvent>,
}

impl Session {
    pub fn new(outbound: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Connecting,
            rooms: HashSet::new(),
            outbound,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_member(&self, order_id: Uuid) -> bool {
        self.rooms.contains(&order_id)
    }

    pub fn authenticate(&mut self, actor: Actor) -> Result<(), AppError> {
        match self.state {
            SessionState::Connecting => {
                self.state = SessionState::Authenticated(actor);
                info!(session_id = %self.id, user_id = %actor.id, "session authenticated");
                Ok(())
            }
            SessionState::Authenticated(_) => Err(AppError::Conflict(
                "session is already authenticated".to_string(),
            )),
            SessionState::Closed => Err(AppError::Unauthorized),
        }
    }

    pub fn actor(&self) -> Result<Actor, AppError> {
        match self.state {
            SessionState::Authenticated(actor) => Ok(actor),
            SessionState::Connecting | SessionState::Closed => Err(AppError::Unauthorized),
        }
    }

    /// Admits the session to the order's room and pushes an `order-data`
    /// snapshot. The order row stays read-locked until the snapshot is queued,
    /// so no `order-updated` for this order can overtake it.
    pub fn join(&mut self, app: &AppState, order_id: Uuid) -> Result<(), AppError> {
        let actor = self.actor()?;

        let order = app
            .orders
            .get(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        authorize(&actor, Operation::ViewOrder(order.value()))?;

        app.rooms.join(order_id, self.id, self.outbound.clone());
        self.rooms.insert(order_id);
        self.push(ServerEvent::OrderData(order.value().clone()));
        drop(order);

        info!(session_id = %self.id, order_id = %order_id, "joined order room");
        Ok(())
    }

    /// Leaving a room that was never joined is a no-op.
    pub fn leave(&mut self, app: &AppState, order_id: Uuid) {
        if self.rooms.remove(&order_id) {
            app.rooms.leave(order_id, self.id);
            info!(session_id = %self.id, order_id = %order_id, "left order room");
        }
    }

    pub fn close(&mut self, app: &AppState) {
        for order_id in self.rooms.drain() {
            app.rooms.leave(order_id, self.id);
        }
        self.state = SessionState::Closed;
    }

    pub fn handle(&mut self, app: &AppState, event: ClientEvent) -> Result<(), AppError> {
        match event {
            ClientEvent::Authenticate { token } => {
                let actor = identity::authenticate(app, &token)?;
                self.authenticate(actor)
            }
            ClientEvent::JoinOrderRoom { order_id } => self.join(app, order_id),
            ClientEvent::LeaveOrderRoom { order_id } => {
                self.actor()?;
                self.leave(app, order_id);
                Ok(())
            }
            ClientEvent::UpdateLocation {
                order_id,
                latitude,
                longitude,
                timestamp,
            } => {
                let actor = self.actor()?;
                let report = PositionReport {
                    order_id,
                    courier_id: actor.id,
                    lat: latitude,
                    lon: longitude,
                    timestamp,
                };
                location::report_position(app, &actor, report).map(|_| ())
            }
            ClientEvent::UpdateOrderStatus { order_id, status } => {
                let actor = self.actor()?;
                lifecycle::update_status(app, &actor, order_id, status).map(|_| ())
            }
        }
    }

    /// Failures go back to this session only, never to a room.
    pub fn report_error(&self, err: &AppError) {
        self.push(ServerEvent::Error {
            message: err.public_message(),
        });
    }

    fn push(&self, event: ServerEvent) {
        if let Err(err) = self.outbound.try_send(event) {
            warn!(session_id = %self.id, error = %err, "dropping event for session");
        }
    }
}
