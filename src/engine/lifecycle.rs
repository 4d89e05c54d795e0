//! Order lifecycle: creation, courier assignment and status transitions.
//!
//! Every mutation takes the order's row lock (`DashMap::get_mut`), checks the
//! guard and the transition against the row as it is right now, writes, and
//! publishes `order-updated` before releasing the row. Publishing under the
//! row lock keeps room events in the same order as the writes.
//!
//! Lock order: orders, then couriers, then rooms.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::guard::{authorize, Operation};
use crate::error::AppError;
use crate::models::courier::{CourierAvailability, CourierStatus};
use crate::models::events::ServerEvent;
use crate::models::order::{Order, OrderStatus};
use crate::models::user::{Actor, Role};
use crate::state::AppState;

fn order_not_found(order_id: Uuid) -> AppError {
    AppError::NotFound(format!("order {order_id} not found"))
}

pub fn create_order(
    state: &AppState,
    actor: &Actor,
    counterparty_id: Uuid,
) -> Result<Order, AppError> {
    authorize(actor, Operation::CreateOrder)?;

    // Past the guard the actor is a vendor or a customer.
    let (vendor_id, customer_id, counterparty_role) = if actor.role == Role::Vendor {
        (actor.id, counterparty_id, Role::Customer)
    } else {
        (counterparty_id, actor.id, Role::Vendor)
    };

    let counterparty_exists = state
        .users
        .get(&counterparty_id)
        .is_some_and(|user| user.role == counterparty_role);
    if !counterparty_exists {
        return Err(AppError::NotFound(format!(
            "{counterparty_role:?} {counterparty_id} not found"
        )));
    }

    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        order_number: state.next_order_number(),
        status: OrderStatus::Pending,
        vendor_id,
        customer_id,
        courier_id: None,
        created_at: now,
        updated_at: now,
    };

    state.orders.insert(order.id, order.clone());
    state
        .metrics
        .order_transitions_total
        .with_label_values(&[order.status.as_str()])
        .inc();

    info!(
        order_id = %order.id,
        order_number = %order.order_number,
        vendor_id = %vendor_id,
        customer_id = %customer_id,
        "order created"
    );

    Ok(order)
}

pub fn assign_courier(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    courier_id: Uuid,
) -> Result<Order, AppError> {
    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| order_not_found(order_id))?;

    authorize(actor, Operation::AssignCourier(order.value()))?;

    if order.status != OrderStatus::Pending {
        return Err(AppError::Conflict(format!(
            "order {order_id} is {}, expected PENDING",
            order.status
        )));
    }

    claim_courier(state, courier_id)?;

    order.status = OrderStatus::Assigned;
    order.courier_id = Some(courier_id);
    order.updated_at = Utc::now();
    let updated = order.value().clone();

    record_transition(state, &updated);
    drop(order);

    info!(order_id = %order_id, courier_id = %courier_id, "courier assigned");
    Ok(updated)
}

pub fn update_status(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    next: OrderStatus,
) -> Result<Order, AppError> {
    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| order_not_found(order_id))?;

    authorize(actor, Operation::UpdateStatus(order.value()))?;

    let current = order.status;
    if !current.can_transition_to(next) {
        return Err(AppError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }

    if next == OrderStatus::Assigned {
        return Err(AppError::Conflict(
            "an order becomes ASSIGNED only through courier assignment".to_string(),
        ));
    }

    order.status = next;
    order.updated_at = Utc::now();

    if next.is_terminal() {
        if let Some(courier_id) = order.courier_id {
            release_courier(state, courier_id);
        }
    }

    let updated = order.value().clone();
    record_transition(state, &updated);
    drop(order);

    info!(
        order_id = %order_id,
        from = %current,
        to = %next,
        actor_id = %actor.id,
        "order status updated"
    );
    Ok(updated)
}

pub fn get_order(state: &AppState, actor: &Actor, order_id: Uuid) -> Result<Order, AppError> {
    let order = state
        .orders
        .get(&order_id)
        .ok_or_else(|| order_not_found(order_id))?;

    authorize(actor, Operation::ViewOrder(order.value()))?;
    Ok(order.value().clone())
}

/// Orders the actor takes part in, newest first.
pub fn list_orders(state: &AppState, actor: &Actor) -> Vec<Order> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| authorize(actor, Operation::ViewOrder(entry.value())).is_ok())
        .map(|entry| entry.value().clone())
        .collect();

    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

/// A courier switching themselves between `Available` and `Offline`.
pub fn set_availability(
    state: &AppState,
    actor: &Actor,
    status: CourierStatus,
) -> Result<CourierAvailability, AppError> {
    authorize(actor, Operation::ManageAvailability)?;

    if status == CourierStatus::Busy {
        return Err(AppError::Validation(
            "BUSY is set by order assignment only".to_string(),
        ));
    }

    let mut courier = state
        .couriers
        .get_mut(&actor.id)
        .ok_or_else(|| AppError::NotFound(format!("courier {} not found", actor.id)))?;

    if courier.status == CourierStatus::Busy {
        return Err(AppError::Conflict(
            "courier is on an active delivery".to_string(),
        ));
    }

    courier.status = status;
    courier.updated_at = Utc::now();

    info!(courier_id = %actor.id, status = ?status, "courier availability changed");
    Ok(courier.value().clone())
}

fn claim_courier(state: &AppState, courier_id: Uuid) -> Result<(), AppError> {
    let unavailable =
        || AppError::NotFound(format!("courier {courier_id} not found or not available"));

    let mut courier = state.couriers.get_mut(&courier_id).ok_or_else(unavailable)?;
    if courier.status != CourierStatus::Available {
        return Err(unavailable());
    }

    courier.status = CourierStatus::Busy;
    courier.updated_at = Utc::now();
    Ok(())
}

fn release_courier(state: &AppState, courier_id: Uuid) {
    if let Some(mut courier) = state.couriers.get_mut(&courier_id) {
        if courier.status == CourierStatus::Busy {
            courier.status = CourierStatus::Available;
            courier.updated_at = Utc::now();
            debug!(courier_id = %courier_id, "courier released");
        }
    }
}

fn record_transition(state: &AppState, order: &Order) {
    state
        .metrics
        .order_transitions_total
        .with_label_values(&[order.status.as_str()])
        .inc();

    state
        .rooms
        .publish(order.id, ServerEvent::OrderUpdated(order.clone()));
}
