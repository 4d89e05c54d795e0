use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use super::extract::{AppJson, AppPath};
use crate::auth::guard::{authorize, Operation};
use crate::engine::{lifecycle, location};
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus, OrderTracking};
use crate::models::user::{Actor, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/track", get(track_order))
        .route("/orders/:id/assign", post(assign_courier))
        .route("/orders/:id/status", put(update_status))
}

/// Vendors name the customer, customers name the vendor.
#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct AssignCourierRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppJson(payload): AppJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    authorize(&actor, Operation::CreateOrder)?;

    let (counterparty, field) = if actor.role == Role::Vendor {
        (payload.customer_id, "customer_id")
    } else {
        (payload.vendor_id, "vendor_id")
    };
    let counterparty =
        counterparty.ok_or_else(|| AppError::Validation(format!("{field} is required")))?;

    let order = lifecycle::create_order(&state, &actor, counterparty)?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(State(state): State<Arc<AppState>>, actor: Actor) -> Json<Vec<Order>> {
    Json(lifecycle::list_orders(&state, &actor))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Order>, AppError> {
    lifecycle::get_order(&state, &actor, id).map(Json)
}

async fn track_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<OrderTracking>, AppError> {
    location::track_order(&state, &actor, id).map(Json)
}

async fn assign_courier(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<AssignCourierRequest>,
) -> Result<Json<Order>, AppError> {
    lifecycle::assign_courier(&state, &actor, id, payload.courier_id).map(Json)
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    lifecycle::update_status(&state, &actor, id, payload.status).map(Json)
}
