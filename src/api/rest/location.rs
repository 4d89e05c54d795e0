use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::extract::{AppJson, AppPath, AppQuery};
use crate::engine::{lifecycle, location};
use crate::error::AppError;
use crate::models::courier::{CourierAvailability, CourierStatus};
use crate::models::position::PositionRecord;
use crate::models::user::Actor;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/location/update", post(report_position))
        .route("/location/current", get(courier_availability))
        .route("/location/availability", patch(set_availability))
        .route("/orders/:id/location", get(current_position))
        .route("/orders/:id/location/history", get(position_history))
}

#[derive(Deserialize)]
pub struct ReportPositionRequest {
    pub order_id: Uuid,
    /// Defaults to the caller. Anything else is rejected by the guard.
    pub courier_id: Option<Uuid>,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub status: CourierStatus,
}

async fn report_position(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppJson(payload): AppJson<ReportPositionRequest>,
) -> Result<Json<PositionRecord>, AppError> {
    let report = location::PositionReport {
        order_id: payload.order_id,
        courier_id: payload.courier_id.unwrap_or(actor.id),
        lat: payload.latitude,
        lon: payload.longitude,
        timestamp: payload.timestamp,
    };

    location::report_position(&state, &actor, report).map(Json)
}

async fn current_position(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<PositionRecord>, AppError> {
    location::current_position(&state, &actor, id).map(Json)
}

async fn position_history(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppPath(id): AppPath<Uuid>,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> Result<Json<Vec<PositionRecord>>, AppError> {
    location::history(&state, &actor, id, query.limit).map(Json)
}

async fn courier_availability(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<CourierAvailability>, AppError> {
    location::courier_availability(&state, &actor).map(Json)
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    AppJson(payload): AppJson<AvailabilityRequest>,
) -> Result<Json<CourierAvailability>, AppError> {
    lifecycle::set_availability(&state, &actor, payload.status).map(Json)
}
