use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::extract::AppJson;
use crate::auth::guard::{authorize, Operation};
use crate::auth::identity;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::courier::CourierStatus;
use crate::models::user::{Actor, Role, User};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(register_user))
        .route("/users/vendors", get(list_vendors))
        .route("/users/couriers", get(list_couriers))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub role: Role,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize)]
pub struct CourierSummary {
    pub id: Uuid,
    pub name: String,
    pub status: CourierStatus,
    pub location: Option<GeoPoint>,
}

async fn register_user(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let (user, token) = identity::register(&state, &payload.name, payload.role)?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { token, user })))
}

async fn list_vendors(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<User>>, AppError> {
    authorize(&actor, Operation::ListVendors)?;

    let vendors = state
        .users
        .iter()
        .filter(|entry| entry.role == Role::Vendor)
        .map(|entry| entry.value().clone())
        .collect();

    Ok(Json(vendors))
}

async fn list_couriers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<CourierSummary>>, AppError> {
    authorize(&actor, Operation::ListCouriers)?;

    let couriers = state
        .couriers
        .iter()
        .filter_map(|entry| {
            let availability = entry.value();
            let user = state.users.get(&availability.courier_id)?;

            Some(CourierSummary {
                id: availability.courier_id,
                name: user.name.clone(),
                status: availability.status,
                location: availability.location,
            })
        })
        .collect();

    Ok(Json(couriers))
}
