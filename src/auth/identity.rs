//! Development identity provider.
//!
//! Registration hands out an opaque bearer token; every HTTP request and
//! socket session resolves that token back to an [`Actor`]. Real deployments
//! swap this for their own credential issuer and keep the same [`Actor`]
//! contract.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::CourierAvailability;
use crate::models::user::{Actor, Role, User};
use crate::state::AppState;

pub fn register(state: &AppState, name: &str, role: Role) -> Result<(User, String), AppError> {
    let name = name.trim();
    if name.chars().count() < 2 {
        return Err(AppError::Validation(
            "name must be at least 2 characters".to_string(),
        ));
    }

    let user = User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        role,
        created_at: Utc::now(),
    };

    if role == Role::Courier {
        state
            .couriers
            .insert(user.id, CourierAvailability::new(user.id));
    }

    let token = Uuid::new_v4().simple().to_string();
    state.users.insert(user.id, user.clone());
    state.tokens.insert(token.clone(), user.id);

    info!(user_id = %user.id, role = ?user.role, "user registered");
    Ok((user, token))
}

pub fn authenticate(state: &AppState, token: &str) -> Result<Actor, AppError> {
    let user_id = state
        .tokens
        .get(token)
        .map(|entry| *entry.value())
        .ok_or(AppError::Unauthorized)?;

    state
        .users
        .get(&user_id)
        .map(|user| Actor::from(user.value()))
        .ok_or(AppError::Unauthorized)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(AppError::Unauthorized)?;

        authenticate(state, token)
    }
}
