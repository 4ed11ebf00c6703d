use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{CreateRestaurantRequest, UpdateRestaurantRequest};
use super::repo_types::Restaurant;
use super::services::{create_restaurant, update_restaurant};
use crate::{auth::AuthUser, error::AppError, state::AppState};

pub fn restaurant_routes() -> Router<AppState> {
    Router::new()
        .route("/restaurants", post(create))
        .route("/restaurants/mine", get(list_mine))
        .route("/restaurants/:id", get(get_one).patch(update))
}

#[instrument(skip(state, payload))]
pub async fn create(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<CreateRestaurantRequest>,
) -> Result<(StatusCode, Json<Restaurant>), AppError> {
    let restaurant = create_restaurant(
        state.users.as_ref(),
        state.restaurants.as_ref(),
        caller.id,
        payload,
    )
    .await?;
    info!(restaurant_id = %restaurant.id, owner_id = %caller.id, "restaurant created");
    Ok((StatusCode::CREATED, Json(restaurant)))
}

#[instrument(skip(state))]
pub async fn list_mine(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<Restaurant>>, AppError> {
    Ok(Json(state.restaurants.list_by_owner(caller.id).await?))
}

#[instrument(skip(state))]
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Restaurant>, AppError> {
    state
        .restaurants
        .get(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("restaurant"))
}

#[instrument(skip(state, payload))]
pub async fn update(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRestaurantRequest>,
) -> Result<Json<Restaurant>, AppError> {
    let restaurant = update_restaurant(state.restaurants.as_ref(), id, caller.id, payload).await?;
    info!(restaurant_id = %restaurant.id, "restaurant updated");
    Ok(Json(restaurant))
}
