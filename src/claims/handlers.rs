use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::repo_types::Claim;
use super::services::{authorize_completion, claim_listing, mark_pickup_completed, ClaimOutcome};
use crate::{auth::AuthUser, error::AppError, state::AppState};

pub fn claim_routes() -> Router<AppState> {
    Router::new()
        .route("/listings/:id/claim", post(claim))
        .route("/claims/mine", get(list_mine))
        .route("/claims/:id/complete", post(complete))
}

#[instrument(skip(state))]
pub async fn claim(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<ClaimOutcome>, AppError> {
    let outcome = claim_listing(
        state.listings.as_ref(),
        state.claims.as_ref(),
        listing_id,
        caller.id,
    )
    .await?;
    Ok(Json(outcome))
}

#[instrument(skip(state))]
pub async fn list_mine(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<Claim>>, AppError> {
    Ok(Json(state.claims.list_by_user(caller.id).await?))
}

#[instrument(skip(state))]
pub async fn complete(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(claim_id): Path<Uuid>,
) -> Result<Json<Claim>, AppError> {
    authorize_completion(
        state.claims.as_ref(),
        state.listings.as_ref(),
        state.restaurants.as_ref(),
        claim_id,
        caller.id,
    )
    .await?;
    Ok(Json(mark_pickup_completed(state.claims.as_ref(), claim_id).await?))
}
