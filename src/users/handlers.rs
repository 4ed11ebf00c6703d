use axum::{extract::State, routing::get, Json, Router};
use tracing::{info, instrument};

use super::dto::UpdateProfileRequest;
use super::repo_types::{Profile, User};
use super::services::{load_profile, save_profile};
use crate::{auth::AuthUser, error::AppError, state::AppState};

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).put(put_me))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(load_profile(state.users.as_ref(), &caller).await?))
}

#[instrument(skip(state, payload))]
pub async fn put_me(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<User>, AppError> {
    let user = save_profile(
        state.users.as_ref(),
        &caller,
        &payload.display_name,
        payload.phone,
        payload.role,
    )
    .await?;
    info!(user_id = %user.id, role = ?user.role, "profile saved");
    Ok(Json(user))
}
