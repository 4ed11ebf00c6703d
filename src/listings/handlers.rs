use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{CreateListingRequest, DiscoveryQuery, NearbyListing};
use super::repo_types::FoodListing;
use super::services::{
    attach_image, create_listing, discover_available, get_listing, list_for_owner,
};
use crate::{
    auth::AuthUser, error::AppError, images::read_image_field, images::services::presign_image,
    state::AppState,
};

pub fn listing_routes() -> Router<AppState> {
    Router::new()
        .route("/listings", post(create))
        .route("/listings/available", get(list_available))
        .route("/listings/:id", get(get_one))
        .route(
            "/listings/:id/image",
            get(get_image)
                .post(upload_image)
                .layer(DefaultBodyLimit::max(20 * 1024 * 1024)),
        )
        .route("/restaurants/:id/listings", get(list_by_restaurant))
}

#[instrument(skip(state, payload))]
pub async fn create(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(payload): Json<CreateListingRequest>,
) -> Result<(StatusCode, HeaderMap, Json<FoodListing>), AppError> {
    let listing = create_listing(
        state.listings.as_ref(),
        state.restaurants.as_ref(),
        caller.id,
        payload,
        OffsetDateTime::now_utc(),
    )
    .await?;
    info!(listing_id = %listing.id, restaurant_id = %listing.restaurant_id, "listing created");

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/listings/{}", listing.id).parse() {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(listing)))
}

#[instrument(skip(state))]
pub async fn list_available(
    State(state): State<AppState>,
    Query(q): Query<DiscoveryQuery>,
) -> Result<Json<Vec<NearbyListing>>, AppError> {
    let items = discover_available(
        state.listings.as_ref(),
        state.restaurants.as_ref(),
        &q,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(Json(items))
}

#[instrument(skip(state))]
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FoodListing>, AppError> {
    Ok(Json(get_listing(state.listings.as_ref(), id).await?))
}

#[instrument(skip(state))]
pub async fn list_by_restaurant(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(restaurant_id): Path<Uuid>,
) -> Result<Json<Vec<FoodListing>>, AppError> {
    let rows = list_for_owner(
        state.listings.as_ref(),
        state.restaurants.as_ref(),
        restaurant_id,
        caller.id,
    )
    .await?;
    Ok(Json(rows))
}

/// POST /listings/:id/image (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> Result<Json<FoodListing>, AppError> {
    let upload = read_image_field(&mut mp, "file").await?;
    let listing = attach_image(
        state.listings.as_ref(),
        state.restaurants.as_ref(),
        state.storage.as_ref(),
        id,
        caller.id,
        upload,
    )
    .await?;
    info!(listing_id = %listing.id, "listing image stored");
    Ok(Json(listing))
}

/// Temporary redirect to a presigned url of the listing image.
#[instrument(skip(state))]
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let listing = get_listing(state.listings.as_ref(), id).await?;
    let key = listing.image_key.ok_or(AppError::NotFound("listing image"))?;
    let url = presign_image(state.storage.as_ref(), &key).await?;
    Ok(Redirect::temporary(&url))
}
