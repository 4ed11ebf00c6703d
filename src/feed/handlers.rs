use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::{stream, Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser, error::AppError, restaurants::services::get_owned, state::AppState,
};

pub fn stream_routes() -> Router<AppState> {
    Router::new()
        .route("/listings/stream", get(available_stream))
        .route("/restaurants/:id/listings/stream", get(restaurant_stream))
}

fn to_event<T: Serialize>(name: &'static str, value: &T) -> Result<Event, Infallible> {
    Ok(Event::default()
        .event(name)
        .json_data(value)
        .unwrap_or_else(|_| Event::default().event(name).data("serialization_error")))
}

/// Pushes a full snapshot of available listings whenever it changes.
#[instrument(skip(state))]
pub async fn available_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.feed.subscribe_available())
        .map(|snapshot| to_event("listings", &snapshot));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Re-fetches one restaurant's listings on every change event, one fetch at a time.
#[instrument(skip(state))]
pub async fn restaurant_stream(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(restaurant_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    get_owned(state.restaurants.as_ref(), restaurant_id, caller.id).await?;

    let changes = BroadcastStream::new(state.feed.subscribe_changes()).map(|_| ());
    let listings = state.listings.clone();
    let stream = stream::once(async {})
        .chain(changes)
        .then(move |_| {
            let listings = listings.clone();
            async move { listings.list_by_restaurant(restaurant_id).await }
        })
        .filter_map(move |res| async move {
            match res {
                Ok(rows) => Some(to_event("restaurant_listings", &rows)),
                Err(e) => {
                    warn!(error = %e, %restaurant_id, "restaurant listing refresh failed");
                    None
                }
            }
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
