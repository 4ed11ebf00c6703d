use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use super::dto::{AnalyzeQuery, RecipeRequest, RecipeResponse};
use super::recipe::{generate_recipe, parse_recipe};
use super::vision::{analyze_image, AnalysisResult};
use crate::{auth::AuthUser, error::AppError, images::read_image_field, state::AppState};

pub fn ai_routes() -> Router<AppState> {
    Router::new()
        // size is enforced by validate_image so oversized uploads get a proper 400
        .route(
            "/ai/analyze",
            post(analyze).layer(DefaultBodyLimit::max(20 * 1024 * 1024)),
        )
        .route("/ai/recipe", post(recipe))
}

/// POST /ai/analyze (multipart, field `image`)
#[instrument(skip(state, mp))]
pub async fn analyze(
    State(state): State<AppState>,
    _caller: AuthUser,
    Query(q): Query<AnalyzeQuery>,
    mut mp: Multipart,
) -> Result<Json<AnalysisResult>, AppError> {
    let upload = read_image_field(&mut mp, "image").await?;
    let mut result = analyze_image(state.ai.as_ref(), &state.retry, &upload).await?;
    if q.with_recipe {
        result.recipe =
            Some(generate_recipe(state.ai.as_ref(), &state.retry, &result.ingredients).await?);
    }
    Ok(Json(result))
}

/// POST /ai/recipe { ingredients: [...] }
#[instrument(skip(state, body))]
pub async fn recipe(
    State(state): State<AppState>,
    _caller: AuthUser,
    Json(body): Json<RecipeRequest>,
) -> Result<Json<RecipeResponse>, AppError> {
    let raw = generate_recipe(state.ai.as_ref(), &state.retry, &body.ingredients).await?;
    let recipe = parse_recipe(&raw);
    Ok(Json(RecipeResponse { raw, recipe }))
}
