mod client;
mod dto;
pub mod handlers;
pub mod recipe;
pub mod retry;
pub mod vision;

pub use client::{AiError, GeminiClient, GenerativeModel, InlineImage};
#[cfg(test)]
pub use client::fake;
pub use retry::RetryPolicy;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::ai_routes()
}
