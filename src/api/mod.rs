use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub mod chat;
pub mod health;
pub mod model_info;

pub use chat::{chat_completion, ChatHistory, ChatHistoryItem};
pub use health::{health_check, HealthResponse};
pub use model_info::{model_info, ModelInfo};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/model-info", get(model_info))
        .route("/chat-completion", post(chat_completion))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
