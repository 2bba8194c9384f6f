use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub progress: f64,
    pub model_name: String,
}

/// Acquisition progress and the served model's name. Reads the stored
/// progress value only; never touches the network.
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(ModelInfo {
        progress: state.acquisition.progress(),
        model_name: state.settings.model_name(),
    })
}
