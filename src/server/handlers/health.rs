use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.index.count().await {
        Ok(chunks) => Json(json!({
            "status": "ok",
            "indexedChunks": chunks,
            "webSearch": state.orchestrator.settings().web_enabled,
        })),
        Err(err) => {
            tracing::warn!("Health check could not reach the index: {}", err);
            Json(json!({
                "status": "degraded",
                "error": err.user_message(),
            }))
        }
    }
}
