use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(100);

    let messages = state.history.recent_messages(&session_id, limit).await?;
    Ok(Json(json!({"sessionId": session_id, "messages": messages})))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.history.clear_session(&session_id).await?;
    tracing::info!("Cleared session {} ({} messages)", session_id, removed);
    Ok(Json(json!({"success": true, "messagesDeleted": removed})))
}
