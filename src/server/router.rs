use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{config, documents, health, sessions};
use crate::server::ws::handler::ws_handler;
use crate::state::AppState;

/// Creates the application router: health, config, documents, sessions and
/// the answer WebSocket, behind CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server.cors_allowed_origins);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/config", get(config::get_config))
        .route("/api/documents", get(documents::list_documents))
        .route("/api/documents/text", post(documents::add_text_document))
        .route("/api/documents/import", post(documents::import_document))
        .route("/api/documents/import/batch", post(documents::import_batch))
        .route("/api/documents/:source", delete(documents::delete_document))
        .route(
            "/api/sessions/:session_id",
            delete(sessions::delete_session),
        )
        .route(
            "/api/sessions/:session_id/messages",
            get(sessions::get_session_messages),
        )
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let mut allowed = parse_origins(origins);
    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins configured; using local defaults");
        allowed = parse_origins(&default_local_origins());
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect()
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://localhost:8000".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_invalid_origins_are_skipped() {
        let parsed = parse_origins(&[
            " http://localhost:5173 ".to_string(),
            String::new(),
            "bad\norigin".to_string(),
        ]);
        assert_eq!(parsed, vec![HeaderValue::from_static("http://localhost:5173")]);
    }
}
