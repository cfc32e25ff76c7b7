use std::fmt;
use std::future::Future;
use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// External service a core operation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Embedder,
    VectorIndex,
    Completion,
    WebSearch,
}

impl Collaborator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collaborator::Embedder => "embedder",
            Collaborator::VectorIndex => "vector index",
            Collaborator::Completion => "completion service",
            Collaborator::WebSearch => "web search",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a collaborator call failed. Adapters pick the kind; the orchestrator
/// only reads it to choose user-facing wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connection,
    Unauthorized,
    RateLimited,
    BadResponse,
    Other,
}

#[derive(Debug, Clone, Error)]
#[error("{service} failed ({kind:?}): {message}")]
pub struct CollaboratorError {
    pub service: Collaborator,
    pub kind: FailureKind,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(service: Collaborator, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            service,
            kind,
            message: message.into(),
        }
    }

    pub fn other<E: fmt::Display>(service: Collaborator, err: E) -> Self {
        Self::new(service, FailureKind::Other, err.to_string())
    }

    pub fn timeout(service: Collaborator, after: Duration) -> Self {
        Self::new(
            service,
            FailureKind::Timeout,
            format!("no response after {}s", after.as_secs_f32()),
        )
    }

    /// Maps a transport error from reqwest onto a failure kind.
    pub fn from_reqwest(service: Collaborator, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connection
        } else if err.is_decode() {
            FailureKind::BadResponse
        } else {
            FailureKind::Other
        };
        Self::new(service, kind, err.to_string())
    }

    /// Maps a non-success HTTP status onto a failure kind.
    pub fn from_status(service: Collaborator, status: reqwest::StatusCode, body: &str) -> Self {
        let kind = match status.as_u16() {
            401 | 403 => FailureKind::Unauthorized,
            429 => FailureKind::RateLimited,
            _ => FailureKind::BadResponse,
        };
        let detail: String = body.chars().take(200).collect();
        Self::new(service, kind, format!("HTTP {}: {}", status, detail))
    }

    /// Short, stack-free message suitable for the answer stream.
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::Timeout => format!(
                "The {} took too long to respond. Please try again.",
                self.service
            ),
            FailureKind::Connection => format!(
                "Could not reach the {}. Please check that it is running.",
                self.service
            ),
            FailureKind::Unauthorized => format!(
                "The {} rejected our credentials. Please check the API key.",
                self.service
            ),
            FailureKind::RateLimited => {
                "Rate limit exceeded. Please wait a moment and try again.".to_string()
            }
            FailureKind::BadResponse | FailureKind::Other => format!(
                "The {} returned an error. Please try again.",
                self.service
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("file too large: {size} bytes (maximum {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("no extractable text in {0}")]
    NoText(String),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl RagError {
    pub fn validation(message: impl Into<String>) -> Self {
        RagError::Validation(message.into())
    }

    pub fn user_message(&self) -> String {
        match self {
            RagError::Validation(msg) => msg.clone(),
            RagError::Collaborator(err) => err.user_message(),
            RagError::Load(err) => err.to_string(),
        }
    }
}

/// Runs a collaborator call under a deadline; expiry becomes a
/// `FailureKind::Timeout` failure for that collaborator.
pub async fn with_deadline<T, F>(
    service: Collaborator,
    after: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::timeout(service, after)),
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Validation(msg) => ApiError::BadRequest(msg),
            RagError::Load(LoadError::Io(io)) if io.kind() == std::io::ErrorKind::NotFound => {
                ApiError::NotFound(io.to_string())
            }
            RagError::Load(load) => ApiError::BadRequest(load.to_string()),
            RagError::Collaborator(collab) => {
                tracing::warn!("Collaborator failure surfaced to HTTP: {}", collab);
                ApiError::ServiceUnavailable(collab.user_message())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
