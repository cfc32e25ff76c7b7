use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::ingest::{validate_batch, validate_file};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TextDocumentRequest {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportDocumentRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportBatchRequest {
    pub paths: Vec<String>,
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state.ingestor.list_live_documents().await?;
    let chunk_count = state.index.count().await?;
    Ok(Json(json!({
        "documents": documents,
        "chunkCount": chunk_count,
    })))
}

/// Stores the text as an upload and indexes it synchronously.
pub async fn add_text_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TextDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let source = plain_file_name(&payload.source)?;
    validate_file(&source, payload.text.len() as u64, &state.settings.uploads)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let path = state.ingestor.upload_dir().join(&source);
    tokio::fs::write(&path, payload.text.as_bytes())
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save file: {}", e)))?;

    match state.ingestor.ingest_text(&source, &payload.text).await {
        Ok(chunks) => Ok(Json(json!({
            "source": source,
            "status": "success",
            "chunks": chunks,
        }))),
        Err(err) => {
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                tracing::warn!("Failed to remove {}: {}", path.display(), cleanup);
            }
            Err(err.into())
        }
    }
}

/// Indexes a file already in the upload directory. The document is listed
/// right away and fully processed in the background.
pub async fn import_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ImportDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let upload = stat_upload(state.ingestor.upload_dir(), &payload.path).await?;
    validate_file(&upload.source, upload.size, &state.settings.uploads)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let _background = state
        .ingestor
        .ingest_with_placeholder(&upload.source, &upload.path)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"source": upload.source, "status": "processing"})),
    ))
}

/// Imports several uploads at once. The batch is checked as a whole before
/// any file is indexed.
pub async fn import_batch(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ImportBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.paths.is_empty() {
        return Err(ApiError::BadRequest("No files to import".to_string()));
    }

    let mut uploads: Vec<UploadFile> = Vec::with_capacity(payload.paths.len());
    for raw in &payload.paths {
        let upload = stat_upload(state.ingestor.upload_dir(), raw).await?;
        if uploads.iter().any(|u| u.source == upload.source) {
            return Err(ApiError::BadRequest(format!(
                "Duplicate document in batch: {}",
                upload.source
            )));
        }
        uploads.push(upload);
    }

    let sizes: Vec<(String, u64)> = uploads
        .iter()
        .map(|u| (u.source.clone(), u.size))
        .collect();
    validate_batch(&sizes, &state.settings.uploads)?;

    let mut sources = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let _background = state
            .ingestor
            .ingest_with_placeholder(&upload.source, &upload.path)
            .await?;
        sources.push(upload.source);
    }
    tracing::info!("Batch import of {} documents started", sources.len());

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"sources": sources, "status": "processing"})),
    ))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.ingestor.remove(&source).await?;
    Ok(Json(removed))
}

/// Rejects anything that is not a bare file name.
fn plain_file_name(raw: &str) -> Result<String, ApiError> {
    let name = FsPath::new(raw.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid document name: {}", raw)))?;
    Ok(name)
}

struct UploadFile {
    path: PathBuf,
    source: String,
    size: u64,
}

async fn stat_upload(upload_dir: &FsPath, raw: &str) -> Result<UploadFile, ApiError> {
    let path = resolve_upload(upload_dir, raw)?;
    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid document name: {}", raw)))?;
    let size = tokio::fs::metadata(&path)
        .await
        .map_err(|e| ApiError::NotFound(format!("{}: {}", source, e)))?
        .len();
    Ok(UploadFile { path, source, size })
}

/// Resolves `raw` against the upload directory. Only files sitting directly
/// in it are accepted, since a document is tracked by its file name there.
fn resolve_upload(upload_dir: &FsPath, raw: &str) -> Result<PathBuf, ApiError> {
    let candidate = PathBuf::from(raw.trim());
    let candidate = if candidate.is_absolute() {
        candidate
    } else {
        upload_dir.join(candidate)
    };

    let root = upload_dir.canonicalize().map_err(ApiError::internal)?;
    let resolved = candidate
        .canonicalize()
        .map_err(|_| ApiError::NotFound(format!("File not found: {}", raw)))?;
    if resolved.parent() != Some(root.as_path()) || !resolved.is_file() {
        return Err(ApiError::BadRequest(
            "Only files directly inside the upload directory can be imported".to_string(),
        ));
    }
    Ok(resolved)
}
