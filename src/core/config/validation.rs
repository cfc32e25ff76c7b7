use serde_json::{Map, Value};

use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(chunking, "chunking.chunk_size", "chunk_size", 1, 100_000)?;
        validate_u64_field(
            chunking,
            "chunking.chunk_overlap",
            "chunk_overlap",
            0,
            99_999,
        )?;
        let size = chunking.get("chunk_size").and_then(|v| v.as_u64());
        let overlap = chunking.get("chunk_overlap").and_then(|v| v.as_u64());
        if let (Some(size), Some(overlap)) = (size, overlap) {
            if overlap >= size {
                return Err(ApiError::BadRequest(
                    "Invalid config at 'chunking.chunk_overlap': must be smaller than chunk_size"
                        .to_string(),
                ));
            }
        }
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.default_limit", "default_limit", 1, 100)?;
        validate_u64_field(retrieval, "retrieval.max_limit", "max_limit", 1, 100)?;
        validate_f64_field(
            retrieval,
            "retrieval.relevance_threshold",
            "relevance_threshold",
            -1.0,
            1.0,
        )?;
        validate_u64_field(
            retrieval,
            "retrieval.index_timeout_secs",
            "index_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(web) = expect_optional_object(root, "web")? {
        validate_bool_field(web, "web.enabled", "enabled")?;
        validate_optional_string_field(web, "web.provider", "provider")?;
        validate_u64_field(web, "web.max_results", "max_results", 1, 50)?;
        validate_u64_field(web, "web.citation_limit", "citation_limit", 0, 50)?;
        validate_optional_string_field(web, "web.google_api_key", "google_api_key")?;
        validate_optional_string_field(web, "web.google_engine_id", "google_engine_id")?;
        validate_optional_string_field(web, "web.brave_api_key", "brave_api_key")?;
        validate_u64_field(web, "web.timeout_secs", "timeout_secs", 1, 600)?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_optional_string_field(llm, "llm.embedding_model", "embedding_model")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 3_600)?;
        validate_bool_field(llm, "llm.streaming", "streaming")?;
        validate_u64_field(
            llm,
            "llm.stream_idle_timeout_secs",
            "stream_idle_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(stream) = expect_optional_object(root, "stream")? {
        validate_u64_field(
            stream,
            "stream.channel_capacity",
            "channel_capacity",
            1,
            100_000,
        )?;
        validate_u64_field(stream, "stream.history_turns", "history_turns", 0, 200)?;
    }

    if let Some(uploads) = expect_optional_object(root, "uploads")? {
        validate_u64_field(
            uploads,
            "uploads.max_file_bytes",
            "max_file_bytes",
            1,
            1_000_000_000,
        )?;
        validate_u64_field(
            uploads,
            "uploads.max_batch_bytes",
            "max_batch_bytes",
            1,
            10_000_000_000,
        )?;
        validate_u64_field(
            uploads,
            "uploads.max_files_per_batch",
            "max_files_per_batch",
            1,
            1_000,
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
