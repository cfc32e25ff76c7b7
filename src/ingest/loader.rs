use std::fs;
use std::path::Path;

use crate::core::config::UploadSettings;
use crate::core::errors::{LoadError, RagError};

/// Extensions the bundled loader can turn into text.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "csv"];

/// Turns a file on disk into plain text. Implementations are blocking and are
/// driven from `spawn_blocking` by the ingestor.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<String, LoadError>;
}

/// Plain-text and CSV loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl DocumentLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<String, LoadError> {
        let ext = extension_of(path);
        let text = match ext.as_str() {
            "txt" | "md" => fs::read_to_string(path)?,
            "csv" => load_csv(path)?,
            _ => return Err(LoadError::Unsupported(display_ext(&ext))),
        };

        if text.trim().is_empty() {
            return Err(LoadError::NoText(display_name(path)));
        }
        Ok(text)
    }
}

/// One line per non-blank row, cells joined by `" | "`.
fn load_csv(path: &Path) -> Result<String, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().any(|cell| !cell.trim().is_empty()) {
            lines.push(record.iter().collect::<Vec<_>>().join(" | "));
        }
    }
    Ok(lines.join("\n"))
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn display_ext(ext: &str) -> String {
    if ext.is_empty() {
        "(none)".to_string()
    } else {
        format!(".{}", ext)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Checks a single upload before anything touches the disk.
pub fn validate_file(name: &str, size: u64, limits: &UploadSettings) -> Result<(), LoadError> {
    let ext = extension_of(Path::new(name));
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(LoadError::Unsupported(display_ext(&ext)));
    }
    if size > limits.max_file_bytes {
        return Err(LoadError::TooLarge {
            size,
            max: limits.max_file_bytes,
        });
    }
    Ok(())
}

/// Checks file count and combined size, then every file on its own.
pub fn validate_batch(files: &[(String, u64)], limits: &UploadSettings) -> Result<(), RagError> {
    if files.len() > limits.max_files_per_batch {
        return Err(RagError::validation(format!(
            "Too many files: {}. Maximum: {} files per upload",
            files.len(),
            limits.max_files_per_batch
        )));
    }

    let total: u64 = files.iter().map(|(_, size)| *size).sum();
    if total > limits.max_batch_bytes {
        return Err(RagError::validation(format!(
            "Total size too large: {:.1}MB. Maximum: {}MB per batch",
            total as f64 / (1024.0 * 1024.0),
            limits.max_batch_bytes / (1024 * 1024)
        )));
    }

    for (name, size) in files {
        validate_file(name, *size, limits)?;
    }
    Ok(())
}
