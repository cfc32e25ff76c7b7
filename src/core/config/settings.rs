use serde::{Deserialize, Serialize};

/// Typed view over the merged YAML configuration. Every field has a default so
/// an empty config file yields a runnable setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub web: WebSettings,
    pub llm: LlmSettings,
    pub stream: StreamSettings,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 350,
            chunk_overlap: 35,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Minimum similarity for a chunk to count as usable context.
    pub relevance_threshold: f32,
    pub index_timeout_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_limit: 5,
            max_limit: 10,
            relevance_threshold: 0.4,
            index_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    pub enabled: bool,
    pub provider: String,
    pub max_results: usize,
    pub citation_limit: usize,
    pub google_api_key: Option<String>,
    pub google_engine_id: Option<String>,
    pub brave_api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "duckduckgo".to_string(),
            max_results: 5,
            citation_limit: 3,
            google_api_key: None,
            google_engine_id: None,
            brave_api_key: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
    /// `false` for servers without SSE support; answers then arrive whole.
    pub streaming: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1234".to_string(),
            api_key: None,
            model: "local-model".to_string(),
            embedding_model: "text-embedding-nomic-embed-text-v1.5".to_string(),
            temperature: 0.5,
            max_tokens: 1024,
            timeout_secs: 60,
            stream_idle_timeout_secs: 60,
            streaming: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub channel_capacity: usize,
    pub history_turns: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            history_turns: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub max_file_bytes: u64,
    pub max_batch_bytes: u64,
    pub max_files_per_batch: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_batch_bytes: 50 * 1024 * 1024,
            max_files_per_batch: 10,
        }
    }
}
