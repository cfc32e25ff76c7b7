use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::history::HistoryStore;
use crate::ingest::{DocumentIngestor, DocumentLoader, FileLoader};
use crate::intent::IntentClassifier;
use crate::llm::{CompletionService, Embedder, OpenAiCompatClient};
use crate::orchestrator::{OrchestratorSettings, QueryOrchestrator};
use crate::rag::{Chunker, RetrievalIndex, SqliteVectorIndex, VectorIndex};
use crate::tools::{HttpWebSearch, WebSearch};

pub mod error;

use error::InitializationError;

/// Everything a handler needs, owned in one place and passed around by `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<Settings>,
    pub history: HistoryStore,
    pub index: Arc<RetrievalIndex>,
    pub ingestor: DocumentIngestor,
    pub orchestrator: QueryOrchestrator,
}

/// The external services the pipeline talks to.
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorIndex>,
    pub completion: Arc<dyn CompletionService>,
    pub web: Option<Arc<dyn WebSearch>>,
    pub loader: Arc<dyn DocumentLoader>,
}

impl AppState {
    /// Loads configuration for `paths` and wires the SQLite index, the
    /// OpenAI-compatible client and (when enabled) web search.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(InitializationError::Config)?;

        let client = Arc::new(
            OpenAiCompatClient::from_settings(&settings.llm, settings.stream.channel_capacity)
                .map_err(InitializationError::Llm)?,
        );
        let store = Arc::new(
            SqliteVectorIndex::new(paths.as_ref())
                .await
                .map_err(InitializationError::Index)?,
        );
        let web: Option<Arc<dyn WebSearch>> = if settings.web.enabled {
            let search =
                HttpWebSearch::from_settings(&settings.web).map_err(InitializationError::WebSearch)?;
            tracing::info!("Web search enabled ({})", search.provider_name());
            Some(Arc::new(search))
        } else {
            tracing::info!("Web search disabled");
            None
        };

        tracing::info!(
            "Completion provider: {} (model {}, streaming {})",
            client.name(),
            settings.llm.model,
            settings.llm.streaming
        );

        let collaborators = Collaborators {
            embedder: client.clone(),
            store,
            completion: client,
            web,
            loader: Arc::new(FileLoader),
        };
        Self::assemble(paths, config, settings, collaborators).await
    }

    /// Builds the state around explicit collaborators.
    pub async fn assemble(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: Settings,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>, InitializationError> {
        let history = HistoryStore::new(paths.history_db_path.clone())
            .await
            .map_err(InitializationError::History)?;

        let chunker =
            Chunker::from_settings(&settings.chunking).map_err(InitializationError::Chunking)?;
        let classifier = Arc::new(IntentClassifier::new()?);

        let index = Arc::new(RetrievalIndex::new(
            collaborators.embedder,
            collaborators.store,
            Duration::from_secs(settings.retrieval.index_timeout_secs),
        ));
        let ingestor = DocumentIngestor::new(
            chunker,
            index.clone(),
            collaborators.loader,
            paths.upload_dir.clone(),
        );

        let mut orchestrator = QueryOrchestrator::new(
            classifier,
            index.clone(),
            collaborators.completion,
            OrchestratorSettings::from_settings(&settings),
        )
        .with_liveness(Arc::new(ingestor.liveness()));
        if let Some(web) = collaborators.web {
            orchestrator = orchestrator.with_web_search(web);
        }

        tracing::info!(
            "Pipeline ready (chunk size {}, overlap {}, threshold {})",
            chunker.target_size(),
            chunker.overlap(),
            settings.retrieval.relevance_threshold
        );

        Ok(Arc::new(AppState {
            paths,
            config,
            settings: Arc::new(settings),
            history,
            index,
            ingestor,
            orchestrator,
        }))
    }
}
