//! Question answering state machine.
//!
//! `Classify -> [TerminalReply]`, or
//! `Classify -> RetrieveDocs? -> RetrieveWeb? -> EvaluateRelevance ->
//! [NoResults] | Generate -> Stream -> [Done]`.
//!
//! Each question runs on its own task and reports through a bounded channel
//! of [`StreamEvent`]s. Dropping the receiver cancels the run.

mod events;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

pub use events::{SearchMode, SourcesRecord, StreamEvent, WebSource};

use crate::core::config::Settings;
use crate::core::errors::{with_deadline, Collaborator, CollaboratorError, RagError};
use crate::intent::{Intent, IntentClassifier, IntentDecision};
use crate::llm::{ChatMessage, CompletionService, TokenStream};
use crate::rag::{ContextBuilder, RetrievalIndex, SearchResult, SourceLiveness};
use crate::tools::{WebResult, WebSearch};

const NO_DOCUMENTS_MESSAGE: &str =
    "I don't have any documents to search through yet. Please upload some documents first!";
const DOCUMENTS_GONE_MESSAGE: &str = "The document(s) you uploaded no longer exist on the server. \
Please remove them from the chat and upload fresh copies.";
const WEB_DISABLED_MESSAGE: &str = "Web search is disabled, and I couldn't find anything relevant \
in your documents. Try enabling web search or uploading a related document.";
const NOTHING_FOUND_MESSAGE: &str = "I couldn't find information about that in your documents. \
Try uploading more relevant documents or rephrasing your question.";

/// Phrases with which an answer disclaims having found anything.
const NOT_FOUND_PHRASES: &[&str] = &[
    "couldn't find",
    "could not find",
    "no information",
    "don't have",
    "do not have",
    "not mentioned in",
    "no relevant",
];

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_limit: usize,
    pub max_limit: usize,
    pub relevance_threshold: f32,
    pub web_enabled: bool,
    pub web_max_results: usize,
    pub citation_limit: usize,
    pub web_timeout: Duration,
    pub completion_timeout: Duration,
    pub stream_idle_timeout: Duration,
    pub channel_capacity: usize,
}

impl OrchestratorSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default_limit: settings.retrieval.default_limit,
            max_limit: settings.retrieval.max_limit,
            relevance_threshold: settings.retrieval.relevance_threshold,
            web_enabled: settings.web.enabled,
            web_max_results: settings.web.max_results,
            citation_limit: settings.web.citation_limit,
            web_timeout: Duration::from_secs(settings.web.timeout_secs),
            completion_timeout: Duration::from_secs(settings.llm.timeout_secs),
            stream_idle_timeout: Duration::from_secs(settings.llm.stream_idle_timeout_secs),
            channel_capacity: settings.stream.channel_capacity,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuestionRequest {
    pub question: String,
    pub limit: Option<usize>,
    /// Restrict document retrieval to these sources.
    pub sources: Option<Vec<String>>,
    /// Prior turns, oldest first.
    pub history: Vec<ChatMessage>,
    pub skip_web_search: bool,
}

impl QuestionRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }
}

/// Why a run stopped before its normal end.
enum Halt {
    Failed(RagError),
    Disconnected,
}

impl From<RagError> for Halt {
    fn from(err: RagError) -> Self {
        Halt::Failed(err)
    }
}

impl From<CollaboratorError> for Halt {
    fn from(err: CollaboratorError) -> Self {
        Halt::Failed(err.into())
    }
}

#[derive(Clone)]
pub struct QueryOrchestrator {
    classifier: Arc<IntentClassifier>,
    index: Arc<RetrievalIndex>,
    completion: Arc<dyn CompletionService>,
    web: Option<Arc<dyn WebSearch>>,
    liveness: Option<Arc<dyn SourceLiveness>>,
    context: Arc<ContextBuilder>,
    settings: Arc<OrchestratorSettings>,
}

impl QueryOrchestrator {
    pub fn new(
        classifier: Arc<IntentClassifier>,
        index: Arc<RetrievalIndex>,
        completion: Arc<dyn CompletionService>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            classifier,
            index,
            completion,
            web: None,
            liveness: None,
            context: Arc::new(ContextBuilder::default()),
            settings: Arc::new(settings),
        }
    }

    pub fn with_web_search(mut self, web: Arc<dyn WebSearch>) -> Self {
        self.web = Some(web);
        self
    }

    pub fn with_liveness(mut self, liveness: Arc<dyn SourceLiveness>) -> Self {
        self.liveness = Some(liveness);
        self
    }

    pub fn with_context_builder(mut self, context: ContextBuilder) -> Self {
        self.context = Arc::new(context);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Validates the question and starts answering it in the background.
    pub fn ask(&self, request: QuestionRequest) -> Result<mpsc::Receiver<StreamEvent>, RagError> {
        let question = request.question.trim().to_string();
        if question.is_empty() {
            return Err(RagError::validation("Question cannot be empty."));
        }
        let request = QuestionRequest { question, ..request };

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run(request, tx).await;
        });
        Ok(rx)
    }

    async fn run(self, request: QuestionRequest, tx: mpsc::Sender<StreamEvent>) {
        match self.answer(&request, &tx).await {
            Ok(()) => {}
            Err(Halt::Disconnected) => {
                tracing::info!("Client went away, abandoning answer");
                return;
            }
            Err(Halt::Failed(err)) => {
                tracing::warn!("Answer failed: {}", err);
                if emit(&tx, StreamEvent::Error(err.user_message())).await.is_err() {
                    return;
                }
            }
        }
        let _ = emit(&tx, StreamEvent::Done).await;
    }

    async fn answer(
        &self,
        request: &QuestionRequest,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), Halt> {
        let question = request.question.as_str();
        // A failing count must not block conversational replies; retrieval
        // will surface the real error if the index is needed.
        let has_documents = match self.index.count().await {
            Ok(count) => count > 0,
            Err(err) => {
                tracing::warn!("Could not count indexed chunks: {}", err);
                true
            }
        };

        let decision = self.classifier.analyze(question, has_documents);
        if let Some(message) = &decision.message {
            tracing::info!("Terminal reply for intent {:?}", decision.intent);
            return reply(tx, message).await;
        }

        let scope = request
            .sources
            .as_deref()
            .filter(|sources| !sources.is_empty());
        if decision.use_docs && self.scope_is_gone(scope) {
            tracing::info!("Every requested source has been deleted");
            return reply(tx, DOCUMENTS_GONE_MESSAGE).await;
        }

        let mut docs = if decision.use_docs {
            self.retrieve_docs(question, request.limit, scope).await?
        } else {
            Vec::new()
        };

        let top_score = docs.first().map(|d| d.score);
        let escalate = decision.fallback_to_web
            && top_score.map_or(true, |score| score < self.settings.relevance_threshold);
        let wants_web = decision.use_web || escalate;
        if escalate {
            tracing::info!(
                "Top document score {:?} below {}, adding web search",
                top_score,
                self.settings.relevance_threshold
            );
        }

        let web_allowed = self.settings.web_enabled && !request.skip_web_search;
        let web = if wants_web && web_allowed {
            self.retrieve_web(question, &decision).await?
        } else {
            Vec::new()
        };

        if !decision.is_explicit_document_query() {
            let threshold = self.settings.relevance_threshold;
            let before = docs.len();
            docs.retain(|d| d.score >= threshold);
            if docs.len() < before {
                tracing::debug!("Discarded {} low-relevance chunks", before - docs.len());
            }
        }

        if docs.is_empty() && web.is_empty() {
            let message = self.no_results_message(has_documents, wants_web, web_allowed);
            tracing::info!("No usable context for intent {:?}", decision.intent);
            return reply(tx, message).await;
        }

        let mode = SearchMode::from_usage(!docs.is_empty(), !web.is_empty());
        tracing::info!(
            "Generating answer from {} chunks and {} web results ({:?})",
            docs.len(),
            web.len(),
            mode
        );

        let chat = self.context.request(question, &docs, &web, &request.history);
        let stream = with_deadline(
            Collaborator::Completion,
            self.settings.completion_timeout,
            self.completion.complete_stream(chat),
        )
        .await?;

        let answer = self.forward_tokens(stream, tx).await?;

        let sources = if mentions_not_found(&answer) {
            tracing::info!("Answer disclaims finding anything, suppressing citations");
            SourcesRecord::empty()
        } else {
            SourcesRecord {
                document_sources: docs.iter().map(|d| d.source.clone()).collect::<BTreeSet<_>>(),
                web_sources: web
                    .iter()
                    .take(self.settings.citation_limit)
                    .map(|w| WebSource {
                        title: w.title.clone(),
                        url: w.url.clone(),
                    })
                    .collect(),
                search_mode: mode,
            }
        };
        emit(tx, StreamEvent::SourcesKnown(sources)).await
    }

    async fn retrieve_docs(
        &self,
        question: &str,
        limit: Option<usize>,
        scope: Option<&[String]>,
    ) -> Result<Vec<SearchResult>, RagError> {
        let max = self.settings.max_limit.max(1);
        let limit = limit.unwrap_or(self.settings.default_limit).clamp(1, max);
        self.index
            .search(question, limit, scope, self.liveness.as_deref())
            .await
    }

    /// Web failures only abort the answer when the web was the sole source.
    async fn retrieve_web(
        &self,
        question: &str,
        decision: &IntentDecision,
    ) -> Result<Vec<WebResult>, RagError> {
        let Some(web) = &self.web else {
            return Ok(Vec::new());
        };

        let result = with_deadline(
            Collaborator::WebSearch,
            self.settings.web_timeout,
            web.search(question, self.settings.web_max_results),
        )
        .await;

        match result {
            Ok(results) => Ok(results),
            Err(err) if decision.intent == Intent::WebOnly => Err(err.into()),
            Err(err) => {
                tracing::warn!("Web search failed, continuing with documents only: {}", err);
                Ok(Vec::new())
            }
        }
    }

    /// Relays tokens in arrival order until the producer closes its end.
    async fn forward_tokens(
        &self,
        mut stream: TokenStream,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<String, Halt> {
        let idle = self.settings.stream_idle_timeout;
        let mut answer = String::new();

        loop {
            let next = tokio::select! {
                _ = tx.closed() => return Err(Halt::Disconnected),
                next = tokio::time::timeout(idle, stream.recv()) => next,
            };

            match next {
                Err(_) => return Err(CollaboratorError::timeout(Collaborator::Completion, idle).into()),
                Ok(None) => break,
                Ok(Some(Err(err))) => return Err(err.into()),
                Ok(Some(Ok(token))) => {
                    answer.push_str(&token);
                    emit(tx, StreamEvent::Token(token)).await?;
                }
            }
        }

        Ok(answer)
    }

    fn scope_is_gone(&self, scope: Option<&[String]>) -> bool {
        match (scope, &self.liveness) {
            (Some(names), Some(liveness)) => names.iter().all(|name| !liveness.is_live(name)),
            _ => false,
        }
    }

    fn no_results_message(
        &self,
        has_documents: bool,
        wants_web: bool,
        web_allowed: bool,
    ) -> &'static str {
        if wants_web && (!web_allowed || self.web.is_none()) {
            return WEB_DISABLED_MESSAGE;
        }
        if !has_documents {
            return NO_DOCUMENTS_MESSAGE;
        }
        NOTHING_FOUND_MESSAGE
    }
}

fn mentions_not_found(answer: &str) -> bool {
    let lower = answer.to_lowercase().replace('\u{2019}', "'");
    NOT_FOUND_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

async fn emit(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<(), Halt> {
    tx.send(event).await.map_err(|_| Halt::Disconnected)
}

async fn reply(tx: &mpsc::Sender<StreamEvent>, message: &str) -> Result<(), Halt> {
    emit(tx, StreamEvent::Token(message.to_string())).await?;
    emit(tx, StreamEvent::SourcesKnown(SourcesRecord::empty())).await
}
