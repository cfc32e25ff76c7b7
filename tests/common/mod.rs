#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use docsage_backend::core::errors::{Collaborator, CollaboratorError, FailureKind};
use docsage_backend::intent::IntentClassifier;
use docsage_backend::llm::{ChatRequest, CompletionService, Embedder, TokenStream};
use docsage_backend::orchestrator::{OrchestratorSettings, QueryOrchestrator, StreamEvent};
use docsage_backend::rag::{MemoryVectorIndex, RetrievalIndex};
use docsage_backend::tools::{WebResult, WebSearch};

pub const VOCAB: [&str; 6] = ["invoice", "total", "vendor", "weather", "cats", "dogs"];
pub const DIMS: usize = VOCAB.len() + 1;

/// Keyword-count embedder with optional pinned vectors for exact texts.
#[derive(Default)]
pub struct CountingEmbedder {
    pub calls: AtomicUsize,
    pinned: HashMap<String, Vec<f32>>,
}

impl CountingEmbedder {
    pub fn pin(mut self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), DIMS);
        self.pinned.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                if let Some(vector) = self.pinned.get(text) {
                    return vector.clone();
                }
                let lower = text.to_lowercase();
                let mut vector: Vec<f32> = VOCAB
                    .iter()
                    .map(|word| lower.matches(word).count() as f32)
                    .collect();
                vector.push(0.1);
                vector
            })
            .collect())
    }
}

/// Unit vector along axis 0 rotated so its cosine with `axis(0)` is `cos`.
pub fn at_similarity(cos: f32) -> Vec<f32> {
    let mut vector = vec![0.0; DIMS];
    vector[0] = cos;
    vector[1] = (1.0 - cos * cos).sqrt();
    vector
}

pub fn axis(i: usize) -> Vec<f32> {
    let mut vector = vec![0.0; DIMS];
    vector[i] = 1.0;
    vector
}

#[derive(Clone)]
pub enum Script {
    Tokens(Vec<String>),
    /// Refuses to open a stream.
    Unavailable(FailureKind),
    /// Streams these tokens, then fails.
    FailAfter(Vec<String>, FailureKind),
    /// Streams forever, one token every `Duration`.
    Endless(Duration),
}

pub struct ScriptedCompletion {
    script: Script,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<ChatRequest>>,
    /// Set once an endless producer notices the consumer is gone.
    pub producer_stopped: Arc<AtomicBool>,
}

impl ScriptedCompletion {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            producer_stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tokens(tokens: &[&str]) -> Self {
        Self::new(Script::Tokens(tokens.iter().map(|t| t.to_string()).collect()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().expect("requests lock").last().cloned()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, CollaboratorError> {
        let mut stream = self.complete_stream(request).await?;
        let mut answer = String::new();
        while let Some(token) = stream.recv().await {
            answer.push_str(&token?);
        }
        Ok(answer)
    }

    async fn complete_stream(&self, request: ChatRequest) -> Result<TokenStream, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(request);

        let (tx, rx) = mpsc::channel(4);
        match self.script.clone() {
            Script::Unavailable(kind) => {
                return Err(CollaboratorError::new(Collaborator::Completion, kind, "scripted outage"));
            }
            Script::Tokens(tokens) => {
                tokio::spawn(async move {
                    for token in tokens {
                        if tx.send(Ok(token)).await.is_err() {
                            return;
                        }
                    }
                });
            }
            Script::FailAfter(tokens, kind) => {
                tokio::spawn(async move {
                    for token in tokens {
                        if tx.send(Ok(token)).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx
                        .send(Err(CollaboratorError::new(
                            Collaborator::Completion,
                            kind,
                            "scripted failure",
                        )))
                        .await;
                });
            }
            Script::Endless(every) => {
                let stopped = self.producer_stopped.clone();
                tokio::spawn(async move {
                    loop {
                        if tx.send(Ok("word ".to_string())).await.is_err() {
                            stopped.store(true, Ordering::SeqCst);
                            return;
                        }
                        tokio::time::sleep(every).await;
                    }
                });
            }
        }
        Ok(rx)
    }
}

pub struct CountingWebSearch {
    pub calls: AtomicUsize,
    results: Vec<WebResult>,
    failure: Option<FailureKind>,
}

impl CountingWebSearch {
    pub fn returning(count: usize) -> Self {
        let results = (0..count)
            .map(|i| WebResult {
                title: format!("Result {i}"),
                url: format!("https://example.com/{i}"),
                snippet: format!("Snippet number {i}"),
            })
            .collect();
        Self {
            calls: AtomicUsize::new(0),
            results,
            failure: None,
        }
    }

    pub fn failing(kind: FailureKind) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            results: Vec::new(),
            failure: Some(kind),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for CountingWebSearch {
    async fn search(
        &self,
        _query: &str,
        max_results: usize,
    ) -> Result<Vec<WebResult>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.failure {
            return Err(CollaboratorError::new(Collaborator::WebSearch, kind, "scripted"));
        }
        Ok(self.results.iter().take(max_results).cloned().collect())
    }
}

pub fn memory_index(embedder: Arc<CountingEmbedder>) -> Arc<RetrievalIndex> {
    Arc::new(RetrievalIndex::new(
        embedder,
        Arc::new(MemoryVectorIndex::new()),
        Duration::from_secs(5),
    ))
}

pub fn orchestrator(
    index: Arc<RetrievalIndex>,
    completion: Arc<ScriptedCompletion>,
) -> QueryOrchestrator {
    QueryOrchestrator::new(
        Arc::new(IntentClassifier::new().expect("patterns compile")),
        index,
        completion,
        OrchestratorSettings::default(),
    )
}

/// Drains a run to its end, failing the test if it stalls.
pub async fn collect(mut events: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut out = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("stream stalled");
        match next {
            Some(event) => out.push(event),
            None => return out,
        }
    }
}

pub fn tokens(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Token(token) => Some(token.as_str()),
            _ => None,
        })
        .collect()
}
