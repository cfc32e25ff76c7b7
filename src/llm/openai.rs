use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{CompletionService, Embedder, TokenStream};
use super::types::ChatRequest;
use crate::core::config::LlmSettings;
use crate::core::errors::{Collaborator, CollaboratorError, FailureKind};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for any server speaking the OpenAI chat/embeddings protocol
/// (LM Studio, llama.cpp server, vLLM, the hosted API).
#[derive(Clone)]
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    embedding_model: String,
    temperature: f64,
    max_tokens: u32,
    request_timeout: Duration,
    channel_capacity: usize,
    streaming: bool,
    client: Client,
}

impl OpenAiCompatClient {
    pub fn from_settings(
        settings: &LlmSettings,
        channel_capacity: usize,
    ) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| CollaboratorError::other(Collaborator::Completion, e))?;

        let embedding_model = if settings.embedding_model.trim().is_empty() {
            settings.model.clone()
        } else {
            settings.embedding_model.clone()
        };

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
            model: settings.model.clone(),
            embedding_model,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            request_timeout: Duration::from_secs(settings.timeout_secs),
            channel_capacity: channel_capacity.max(1),
            streaming: settings.streaming,
            client,
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn chat_body(&self, request: &ChatRequest, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": request.messages,
            "stream": stream,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
        })
    }

    async fn send_checked(
        service: Collaborator,
        builder: RequestBuilder,
    ) -> Result<Response, CollaboratorError> {
        let res = builder
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(service, e))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status(service, status, &text));
        }
        Ok(res)
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, CollaboratorError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.chat_body(&request, false);

        let builder = self
            .authorized(self.client.post(&url))
            .timeout(self.request_timeout)
            .json(&body);
        let res = Self::send_checked(Collaborator::Completion, builder).await?;

        let payload: Value = res
            .json()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(Collaborator::Completion, e))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                CollaboratorError::new(
                    Collaborator::Completion,
                    FailureKind::BadResponse,
                    "response carried no message content",
                )
            })
    }

    async fn complete_stream(&self, request: ChatRequest) -> Result<TokenStream, CollaboratorError> {
        if !self.streaming {
            let answer = self.complete(request).await?;
            return Ok(whole_answer(answer));
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.chat_body(&request, true);

        // No total timeout here: long answers are bounded by the consumer's
        // idle timeout instead.
        let builder = self.authorized(self.client.post(&url)).json(&body);
        let res = Self::send_checked(Collaborator::Completion, builder).await?;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        for line in drain_lines(&mut buffer) {
                            match parse_sse_line(&line) {
                                SseLine::Token(token) => {
                                    if tx.send(Ok(token)).await.is_err() {
                                        return;
                                    }
                                }
                                SseLine::Done => return,
                                SseLine::Skip => {}
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(CollaboratorError::from_reqwest(Collaborator::Completion, e)))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[async_trait]
impl Embedder for OpenAiCompatClient {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.embedding_model,
            "input": texts,
        });

        let builder = self
            .authorized(self.client.post(&url))
            .timeout(self.request_timeout)
            .json(&body);
        let res = Self::send_checked(Collaborator::Embedder, builder).await?;

        let payload: Value = res
            .json()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(Collaborator::Embedder, e))?;

        let embeddings = parse_embeddings(&payload);
        if embeddings.len() != texts.len() {
            return Err(CollaboratorError::new(
                Collaborator::Embedder,
                FailureKind::BadResponse,
                format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    embeddings.len()
                ),
            ));
        }
        Ok(embeddings)
    }
}

/// A one-item stream carrying an answer fetched without SSE.
fn whole_answer(answer: String) -> TokenStream {
    let (tx, rx) = mpsc::channel(1);
    if !answer.is_empty() {
        // Capacity 1 and a fresh channel: this cannot be full.
        let _ = tx.try_send(Ok(answer));
    }
    rx
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Token(String),
    Done,
    Skip,
}

/// Splits complete `\n`-terminated lines off the front of `buffer`, leaving
/// any trailing partial line for the next network read.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line).trim().to_string();
        if !text.is_empty() {
            lines.push(text);
        }
    }
    lines
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(json) => match json["choices"][0]["delta"]["content"].as_str() {
            Some(content) if !content.is_empty() => SseLine::Token(content.to_string()),
            _ => SseLine::Skip,
        },
        Err(_) => SseLine::Skip,
    }
}

/// Reads `data[*].embedding`, honouring the optional `index` field so the
/// output order matches the input order.
fn parse_embeddings(payload: &Value) -> Vec<Vec<f32>> {
    let Some(data) = payload["data"].as_array() else {
        return Vec::new();
    };

    let mut indexed: Vec<(usize, Vec<f32>)> = data
        .iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let values = item["embedding"].as_array()?;
            let vector = values
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            let index = item["index"]
                .as_u64()
                .map(|i| i as usize)
                .unwrap_or(position);
            Some((index, vector))
        })
        .collect();

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, vector)| vector).collect()
}
