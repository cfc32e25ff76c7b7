use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::{WsIncomingMessage, WsOutgoingMessage, WS_APP_PROTOCOL};
use crate::core::errors::ApiError;
use crate::llm::ChatMessage;
use crate::orchestrator::{QuestionRequest, SourcesRecord, StreamEvent};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let origin_ok = validate_origin(&headers, &state);

    ws.protocols([WS_APP_PROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, state, origin_ok))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, origin_ok: bool) {
    let (mut sender, mut receiver) = socket.split();

    if !origin_ok {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: 4003,
                reason: "Forbidden: Invalid Origin".into(),
            })))
            .await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<WsIncomingMessage>();
    tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<WsIncomingMessage>(&text) {
                    Ok(incoming) => {
                        if tx.send(incoming).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::debug!("Ignoring malformed ws message: {}", err),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Clients that never name a session get one history per connection.
    let connection_session = Uuid::new_v4().to_string();
    tracing::debug!("WebSocket connected (session {})", connection_session);

    // Questions that arrive while an answer is streaming wait their turn.
    let mut queued: VecDeque<WsIncomingMessage> = VecDeque::new();
    loop {
        let incoming = match queued.pop_front() {
            Some(msg) => msg,
            None => match rx.recv().await {
                Some(msg) => msg,
                None => break,
            },
        };

        let result = if incoming.is_stop() {
            send_message(&mut sender, &WsOutgoingMessage::Stopped).await
        } else {
            handle_ask(&mut sender, &state, &connection_session, &mut rx, &mut queued, incoming).await
        };

        if let Err(err) = result {
            tracing::debug!("WebSocket closed: {}", err);
            break;
        }
    }
}

async fn handle_ask<S>(
    sender: &mut S,
    state: &Arc<AppState>,
    default_session: &str,
    incoming_rx: &mut mpsc::UnboundedReceiver<WsIncomingMessage>,
    queued: &mut VecDeque<WsIncomingMessage>,
    data: WsIncomingMessage,
) -> Result<(), ApiError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let question = data.message.unwrap_or_default();
    let session_id = data
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| default_session.to_string());

    // History is best-effort; a broken store must not cost the answer.
    let history: Vec<ChatMessage> = match state
        .history
        .recent_messages(&session_id, state.settings.stream.history_turns)
        .await
    {
        Ok(messages) => messages.iter().map(|msg| msg.to_chat_message()).collect(),
        Err(err) => {
            tracing::warn!("Failed to load history for session {}: {}", session_id, err);
            Vec::new()
        }
    };

    let request = QuestionRequest {
        question: question.clone(),
        limit: data.limit,
        sources: data.sources,
        history,
        skip_web_search: data.skip_web_search.unwrap_or(false),
    };

    let mut events = match state.orchestrator.ask(request) {
        Ok(events) => events,
        Err(err) => {
            send_message(sender, &WsOutgoingMessage::Error { message: err.user_message() }).await?;
            return send_message(sender, &WsOutgoingMessage::Done).await;
        }
    };

    record_message(state, &session_id, "user", question.trim(), None).await;

    let mut answer = String::new();
    let mut sources: Option<SourcesRecord> = None;
    let mut failed = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match &event {
                    StreamEvent::Token(token) => answer.push_str(token),
                    StreamEvent::SourcesKnown(record) => sources = Some(record.clone()),
                    StreamEvent::Error(_) => failed = true,
                    StreamEvent::Done => {}
                }
                let done = event.is_done();
                send_message(sender, &WsOutgoingMessage::from(event)).await?;
                if done {
                    break;
                }
            }
            incoming = incoming_rx.recv() => {
                match incoming {
                    Some(msg) if msg.is_stop() => {
                        // Returning drops `events`, which cancels the answer.
                        tracing::info!("Answer stopped by client (session {})", session_id);
                        send_message(sender, &WsOutgoingMessage::Stopped).await?;
                        return send_message(sender, &WsOutgoingMessage::Done).await;
                    }
                    Some(msg) => queued.push_back(msg),
                    None => {
                        tracing::info!("Client disconnected mid-answer (session {})", session_id);
                        return Ok(());
                    }
                }
            }
        }
    }

    if !failed && !answer.is_empty() {
        let metadata = sources.map(|record| json!(record));
        record_message(state, &session_id, "assistant", &answer, metadata).await;
    }
    Ok(())
}

async fn record_message(
    state: &AppState,
    session_id: &str,
    role: &str,
    content: &str,
    metadata: Option<serde_json::Value>,
) {
    if let Err(err) = state
        .history
        .add_message(session_id, role, content, metadata)
        .await
    {
        tracing::warn!("Failed to record {} message for session {}: {}", role, session_id, err);
    }
}

async fn send_message<S>(sender: &mut S, message: &WsOutgoingMessage) -> Result<(), ApiError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(message).map_err(ApiError::internal)?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}

/// Browsers always send `Origin`; other clients are let through.
fn validate_origin(headers: &HeaderMap, state: &AppState) -> bool {
    let Some(origin) = headers.get("origin").and_then(|v| v.to_str().ok()) else {
        return true;
    };

    state
        .settings
        .server
        .cors_allowed_origins
        .iter()
        .any(|allowed| origin == allowed || origin.starts_with(&format!("{}/", allowed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::core::config::{AppPaths, ConfigService, Settings};
    use crate::core::errors::CollaboratorError;
    use crate::ingest::FileLoader;
    use crate::llm::{ChatRequest, CompletionService, Embedder, TokenStream};
    use crate::rag::MemoryVectorIndex;
    use crate::state::Collaborators;

    struct FlatEmbedder;

    #[async_trait]
    impl Embedder for FlatEmbedder {
        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CollaboratorError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.5]).collect())
        }
    }

    /// Sends one token, then keeps the answer open until the consumer leaves.
    struct HangingCompletion;

    #[async_trait]
    impl CompletionService for HangingCompletion {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<String, CollaboratorError> {
            Ok("unused".to_string())
        }

        async fn complete_stream(
            &self,
            _request: ChatRequest,
        ) -> Result<TokenStream, CollaboratorError> {
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                let _ = tx.send(Ok("Partial answer".to_string())).await;
                tx.closed().await;
            });
            Ok(rx)
        }
    }

    async fn app_state(dir: &tempfile::TempDir) -> Arc<AppState> {
        let paths = Arc::new(AppPaths::rooted_at(
            dir.path().to_path_buf(),
            dir.path().join("data"),
        ));
        let config = ConfigService::new(paths.clone());
        let mut settings = Settings::default();
        settings.web.enabled = false;

        let collaborators = Collaborators {
            embedder: Arc::new(FlatEmbedder),
            store: Arc::new(MemoryVectorIndex::new()),
            completion: Arc::new(HangingCompletion),
            web: None,
            loader: Arc::new(FileLoader),
        };
        AppState::assemble(paths, config, settings, collaborators)
            .await
            .expect("assemble state")
    }

    fn incoming(value: Value) -> WsIncomingMessage {
        serde_json::from_value(value).expect("incoming message")
    }

    fn frame_types(sent: &[Message]) -> Vec<String> {
        sent.iter()
            .filter_map(|msg| match msg {
                Message::Text(text) => serde_json::from_str::<Value>(text).ok(),
                _ => None,
            })
            .filter_map(|frame| frame["type"].as_str().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn broken_history_still_ends_the_answer_with_done() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = app_state(&dir).await;
        state.history.close().await;

        let (_tx, mut rx) = mpsc::unbounded_channel();
        let mut queued = VecDeque::new();
        let mut sent: Vec<Message> = Vec::new();

        handle_ask(
            &mut sent,
            &state,
            "s1",
            &mut rx,
            &mut queued,
            incoming(json!({"type": "ask", "message": "hello"})),
        )
        .await
        .expect("answer delivered");

        let types = frame_types(&sent);
        assert_eq!(types.first().map(String::as_str), Some("chunk"));
        assert_eq!(types.last().map(String::as_str), Some("done"));
        assert!(!types.iter().any(|t| t == "error"));
    }

    #[tokio::test]
    async fn stop_mid_answer_sends_stopped_then_done() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = app_state(&dir).await;
        std::fs::write(state.paths.upload_dir.join("report.txt"), "Quarterly report.")
            .expect("write upload");
        state
            .ingestor
            .ingest_text("report.txt", "Quarterly report with revenue figures.")
            .await
            .expect("ingest");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut queued = VecDeque::new();
        let mut sent: Vec<Message> = Vec::new();

        let stopper = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = stopper.send(incoming(json!({"type": "stop"})));
        });

        handle_ask(
            &mut sent,
            &state,
            "s1",
            &mut rx,
            &mut queued,
            incoming(json!({"type": "ask", "message": "Summarize my report"})),
        )
        .await
        .expect("answer stopped");

        let types = frame_types(&sent);
        assert_eq!(types.iter().filter(|t| *t == "done").count(), 1);
        assert_eq!(&types[types.len() - 2..], ["stopped", "done"]);
        assert!(queued.is_empty());
        drop(tx);

        // A stopped answer is not recorded as the assistant's reply.
        let recorded = state.history.message_count("s1").await.expect("count");
        assert_eq!(recorded, 1);
    }
}
