use serde::{Deserialize, Serialize};

use crate::orchestrator::{SourcesRecord, StreamEvent};

pub const WS_APP_PROTOCOL: &str = "docsage.v1";

#[derive(Debug, Deserialize, Default)]
pub struct WsIncomingMessage {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub message: Option<String>,
    pub sources: Option<Vec<String>>,
    pub limit: Option<usize>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "skipWebSearch")]
    pub skip_web_search: Option<bool>,
}

impl WsIncomingMessage {
    pub fn is_stop(&self) -> bool {
        self.msg_type.as_deref() == Some("stop")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoingMessage {
    Chunk {
        message: String,
    },
    Sources {
        #[serde(flatten)]
        record: SourcesRecord,
    },
    Error {
        message: String,
    },
    Done,
    Stopped,
}

impl From<StreamEvent> for WsOutgoingMessage {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Token(message) => WsOutgoingMessage::Chunk { message },
            StreamEvent::SourcesKnown(record) => WsOutgoingMessage::Sources { record },
            StreamEvent::Error(message) => WsOutgoingMessage::Error { message },
            StreamEvent::Done => WsOutgoingMessage::Done,
        }
    }
}
