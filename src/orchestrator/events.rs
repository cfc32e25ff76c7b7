use std::collections::BTreeSet;

use serde::Serialize;

/// Which sources backed the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    DocumentsOnly,
    WebOnly,
    Both,
    None,
}

impl SearchMode {
    pub fn from_usage(used_docs: bool, used_web: bool) -> Self {
        match (used_docs, used_web) {
            (true, true) => SearchMode::Both,
            (true, false) => SearchMode::DocumentsOnly,
            (false, true) => SearchMode::WebOnly,
            (false, false) => SearchMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebSource {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesRecord {
    pub document_sources: BTreeSet<String>,
    pub web_sources: Vec<WebSource>,
    pub search_mode: SearchMode,
}

impl SourcesRecord {
    pub fn empty() -> Self {
        Self {
            document_sources: BTreeSet::new(),
            web_sources: Vec::new(),
            search_mode: SearchMode::None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.document_sources.is_empty() && self.web_sources.is_empty()
    }
}

/// One answer is `Token*`, then `SourcesKnown` or `Error`, then exactly one
/// `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    SourcesKnown(SourcesRecord),
    Error(String),
    Done,
}

impl StreamEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}
