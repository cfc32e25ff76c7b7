//! Query intent classification.
//!
//! An ordered cascade of pattern sets decides whether a question should hit
//! the document index, the web, both, or neither. The first matching set
//! wins, so conversational intents always beat retrieval and explicit
//! document references always beat web-style phrasing.

mod patterns;

use rand::seq::IndexedRandom;
use regex::{RegexSet, RegexSetBuilder};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Identity,
    Capability,
    Comparison,
    Greeting,
    Gratitude,
    Farewell,
    Both,
    DocumentsOnly,
    WebOnly,
    NoDocuments,
    Clarification,
}

impl Intent {
    /// Intents answered with a canned reply and no retrieval.
    pub fn is_conversational(&self) -> bool {
        matches!(
            self,
            Intent::Identity
                | Intent::Capability
                | Intent::Comparison
                | Intent::Greeting
                | Intent::Gratitude
                | Intent::Farewell
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentDecision {
    pub intent: Intent,
    pub use_docs: bool,
    pub use_web: bool,
    /// Direct reply that bypasses retrieval entirely.
    pub message: Option<String>,
    /// Escalate to web search when document matches are weak.
    pub fallback_to_web: bool,
}

impl IntentDecision {
    fn retrieve(intent: Intent, use_docs: bool, use_web: bool, fallback_to_web: bool) -> Self {
        Self {
            intent,
            use_docs,
            use_web,
            message: None,
            fallback_to_web,
        }
    }

    fn reply(intent: Intent, message: &str) -> Self {
        Self {
            intent,
            use_docs: false,
            use_web: false,
            message: Some(message.to_string()),
            fallback_to_web: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.message.is_some()
    }

    /// The user asked about document content outright; weak matches are
    /// still used.
    pub fn is_explicit_document_query(&self) -> bool {
        self.intent == Intent::DocumentsOnly && !self.fallback_to_web
    }
}

const IDENTITY_REPLIES: &[&str] = &[
    "I'm DocSage, an assistant that answers questions about your uploaded documents and, when it helps, the web.",
    "I'm DocSage! I read the documents you upload and answer questions about them, citing where each answer came from.",
];

const CAPABILITY_REPLIES: &[&str] = &[
    "I can answer questions about the documents you upload: summaries, totals, dates, names, and how documents relate to each other. For general questions I can search the web too.",
    "Upload a document and ask me anything about it. I'll find the relevant sections, answer, and cite my sources. I can also look things up on the web.",
];

const COMPARISON_REPLIES: &[&str] = &[
    "I'm built for one job: answering questions grounded in your own documents, with citations. Give me a document and see how I do!",
    "I won't rank myself against other assistants, but I'm focused on answering from your documents and showing exactly where each answer comes from.",
];

const GREETING_REPLIES: &[&str] = &[
    "Hello! Upload a document or ask me a question to get started.",
    "Hi there! What would you like to know about your documents?",
    "Hey! I'm ready when you are. Ask me anything about your documents.",
];

const GRATITUDE_REPLIES: &[&str] = &[
    "You're welcome! Let me know if you have more questions.",
    "Happy to help! Anything else you'd like to know?",
    "Anytime! Feel free to ask another question.",
];

const FAREWELL_REPLIES: &[&str] = &[
    "Goodbye! Come back any time you have questions about your documents.",
    "See you later! Your documents will be here when you return.",
];

const NO_DOCUMENTS_REPLIES: &[&str] = &[
    "I don't have any documents to search through yet. Please upload some documents first!",
];

const CLARIFICATION_REPLIES: &[&str] = &[
    "Could you tell me a bit more about what you're looking for? You can also upload a document for me to work with.",
    "I'm not sure what you're referring to. Could you rephrase your question or upload a document first?",
];

fn pick(replies: &'static [&'static str]) -> &'static str {
    replies.choose(&mut rand::rng()).copied().unwrap_or_default()
}

fn compile(patterns: &[&str]) -> Result<RegexSet, regex::Error> {
    RegexSetBuilder::new(patterns).case_insensitive(true).build()
}

/// Compiled once and shared read-only across requests.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    identity: RegexSet,
    capability: RegexSet,
    comparison: RegexSet,
    greeting: RegexSet,
    gratitude: RegexSet,
    farewell: RegexSet,
    hybrid: RegexSet,
    document: RegexSet,
    ambiguous: RegexSet,
    general: RegexSet,
}

impl IntentClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            identity: compile(patterns::IDENTITY)?,
            capability: compile(patterns::CAPABILITY)?,
            comparison: compile(patterns::COMPARISON)?,
            greeting: compile(patterns::GREETING)?,
            gratitude: compile(patterns::GRATITUDE)?,
            farewell: compile(patterns::FAREWELL)?,
            hybrid: compile(patterns::HYBRID)?,
            document: compile(patterns::DOCUMENT)?,
            ambiguous: compile(patterns::AMBIGUOUS)?,
            general: compile(patterns::GENERAL_KNOWLEDGE)?,
        })
    }

    pub fn analyze(&self, query: &str, has_documents: bool) -> IntentDecision {
        let q = query.trim().to_lowercase();
        let decision = self.cascade(&q, has_documents);
        tracing::debug!(
            "Intent {:?} (docs={}, web={}, fallback={})",
            decision.intent,
            decision.use_docs,
            decision.use_web,
            decision.fallback_to_web
        );
        decision
    }

    fn cascade(&self, q: &str, has_documents: bool) -> IntentDecision {
        if self.identity.is_match(q) {
            return IntentDecision::reply(Intent::Identity, pick(IDENTITY_REPLIES));
        }
        if self.capability.is_match(q) {
            return IntentDecision::reply(Intent::Capability, pick(CAPABILITY_REPLIES));
        }
        if self.comparison.is_match(q) {
            return IntentDecision::reply(Intent::Comparison, pick(COMPARISON_REPLIES));
        }
        if self.greeting.is_match(q) {
            return IntentDecision::reply(Intent::Greeting, pick(GREETING_REPLIES));
        }
        if self.gratitude.is_match(q) {
            return IntentDecision::reply(Intent::Gratitude, pick(GRATITUDE_REPLIES));
        }
        if self.farewell.is_match(q) {
            return IntentDecision::reply(Intent::Farewell, pick(FAREWELL_REPLIES));
        }

        if self.hybrid.is_match(q) {
            return IntentDecision::retrieve(Intent::Both, true, true, false);
        }

        if self.document.is_match(q) {
            return if has_documents {
                IntentDecision::retrieve(Intent::DocumentsOnly, true, false, false)
            } else {
                IntentDecision::reply(Intent::NoDocuments, pick(NO_DOCUMENTS_REPLIES))
            };
        }

        if self.ambiguous.is_match(q) {
            return if has_documents {
                IntentDecision::retrieve(Intent::DocumentsOnly, true, false, false)
            } else {
                IntentDecision::reply(Intent::Clarification, pick(CLARIFICATION_REPLIES))
            };
        }

        if self.general.is_match(q) {
            return IntentDecision::retrieve(Intent::WebOnly, false, true, false);
        }

        if has_documents {
            IntentDecision::retrieve(Intent::DocumentsOnly, true, false, true)
        } else {
            IntentDecision::reply(Intent::Clarification, pick(CLARIFICATION_REPLIES))
        }
    }
}
