//! Prompt assembly.
//!
//! Documents are grouped by source so the model can relate chunks of the
//! same file; web snippets get their own section so document citations and
//! web citations never mix.

use super::index::SearchResult;
use crate::llm::{ChatMessage, ChatRequest};
use crate::tools::WebResult;

const SYSTEM_PROMPT: &str = "You are a friendly and helpful assistant that answers questions \
using the user's documents and, when provided, web search results.

Rules:
1. Only use information from the provided context to answer.
2. When you use a document, cite it like this: (Source: filename.txt). When you use a web \
result, cite its title.
3. If the context does not contain the answer, say: \"I couldn't find information about that \
in your documents. Try uploading more relevant documents or rephrasing your question.\"
4. Never make up information and never show empty fields or placeholders.
5. Use the exact terminology of the documents for headings and labels.
6. Keep answers concise but complete; use bold headers and bullet points where they help.";

const NO_CONTEXT: &str = "No relevant documents found.";

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

impl ContextBuilder {
    pub fn with_system_prompt(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    /// `[DOCUMENT i: source]` blocks in first-appearance order, chunks of one
    /// source joined by blank lines.
    pub fn document_context(&self, docs: &[SearchResult]) -> String {
        let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
        for doc in docs {
            match grouped.iter_mut().find(|(source, _)| *source == doc.source) {
                Some((_, contents)) => contents.push(doc.content.as_str()),
                None => grouped.push((doc.source.as_str(), vec![doc.content.as_str()])),
            }
        }

        let mut parts = Vec::new();
        if grouped.len() > 1 {
            parts.push(format!(
                "=== MULTIPLE DOCUMENTS PROVIDED ({} documents) ===\n\
                 Analyze these documents for relationships, shared entities, and connections.",
                grouped.len()
            ));
        }
        for (i, (source, contents)) in grouped.iter().enumerate() {
            parts.push(format!(
                "[DOCUMENT {}: {}]\n{}",
                i + 1,
                source,
                contents.join("\n\n")
            ));
        }
        parts.join("\n\n---\n\n")
    }

    pub fn web_context(&self, web: &[WebResult]) -> String {
        web.iter()
            .enumerate()
            .map(|(i, result)| {
                if result.url.is_empty() {
                    format!("[WEB {}: {}]\n{}", i + 1, result.title, result.snippet)
                } else {
                    format!(
                        "[WEB {}: {}]\n{}\n(URL: {})",
                        i + 1,
                        result.title,
                        result.snippet,
                        result.url
                    )
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn combined_context(&self, docs: &[SearchResult], web: &[WebResult]) -> String {
        let mut sections = Vec::new();
        if !docs.is_empty() {
            sections.push(format!(
                "Here are the relevant sections from my documents:\n\n{}",
                self.document_context(docs)
            ));
        }
        if !web.is_empty() {
            sections.push(format!(
                "Here are web search results:\n\n{}",
                self.web_context(web)
            ));
        }
        if sections.is_empty() {
            return NO_CONTEXT.to_string();
        }
        sections.join("\n\n===\n\n")
    }

    /// System prompt, prior turns, then the question with its context.
    pub fn request(
        &self,
        question: &str,
        docs: &[SearchResult],
        web: &[WebResult],
        history: &[ChatMessage],
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(format!(
            "{}\n\n---\n\nMy question: {}",
            self.combined_context(docs, web),
            question
        )));
        ChatRequest::new(messages)
    }
}
