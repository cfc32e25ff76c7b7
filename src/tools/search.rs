use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;

use crate::core::config::WebSettings;
use crate::core::errors::{Collaborator, CollaboratorError};

const DUCKDUCKGO_ENDPOINT: &str = "https://api.duckduckgo.com/";
const GOOGLE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// At most `max_results` results, best first.
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<WebResult>, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Provider {
    DuckDuckGo,
    Google { api_key: String, engine_id: String },
    Brave { api_key: String },
}

/// Web search over the public HTTP APIs. Google and Brave need keys; any
/// misconfiguration falls back to DuckDuckGo instant answers.
#[derive(Clone)]
pub struct HttpWebSearch {
    provider: Provider,
    client: Client,
}

impl HttpWebSearch {
    pub fn from_settings(settings: &WebSettings) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| CollaboratorError::other(Collaborator::WebSearch, e))?;

        Ok(Self {
            provider: select_provider(settings),
            client,
        })
    }

    pub fn provider_name(&self) -> &'static str {
        match self.provider {
            Provider::DuckDuckGo => "duckduckgo",
            Provider::Google { .. } => "google",
            Provider::Brave { .. } => "brave",
        }
    }

    async fn fetch_json(&self, builder: RequestBuilder) -> Result<Value, CollaboratorError> {
        let response = builder
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(Collaborator::WebSearch, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status(
                Collaborator::WebSearch,
                status,
                &body,
            ));
        }

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::from_reqwest(Collaborator::WebSearch, e))
    }
}

#[async_trait]
impl WebSearch for HttpWebSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<WebResult>, CollaboratorError> {
        if max_results == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut results = match &self.provider {
            Provider::DuckDuckGo => {
                let url = format!(
                    "{}?q={}&format=json&no_redirect=1&no_html=1&skip_disambig=1",
                    DUCKDUCKGO_ENDPOINT,
                    urlencoding::encode(query)
                );
                let payload = self.fetch_json(self.client.get(url)).await?;
                parse_duckduckgo(&payload, query)
            }
            Provider::Google { api_key, engine_id } => {
                let url = format!(
                    "{}?key={}&cx={}&q={}&num={}",
                    GOOGLE_ENDPOINT,
                    urlencoding::encode(api_key),
                    urlencoding::encode(engine_id),
                    urlencoding::encode(query),
                    max_results.min(10)
                );
                let payload = self.fetch_json(self.client.get(url)).await?;
                parse_items(&payload["items"], "link", "snippet")
            }
            Provider::Brave { api_key } => {
                let url = format!(
                    "{}?q={}&count={}",
                    BRAVE_ENDPOINT,
                    urlencoding::encode(query),
                    max_results.min(20)
                );
                let builder = self
                    .client
                    .get(url)
                    .header("X-Subscription-Token", api_key)
                    .header("Accept", "application/json");
                let payload = self.fetch_json(builder).await?;
                parse_items(&payload["web"]["results"], "url", "description")
            }
        };

        results.truncate(max_results);
        tracing::debug!(
            "Web search via {} found {} results",
            self.provider_name(),
            results.len()
        );
        Ok(results)
    }
}

fn select_provider(settings: &WebSettings) -> Provider {
    let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());

    match settings.provider.to_lowercase().as_str() {
        "google" => match (
            non_empty(&settings.google_api_key),
            non_empty(&settings.google_engine_id),
        ) {
            (Some(api_key), Some(engine_id)) => Provider::Google { api_key, engine_id },
            _ => {
                tracing::warn!("Google search selected without key/engine id, using DuckDuckGo");
                Provider::DuckDuckGo
            }
        },
        "brave" => match non_empty(&settings.brave_api_key) {
            Some(api_key) => Provider::Brave { api_key },
            None => {
                tracing::warn!("Brave search selected without key, using DuckDuckGo");
                Provider::DuckDuckGo
            }
        },
        _ => Provider::DuckDuckGo,
    }
}

fn parse_items(items: &Value, url_key: &str, snippet_key: &str) -> Vec<WebResult> {
    let Some(items) = items.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let url = item.get(url_key).and_then(|v| v.as_str()).unwrap_or("");
            let snippet = item.get(snippet_key).and_then(|v| v.as_str()).unwrap_or("");
            if title.is_empty() || url.is_empty() {
                return None;
            }
            Some(WebResult {
                title: title.to_string(),
                url: url.to_string(),
                snippet: snippet.to_string(),
            })
        })
        .collect()
}

/// Abstract first, then related topics (flattening nested groups), then the
/// dictionary definition.
fn parse_duckduckgo(payload: &Value, query: &str) -> Vec<WebResult> {
    let mut results = Vec::new();

    let abstract_text = payload["Abstract"]
        .as_str()
        .filter(|t| !t.is_empty())
        .or_else(|| payload["AbstractText"].as_str().filter(|t| !t.is_empty()));
    if let Some(text) = abstract_text {
        let heading = payload["Heading"].as_str().unwrap_or("");
        results.push(WebResult {
            title: if heading.is_empty() {
                topic_title(text)
            } else {
                heading.to_string()
            },
            url: payload["AbstractURL"].as_str().unwrap_or("").to_string(),
            snippet: text.to_string(),
        });
    }

    if let Some(items) = payload["Results"].as_array() {
        extract_topics(items, &mut results);
    }
    if let Some(items) = payload["RelatedTopics"].as_array() {
        extract_topics(items, &mut results);
    }

    if let Some(definition) = payload["Definition"].as_str().filter(|d| !d.is_empty()) {
        results.push(WebResult {
            title: format!("Definition: {}", query),
            url: payload["DefinitionURL"].as_str().unwrap_or("").to_string(),
            snippet: definition.to_string(),
        });
    }

    results
}

fn extract_topics(items: &[Value], results: &mut Vec<WebResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(WebResult {
            title: topic_title(text),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

fn topic_title(text: &str) -> String {
    let head = text.split(" - ").next().unwrap_or(text);
    head.chars().take(80).collect()
}
