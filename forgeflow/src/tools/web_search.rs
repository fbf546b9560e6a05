//! Web search tool over a pluggable backend.

use super::{Tool, ToolDefinition};
use crate::errors::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Registry name of the web search tool.
pub const WEB_SEARCH_TOOL: &str = "web_search";

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub url: String,
    /// Text snippet, possibly empty.
    #[serde(default)]
    pub snippet: String,
}

/// Anything that can answer a search query.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Returns up to `max_results` hits for `query`.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError>;
}

/// Exposes a [`SearchBackend`] as the `web_search` tool.
#[derive(Clone)]
pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
    default_results: usize,
    max_results: usize,
}

impl WebSearchTool {
    /// Creates the tool over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            default_results: 5,
            max_results: 10,
        }
    }

    /// Caps the number of results a call may ask for.
    #[must_use]
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max.max(1);
        self.default_results = self.default_results.min(self.max_results);
        self
    }
}

impl std::fmt::Debug for WebSearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchTool")
            .field("default_results", &self.default_results)
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(WEB_SEARCH_TOOL)
            .with_description("Search the web and return titles, URLs and snippets.")
            .with_parameters(json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "max_results": {"type": "integer", "minimum": 1, "maximum": self.max_results}
                },
                "required": ["query"]
            }))
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                ToolError::invalid_arguments(WEB_SEARCH_TOOL, "query must be a non-empty string")
            })?;
        let limit = args
            .get("max_results")
            .and_then(Value::as_u64)
            .map_or(self.default_results, |n| {
                usize::try_from(n).unwrap_or(usize::MAX)
            })
            .clamp(1, self.max_results);

        let mut hits = self.backend.search(query, limit).await?;
        hits.truncate(limit);
        Ok(json!({ "query": query, "results": hits }))
    }
}

#[cfg(feature = "http")]
pub use html::{HtmlSearchBackend, HtmlSearchConfig};

#[cfg(feature = "http")]
mod html {
    use super::{SearchBackend, SearchHit, WEB_SEARCH_TOOL};
    use crate::errors::ToolError;
    use async_trait::async_trait;
    use scraper::{Html, Selector};
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use tracing::debug;

    /// Settings of the HTML results-page backend.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct HtmlSearchConfig {
        /// Results page endpoint; the query is sent as `q`.
        #[serde(default = "default_endpoint")]
        pub endpoint: String,
        /// User agent header.
        #[serde(default = "default_user_agent")]
        pub user_agent: String,
        /// Request timeout in milliseconds.
        #[serde(default = "default_timeout_ms")]
        pub timeout_ms: u64,
    }

    fn default_endpoint() -> String {
        "https://html.duckduckgo.com/html/".to_string()
    }

    fn default_user_agent() -> String {
        format!("forgeflow/{}", env!("CARGO_PKG_VERSION"))
    }

    fn default_timeout_ms() -> u64 {
        15_000
    }

    impl Default for HtmlSearchConfig {
        fn default() -> Self {
            Self {
                endpoint: default_endpoint(),
                user_agent: default_user_agent(),
                timeout_ms: default_timeout_ms(),
            }
        }
    }

    /// Scrapes an HTML search results page.
    #[derive(Debug, Clone)]
    pub struct HtmlSearchBackend {
        client: reqwest::Client,
        config: HtmlSearchConfig,
    }

    impl HtmlSearchBackend {
        /// Creates a backend.
        pub fn new(config: HtmlSearchConfig) -> Result<Self, ToolError> {
            let client = reqwest::Client::builder()
                .user_agent(config.user_agent.clone())
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .map_err(|e| ToolError::execution_failed(WEB_SEARCH_TOOL, e.to_string()))?;
            Ok(Self { client, config })
        }
    }

    /// Extracts hits from a results page.
    pub(crate) fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
        let document = Html::parse_document(html);
        let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
            Selector::parse(".result"),
            Selector::parse("a.result__a"),
            Selector::parse(".result__snippet"),
        ) else {
            return Vec::new();
        };

        document
            .select(&result_sel)
            .filter_map(|result| {
                let link = result.select(&link_sel).next()?;
                let url = link.value().attr("href")?.to_string();
                let title = link.text().collect::<String>().trim().to_string();
                let snippet = result
                    .select(&snippet_sel)
                    .next()
                    .map(|s| s.text().collect::<String>().trim().to_string())
                    .unwrap_or_default();
                (!title.is_empty()).then_some(SearchHit {
                    title,
                    url,
                    snippet,
                })
            })
            .take(max_results)
            .collect()
    }

    #[async_trait]
    impl SearchBackend for HtmlSearchBackend {
        async fn search(
            &self,
            query: &str,
            max_results: usize,
        ) -> Result<Vec<SearchHit>, ToolError> {
            let response = self
                .client
                .get(&self.config.endpoint)
                .query(&[("q", query)])
                .send()
                .await
                .map_err(|e| ToolError::execution_failed(WEB_SEARCH_TOOL, e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ToolError::execution_failed(
                    WEB_SEARCH_TOOL,
                    format!("search endpoint returned {status}"),
                ));
            }
            let body = response
                .text()
                .await
                .map_err(|e| ToolError::execution_failed(WEB_SEARCH_TOOL, e.to_string()))?;

            let hits = parse_results(&body, max_results);
            debug!(query = %query, hits = hits.len(), "Search results parsed");
            Ok(hits)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const PAGE: &str = r#"
            <html><body>
              <div class="result">
                <a class="result__a" href="https://docs.rs/tokio">tokio - Rust</a>
                <a class="result__snippet">An event-driven, non-blocking I/O platform.</a>
              </div>
              <div class="result">
                <a class="result__a" href="https://tokio.rs">Tokio</a>
              </div>
              <div class="result"><span>ad without link</span></div>
            </body></html>"#;

        #[test]
        fn test_parse_results() {
            let hits = parse_results(PAGE, 10);

            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].title, "tokio - Rust");
            assert_eq!(hits[0].url, "https://docs.rs/tokio");
            assert_eq!(hits[0].snippet, "An event-driven, non-blocking I/O platform.");
            assert_eq!(hits[1].snippet, "");
        }

        #[test]
        fn test_parse_results_respects_limit() {
            assert_eq!(parse_results(PAGE, 1).len(), 1);
        }

        #[test]
        fn test_backend_builds_with_defaults() {
            assert!(HtmlSearchBackend::new(HtmlSearchConfig::default()).is_ok());
        }
    }
}
