//! Web search capability (Brave Search API).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::base::{require_args, Capability};

/// User-Agent header.
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_2) AppleWebKit/537.36 (KHTML, like Gecko)";

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// Default number of results.
const DEFAULT_MAX_RESULTS: u32 = 3;

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
}

// ─────────────────────────────────────────────
// SearchWebCapability
// ─────────────────────────────────────────────

/// Searches the web using the Brave Search API.
pub struct SearchWebCapability {
    api_key: Option<String>,
    max_results: u32,
    endpoint: String,
    client: Client,
}

impl SearchWebCapability {
    /// Create a new web search capability.
    ///
    /// `api_key` can be `None`; it will fall back to the `BRAVE_API_KEY` env var.
    pub fn new(api_key: Option<String>, max_results: Option<u32>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            max_results: max_results.unwrap_or(DEFAULT_MAX_RESULTS).clamp(1, 20),
            endpoint: BRAVE_ENDPOINT.to_string(),
            client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Point the capability at a different search endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("BRAVE_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

#[async_trait]
impl Capability for SearchWebCapability {
    fn name(&self) -> &str {
        "search_web"
    }

    fn documentation(&self) -> &str {
        "Search the internet for real-time information. Args format: \"query\" (e.g. \"latest bitcoin price\").
        Returns the top results (title, description, URL). Use it for current events, prices,
        or facts you don't know."
    }

    async fn execute(&self, args: &str) -> anyhow::Result<String> {
        let query = require_args(args, "search_web", "a query")?;

        let api_key = self.resolve_api_key().ok_or_else(|| {
            anyhow::anyhow!("No Brave API key configured (set tools.web.search.apiKey or BRAVE_API_KEY)")
        })?;

        debug!(query = %query, count = self.max_results, "searching web");
        let count = self.max_results.to_string();

        let resp = self
            .client
            .get(&self.endpoint)
            .header("X-Subscription-Token", &api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Brave API request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Brave API returned {status}: {body}");
        }

        let body: BraveResponse = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse Brave response: {e}"))?;

        let lines: Vec<String> = body
            .web
            .results
            .iter()
            .take(self.max_results as usize)
            .map(|r| {
                format!(
                    "- Title: {}\n  Description: {}\n  URL: {}",
                    r.title, r.description, r.url
                )
            })
            .collect();

        if lines.is_empty() {
            return Ok("No results found.".into());
        }
        Ok(lines.join("\n\n"))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
