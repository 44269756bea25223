//! Generic HTTP-based LLM provider for OpenAI-compatible APIs.
//!
//! Talks directly to any `/chat/completions` endpoint: a local Ollama server,
//! OpenAI, OpenRouter, DeepSeek or Groq.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use agentry_core::types::Message;

use crate::registry::{ProviderConfig, ProviderSpec};
use crate::traits::{oracle_error, LlmProvider, LlmRequestConfig};

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// A generic LLM provider that talks to any OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"http://localhost:11434/v1"`).
    api_base: String,
    /// API key for Bearer authentication; empty for local servers.
    api_key: String,
    /// Default model for this provider instance.
    default_model: String,
    /// Extra headers to send with each request.
    extra_headers: HeaderMap,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .field("provider", &self.spec.display_name)
            .finish()
    }
}

impl HttpProvider {
    /// Create a new HttpProvider from a provider config and spec.
    ///
    /// # Arguments
    /// * `config`  — User's config (api_key, api_base, extra_headers)
    /// * `spec`    — Static provider spec from the registry
    /// * `model`   — The default model to use
    pub fn new(config: &ProviderConfig, spec: &'static ProviderSpec, model: &str) -> Self {
        // config > spec default
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| spec.default_api_base.to_string());

        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!("Invalid header: {}={}", key, value);
                }
            }
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        HttpProvider {
            client,
            api_base,
            api_key: config.api_key.clone(),
            default_model: model.to_string(),
            extra_headers,
            spec,
        }
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(&self, messages: &[Message], model: &str, config: &LlmRequestConfig) -> String {
        debug!(
            provider = self.spec.display_name,
            model = model,
            messages = messages.len(),
            "Calling LLM"
        );

        let request_body = ChatCompletionRequest {
            model,
            messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        let mut request = self
            .client
            .post(self.completions_url())
            .headers(self.extra_headers.clone())
            .json(&request_body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!(provider = self.spec.display_name, error = %e, "HTTP request failed");
                return oracle_error(e);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(
                provider = self.spec.display_name,
                status = %status,
                body = %error_text,
                "API error"
            );
            return oracle_error(format!("{} — {}", status, error_text));
        }

        match response.json::<ChatCompletionResponse>().await {
            Ok(chat_resp) => {
                let Some(choice) = chat_resp.choices.into_iter().next() else {
                    warn!(provider = self.spec.display_name, "Response had no choices");
                    return String::new();
                };
                debug!(
                    provider = self.spec.display_name,
                    finish_reason = choice.finish_reason.as_deref().unwrap_or("?"),
                    "LLM response received"
                );
                choice.message.content.unwrap_or_default()
            }
            Err(e) => {
                error!(
                    provider = self.spec.display_name,
                    error = %e,
                    "Failed to parse LLM response"
                );
                oracle_error(format!("unreadable response: {}", e))
            }
        }
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        self.spec.display_name
    }
}

// ─────────────────────────────────────────────
// Builder (convenience)
// ─────────────────────────────────────────────

/// Build an HttpProvider from a model name and a map of provider configs.
///
/// This is the main entry point — it matches the model (or the explicitly
/// named provider) to a spec, reads the config, and creates the HttpProvider.
pub fn create_provider(
    model: &str,
    provider_name: Option<&str>,
    providers: &HashMap<String, ProviderConfig>,
) -> anyhow::Result<HttpProvider> {
    let (config, spec) = crate::registry::match_provider(model, provider_name, providers)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown provider '{}' for model '{}'. Expected one of: ollama, openai, openrouter, deepseek, groq.",
                provider_name.unwrap_or_default(),
                model
            )
        })?;

    debug!(
        provider = spec.display_name,
        model = model,
        api_base = config.api_base.as_deref().unwrap_or(spec.default_api_base),
        "Creating LLM provider"
    );

    Ok(HttpProvider::new(&config, spec, model))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::find_by_name;
    use crate::traits::is_oracle_error;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config(api_key: &str, api_base: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            api_key: api_key.to_string(),
            api_base: api_base.map(String::from),
            extra_headers: None,
        }
    }

    fn completion(content: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-test",
            "choices": [{
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        }))
    }

    // ── Unit tests ──

    #[test]
    fn test_completions_url_trailing_slash() {
        let spec = find_by_name("openai").unwrap();
        let config = make_config("key", Some("https://api.openai.com/v1/"));
        let provider = HttpProvider::new(&config, spec, "gpt-4o");
        assert_eq!(
            provider.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_default_api_base_for_local() {
        let spec = find_by_name("ollama").unwrap();
        let provider = HttpProvider::new(&ProviderConfig::default(), spec, "gpt-oss:20b");
        assert_eq!(provider.api_base, "http://localhost:11434/v1");
    }

    #[test]
    fn test_config_overrides_default_base() {
        let spec = find_by_name("openrouter").unwrap();
        let config = make_config("sk-or-abc", Some("https://custom.proxy.com/v1"));
        let provider = HttpProvider::new(&config, spec, "meta-llama/llama-3");
        assert_eq!(provider.api_base, "https://custom.proxy.com/v1");
    }

    #[test]
    fn test_extra_headers() {
        let spec = find_by_name("openrouter").unwrap();
        let mut headers = HashMap::new();
        headers.insert("HTTP-Referer".to_string(), "https://agentry.local".to_string());
        let config = ProviderConfig {
            api_key: "key".to_string(),
            api_base: None,
            extra_headers: Some(headers),
        };
        let provider = HttpProvider::new(&config, spec, "gpt-4o");
        assert!(provider.extra_headers.contains_key("http-referer"));
    }

    // ── Integration tests with mock server ──

    #[tokio::test]
    async fn test_chat_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .respond_with(completion(serde_json::json!("Hello! I'm Agentry.")))
            .mount(&mock_server)
            .await;

        let spec = find_by_name("openai").unwrap();
        let config = make_config("test-key-123", Some(&mock_server.uri()));
        let provider = HttpProvider::new(&config, spec, "gpt-4o");

        let messages = vec![Message::system("You are Agentry."), Message::user("Hello")];
        let reply = provider
            .chat(&messages, "gpt-4o", &LlmRequestConfig::default())
            .await;

        assert_eq!(reply, "Hello! I'm Agentry.");
    }

    #[tokio::test]
    async fn test_chat_sends_correct_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-oss:20b",
                "max_tokens": 4096,
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "test" }
                ]
            })))
            .respond_with(completion(serde_json::json!("ok")))
            .mount(&mock_server)
            .await;

        let spec = find_by_name("ollama").unwrap();
        let config = make_config("", Some(&mock_server.uri()));
        let provider = HttpProvider::new(&config, spec, "gpt-oss:20b");

        let messages = vec![Message::system("sys"), Message::user("test")];
        let reply = provider
            .chat(&messages, "gpt-oss:20b", &LlmRequestConfig::default())
            .await;

        // If the body matcher fails, wiremock returns 404 → we'd get an error
        assert_eq!(reply, "ok");
    }

    #[tokio::test]
    async fn test_chat_null_content_is_empty() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion(serde_json::Value::Null))
            .mount(&mock_server)
            .await;

        let spec = find_by_name("ollama").unwrap();
        let config = make_config("", Some(&mock_server.uri()));
        let provider = HttpProvider::new(&config, spec, "qwen2.5");

        let reply = provider
            .chat(&[Message::user("hi")], "qwen2.5", &LlmRequestConfig::default())
            .await;
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn test_chat_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": "Rate limit exceeded", "type": "rate_limit_error" }
            })))
            .mount(&mock_server)
            .await;

        let spec = find_by_name("openai").unwrap();
        let config = make_config("key", Some(&mock_server.uri()));
        let provider = HttpProvider::new(&config, spec, "gpt-4o");

        let reply = provider
            .chat(&[Message::user("Hello")], "gpt-4o", &LlmRequestConfig::default())
            .await;

        // Should return a diagnostic, not panic
        assert!(is_oracle_error(&reply));
        assert!(reply.contains("429"));
    }

    #[tokio::test]
    async fn test_chat_network_error() {
        // Point to a port that's not listening
        let spec = find_by_name("ollama").unwrap();
        let config = make_config("", Some("http://127.0.0.1:1"));
        let provider = HttpProvider::new(&config, spec, "gpt-oss:20b");

        let reply = provider
            .chat(&[Message::user("Hello")], "gpt-oss:20b", &LlmRequestConfig::default())
            .await;

        assert!(is_oracle_error(&reply));
    }

    // ── create_provider ──

    #[test]
    fn test_create_provider_local_default() {
        let provider = create_provider("gpt-oss:20b", None, &HashMap::new()).unwrap();
        assert_eq!(provider.display_name(), "Ollama");
        assert_eq!(provider.default_model(), "gpt-oss:20b");
    }

    #[test]
    fn test_create_provider_keyed() {
        let mut providers = HashMap::new();
        providers.insert("deepseek".to_string(), make_config("ds-key", None));

        let provider = create_provider("deepseek-chat", None, &providers).unwrap();
        assert_eq!(provider.display_name(), "DeepSeek");
    }

    #[test]
    fn test_create_provider_unknown_name() {
        let err = create_provider("gpt-4o", Some("nowhere"), &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }
}
