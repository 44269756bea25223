//! LLM Provider trait — the text-completion oracle the agent loop talks to.
//!
//! The contract is deliberately narrow: ordered messages in, text out.
//! Failures never propagate as errors; they come back as text starting with
//! [`ORACLE_ERROR_MARKER`].

use async_trait::async_trait;
use agentry_core::types::Message;

/// Prefix of every diagnostic reply produced when the oracle call itself failed.
pub const ORACLE_ERROR_MARKER: &str = "[LLM Error]";

/// Configuration passed to each LLM call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and return the assistant's text.
    ///
    /// # Arguments
    /// * `messages` — Ordered conversation (system first, current user last).
    /// * `model`    — Model identifier (e.g. `"gpt-oss:20b"`, `"gpt-4o"`).
    /// * `config`   — Temperature, max_tokens, etc.
    ///
    /// # Returns
    /// The reply text, possibly empty. On transport or API errors, returns a
    /// string built with [`oracle_error`] instead of propagating.
    async fn chat(&self, messages: &[Message], model: &str, config: &LlmRequestConfig) -> String;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}

/// Build a diagnostic reply for a failed oracle call.
pub fn oracle_error(detail: impl std::fmt::Display) -> String {
    format!("{ORACLE_ERROR_MARKER} {detail}")
}

/// Whether a reply is a diagnostic produced by a failed oracle call.
pub fn is_oracle_error(text: &str) -> bool {
    text.trim_start().starts_with(ORACLE_ERROR_MARKER)
}
