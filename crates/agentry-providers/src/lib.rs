//! Oracle layer for Agentry.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`] — the text-completion oracle contract
//! - [`registry`] — static specs for the supported providers + matching logic
//! - [`http_provider::HttpProvider`] — generic OpenAI-compatible HTTP client
//! - [`http_provider::create_provider`] — convenience builder from model name + config

pub mod http_provider;
pub mod registry;
pub mod traits;

// Re-export main types for convenience
pub use http_provider::{create_provider, HttpProvider};
pub use registry::{ProviderConfig, ProviderSpec, PROVIDERS};
pub use traits::{is_oracle_error, LlmProvider, LlmRequestConfig, ORACLE_ERROR_MARKER};
