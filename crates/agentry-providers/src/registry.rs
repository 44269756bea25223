//! Provider registry — static specs for the supported LLM providers.
//!
//! Each `ProviderSpec` describes how to reach one OpenAI-compatible endpoint:
//! keywords for model matching, env var names, default API base.

use std::collections::HashMap;

// ─────────────────────────────────────────────
// ProviderSpec — static metadata for one provider
// ─────────────────────────────────────────────

/// Static specification describing one LLM provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Internal name (e.g. `"openrouter"`).
    pub name: &'static str,
    /// Keywords to match in model names (lowercase).
    pub keywords: &'static [&'static str],
    /// Environment variable conventionally holding the API key.
    pub env_key: &'static str,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Whether this is a gateway/aggregator, used as fallback when no direct match is found.
    pub is_gateway: bool,
    /// Whether this is a local/self-hosted provider that needs no API key.
    pub is_local: bool,
    /// If the API key starts with this prefix, auto-detect this provider.
    pub detect_by_key_prefix: Option<&'static str>,
    /// Default API base URL.
    pub default_api_base: &'static str,
}

impl ProviderSpec {
    /// Whether this provider can be used with the given config.
    pub fn is_usable(&self, config: &ProviderConfig) -> bool {
        self.is_local || config.is_configured()
    }
}

/// Supported provider specifications, in matching priority order.
///
/// Ollama comes first so local model tags such as `gpt-oss:20b` don't get
/// claimed by the hosted OpenAI spec.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "ollama",
        keywords: &["ollama", "gpt-oss", "llama", "qwen", "mistral", "gemma", "phi"],
        env_key: "OLLAMA_API_KEY",
        display_name: "Ollama",
        is_gateway: false,
        is_local: true,
        detect_by_key_prefix: None,
        default_api_base: "http://localhost:11434/v1",
    },
    ProviderSpec {
        name: "openrouter",
        keywords: &["openrouter"],
        env_key: "OPENROUTER_API_KEY",
        display_name: "OpenRouter",
        is_gateway: true,
        is_local: false,
        detect_by_key_prefix: Some("sk-or-"),
        default_api_base: "https://openrouter.ai/api/v1",
    },
    ProviderSpec {
        name: "openai",
        keywords: &["openai", "gpt", "o1", "o3"],
        env_key: "OPENAI_API_KEY",
        display_name: "OpenAI",
        is_gateway: false,
        is_local: false,
        detect_by_key_prefix: None,
        default_api_base: "https://api.openai.com/v1",
    },
    ProviderSpec {
        name: "deepseek",
        keywords: &["deepseek"],
        env_key: "DEEPSEEK_API_KEY",
        display_name: "DeepSeek",
        is_gateway: false,
        is_local: false,
        detect_by_key_prefix: None,
        default_api_base: "https://api.deepseek.com/v1",
    },
    ProviderSpec {
        name: "groq",
        keywords: &["groq"],
        env_key: "GROQ_API_KEY",
        display_name: "Groq",
        is_gateway: false,
        is_local: false,
        detect_by_key_prefix: None,
        default_api_base: "https://api.groq.com/openai/v1",
    },
];

// ─────────────────────────────────────────────
// Matching functions
// ─────────────────────────────────────────────

/// Find a provider spec by matching keywords against a model name.
///
/// Skips gateways — those are fallback only.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let model_lower = model.to_lowercase();
    PROVIDERS.iter().find(|spec| {
        !spec.is_gateway && spec.keywords.iter().any(|kw| model_lower.contains(kw))
    })
}

/// Find a provider spec by exact name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// Find a gateway whose key-prefix signature matches `api_key`.
pub fn find_gateway_by_key(api_key: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|s| {
        s.is_gateway
            && s.detect_by_key_prefix
                .map_or(false, |pfx| api_key.starts_with(pfx))
    })
}

/// Re-export the provider config from core — single source of truth.
pub use agentry_core::config::schema::ProviderConfig;

/// Pick the provider for a model.
///
/// 1. Explicit provider name, if given (unknown name → `None`).
/// 2. Keyword match on the model, if that provider is usable.
/// 3. First configured gateway.
/// 4. The local Ollama endpoint.
pub fn match_provider(
    model: &str,
    explicit: Option<&str>,
    providers: &HashMap<String, ProviderConfig>,
) -> Option<(ProviderConfig, &'static ProviderSpec)> {
    let config_for = |spec: &ProviderSpec| providers.get(spec.name).cloned().unwrap_or_default();

    if let Some(name) = explicit {
        let spec = find_by_name(name)?;
        return Some((config_for(spec), spec));
    }

    if let Some(spec) = find_by_model(model) {
        let config = config_for(spec);
        if spec.is_usable(&config) {
            return Some((config, spec));
        }
    }

    // A gateway key may sit under any provider slot (e.g. an OpenRouter key in `openai`).
    for config in providers.values().filter(|c| c.is_configured()) {
        if let Some(spec) = find_gateway_by_key(&config.api_key) {
            return Some((config.clone(), spec));
        }
    }

    if let Some(found) = PROVIDERS.iter().filter(|s| s.is_gateway).find_map(|spec| {
        let config = config_for(spec);
        config.is_configured().then_some((config, spec))
    }) {
        return Some(found);
    }

    let local = find_by_name("ollama")?;
    Some((config_for(local), local))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(pairs: &[(&str, &str)]) -> HashMap<String, ProviderConfig> {
        pairs
            .iter()
            .map(|(name, key)| {
                (
                    name.to_string(),
                    ProviderConfig {
                        api_key: key.to_string(),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_find_by_model_local_tag() {
        assert_eq!(find_by_model("gpt-oss:20b").unwrap().name, "ollama");
        assert_eq!(find_by_model("qwen2.5:7b").unwrap().name, "ollama");
    }

    #[test]
    fn test_find_by_model_hosted() {
        assert_eq!(find_by_model("gpt-4o-mini").unwrap().name, "openai");
        assert_eq!(find_by_model("deepseek-chat").unwrap().name, "deepseek");
        assert_eq!(find_by_model("groq/whatever").unwrap().name, "groq");
    }

    #[test]
    fn test_find_by_model_unknown() {
        assert!(find_by_model("some-random-model-xyz").is_none());
    }

    #[test]
    fn test_find_by_name() {
        let spec = find_by_name("deepseek").unwrap();
        assert_eq!(spec.display_name, "DeepSeek");
        assert_eq!(spec.env_key, "DEEPSEEK_API_KEY");
    }

    #[test]
    fn test_find_gateway_by_key() {
        assert_eq!(find_gateway_by_key("sk-or-abc123").unwrap().name, "openrouter");
        assert!(find_gateway_by_key("sk-abc123").is_none());
    }

    #[test]
    fn test_match_local_needs_no_key() {
        let (_, spec) = match_provider("gpt-oss:20b", None, &HashMap::new()).unwrap();
        assert_eq!(spec.name, "ollama");
    }

    #[test]
    fn test_match_hosted_with_key() {
        let providers = configured(&[("openai", "sk-test")]);
        let (config, spec) = match_provider("gpt-4o", None, &providers).unwrap();
        assert_eq!(spec.name, "openai");
        assert_eq!(config.api_key, "sk-test");
    }

    #[test]
    fn test_match_falls_back_to_gateway() {
        let providers = configured(&[("openrouter", "sk-or-xyz")]);
        let (_, spec) = match_provider("deepseek-chat", None, &providers).unwrap();
        assert_eq!(spec.name, "openrouter");
    }

    #[test]
    fn test_match_detects_gateway_key_in_other_slot() {
        let providers = configured(&[("openai", "sk-or-xyz")]);
        let (config, spec) = match_provider("claude-3", None, &providers).unwrap();
        assert_eq!(spec.name, "openrouter");
        assert_eq!(config.api_key, "sk-or-xyz");
    }

    #[test]
    fn test_match_falls_back_to_ollama() {
        let (_, spec) = match_provider("gpt-4o", None, &HashMap::new()).unwrap();
        assert_eq!(spec.name, "ollama");
    }

    #[test]
    fn test_match_explicit() {
        let providers = configured(&[("groq", "gsk")]);
        let (_, spec) = match_provider("llama-3.3-70b", Some("groq"), &providers).unwrap();
        assert_eq!(spec.name, "groq");
        assert!(match_provider("llama", Some("nope"), &providers).is_none());
    }
}
