//! Config loader — reads `~/.agentry/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.agentry/config.json`
//! 3. Environment variables `AGENTRY_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Providers that accept `AGENTRY_PROVIDERS__<NAME>__*` overrides.
const PROVIDER_NAMES: &[&str] = &["ollama", "openai", "openrouter", "deepseek", "groq"];

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `AGENTRY_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `AGENTRY_AGENTS__DEFAULTS__MODEL` → `agents.defaults.model`
/// - `AGENTRY_AGENTS__DEFAULTS__PROVIDER` → `agents.defaults.provider`
/// - `AGENTRY_AGENTS__DEFAULTS__MAX_TOKENS` → `agents.defaults.max_tokens`
/// - `AGENTRY_AGENTS__DEFAULTS__TEMPERATURE` → `agents.defaults.temperature`
/// - `AGENTRY_AGENTS__DEFAULTS__SHORT_TERM_CAP` → `agents.defaults.short_term_cap`
/// - `AGENTRY_AGENTS__DEFAULTS__MAX_TOOL_RETRIES` → `agents.defaults.max_tool_retries`
/// - `AGENTRY_AGENTS__DEFAULTS__RECALL_TOP_K` → `agents.defaults.recall_top_k`
/// - `AGENTRY_AGENTS__DEFAULTS__MIN_RECORD_CHARS` → `agents.defaults.min_record_chars`
/// - `AGENTRY_AGENTS__DEFAULTS__WORKSPACE` → `agents.defaults.workspace`
/// - `AGENTRY_PROVIDERS__<NAME>__API_KEY` → `providers.<name>.api_key`
/// - `AGENTRY_PROVIDERS__<NAME>__API_BASE` → `providers.<name>.api_base`
/// - `AGENTRY_TOOLS__RESTRICT_TO_WORKSPACE` → `tools.restrict_to_workspace`
/// - `AGENTRY_MEMORY__PATH` → `memory.path`
fn apply_env_overrides(mut config: Config) -> Config {
    let defaults = &mut config.agents.defaults;
    if let Ok(val) = std::env::var("AGENTRY_AGENTS__DEFAULTS__MODEL") {
        defaults.model = val;
    }
    if let Ok(val) = std::env::var("AGENTRY_AGENTS__DEFAULTS__PROVIDER") {
        defaults.provider = Some(val);
    }
    if let Some(n) = env_parse::<u32>("AGENTRY_AGENTS__DEFAULTS__MAX_TOKENS") {
        defaults.max_tokens = n;
    }
    if let Some(t) = env_parse::<f64>("AGENTRY_AGENTS__DEFAULTS__TEMPERATURE") {
        defaults.temperature = t;
    }
    if let Some(n) = env_parse::<usize>("AGENTRY_AGENTS__DEFAULTS__SHORT_TERM_CAP") {
        defaults.short_term_cap = n;
    }
    if let Some(n) = env_parse::<u32>("AGENTRY_AGENTS__DEFAULTS__MAX_TOOL_RETRIES") {
        defaults.max_tool_retries = n;
    }
    if let Some(n) = env_parse::<usize>("AGENTRY_AGENTS__DEFAULTS__RECALL_TOP_K") {
        defaults.recall_top_k = n;
    }
    if let Some(n) = env_parse::<usize>("AGENTRY_AGENTS__DEFAULTS__MIN_RECORD_CHARS") {
        defaults.min_record_chars = n;
    }
    if let Ok(val) = std::env::var("AGENTRY_AGENTS__DEFAULTS__WORKSPACE") {
        defaults.workspace = val;
    }

    for name in PROVIDER_NAMES {
        if let Some(provider) = config.providers.get_by_name_mut(name) {
            apply_provider_env(provider, &name.to_uppercase());
        }
    }

    if let Ok(val) = std::env::var("AGENTRY_TOOLS__RESTRICT_TO_WORKSPACE") {
        config.tools.restrict_to_workspace = val == "true" || val == "1";
    }
    if let Ok(val) = std::env::var("AGENTRY_MEMORY__PATH") {
        config.memory.path = val;
    }

    config
}

/// Read and parse an env var, ignoring it if unparsable.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let val = std::env::var(key).ok()?;
    match val.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key = key, value = %val, "ignoring unparsable env override");
            None
        }
    }
}

/// Apply env var overrides for a single provider.
fn apply_provider_env(provider: &mut super::schema::ProviderConfig, name: &str) {
    if let Ok(val) = std::env::var(format!("AGENTRY_PROVIDERS__{name}__API_KEY")) {
        provider.api_key = val;
    }
    if let Ok(val) = std::env::var(format!("AGENTRY_PROVIDERS__{name}__API_BASE")) {
        provider.api_base = Some(val);
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
