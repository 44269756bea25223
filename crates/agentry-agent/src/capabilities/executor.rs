//! Capability Executor — runs a named capability and normalizes every outcome
//! into a [`CapabilityResult`].
//!
//! Handler errors and panics never escape. Success is decided here, not by
//! the capability: an `Err` is always a failure, and `Ok` text goes through
//! the configurable [`FailureClassifier`].

use std::sync::Arc;

use tracing::{debug, warn};

use agentry_core::config::schema::{default_failure_markers, FailureMatch, ToolsConfig};

use super::registry::CapabilityRegistry;

/// Outcome of one dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityResult {
    pub text: String,
    pub success: bool,
}

impl CapabilityResult {
    fn failure(text: String) -> Self {
        Self {
            text,
            success: false,
        }
    }
}

// ─────────────────────────────────────────────
// FailureClassifier
// ─────────────────────────────────────────────

/// Case-insensitive marker heuristic applied to successful handler output.
///
/// An empty marker list disables the heuristic entirely.
#[derive(Clone, Debug)]
pub struct FailureClassifier {
    markers: Vec<String>,
    mode: FailureMatch,
}

impl FailureClassifier {
    pub fn new(markers: &[String], mode: FailureMatch) -> Self {
        Self {
            markers: markers
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
            mode,
        }
    }

    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self::new(&tools.failure_markers, tools.failure_match)
    }

    /// Only structured `Err` results count as failures.
    pub fn disabled() -> Self {
        Self::new(&[], FailureMatch::Prefix)
    }

    /// Whether `Ok` output should nevertheless be treated as a failure.
    pub fn is_failure(&self, text: &str) -> bool {
        let lower = text.trim().to_lowercase();
        match self.mode {
            FailureMatch::Prefix => self.markers.iter().any(|m| lower.starts_with(m.as_str())),
            FailureMatch::Contains => self.markers.iter().any(|m| lower.contains(m.as_str())),
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(&default_failure_markers(), FailureMatch::Prefix)
    }
}

// ─────────────────────────────────────────────
// CapabilityExecutor
// ─────────────────────────────────────────────

/// Resolves names against the shared registry and runs handlers in isolation.
#[derive(Clone, Debug)]
pub struct CapabilityExecutor {
    registry: Arc<CapabilityRegistry>,
    classifier: FailureClassifier,
}

impl CapabilityExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, classifier: FailureClassifier) -> Self {
        Self {
            registry,
            classifier,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Run `action` with `args`. Never fails; failures are reported in the result.
    pub async fn execute(&self, action: &str, args: &str) -> CapabilityResult {
        let Some(capability) = self.registry.get(action) else {
            warn!(capability = action, "capability not found");
            return CapabilityResult::failure(format!("Error: unknown capability '{action}'"));
        };

        let owned_args = args.to_string();
        // The task boundary turns a panicking handler into a JoinError.
        let handle = tokio::spawn(async move { capability.execute(&owned_args).await });

        match handle.await {
            Ok(Ok(text)) => {
                let success = !self.classifier.is_failure(&text);
                debug!(
                    capability = action,
                    success = success,
                    result_len = text.len(),
                    "capability finished"
                );
                CapabilityResult { text, success }
            }
            Ok(Err(e)) => {
                warn!(capability = action, error = %e, "capability failed");
                CapabilityResult::failure(format!("Error: {e}"))
            }
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "task was cancelled".to_string()
                };
                warn!(capability = action, reason = %reason, "capability panicked");
                CapabilityResult::failure(format!("Error: capability '{action}' crashed: {reason}"))
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
