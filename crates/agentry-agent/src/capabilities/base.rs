//! Capability trait — the string-in/string-out interface every agent action implements.

use async_trait::async_trait;

use agentry_core::utils::collapse_whitespace;

// ─────────────────────────────────────────────
// Capability trait
// ─────────────────────────────────────────────

/// Every agent capability implements this trait.
///
/// The context assembler lists capabilities via `name()` and `description()`,
/// the response parser validates action names against the registry, and the
/// executor dispatches calls via `execute()`.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name used by the oracle to request this capability (e.g. `"read_file"`).
    fn name(&self) -> &str;

    /// Documentation string. Its first line is what the oracle sees.
    fn documentation(&self) -> &str;

    /// One-line description shown to the oracle.
    ///
    /// Default: first non-blank line of [`documentation`](Self::documentation),
    /// whitespace-collapsed.
    fn description(&self) -> String {
        first_doc_line(self.documentation())
    }

    /// Run the capability with its raw argument text.
    ///
    /// Returns the output the oracle reads. On failure, return an `Err`; the
    /// executor turns it into a failed result.
    async fn execute(&self, args: &str) -> anyhow::Result<String>;
}

/// First non-blank line of a documentation string, whitespace-collapsed.
pub fn first_doc_line(doc: &str) -> String {
    doc.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(collapse_whitespace)
        .unwrap_or_default()
}

// ─────────────────────────────────────────────
// Args helpers
// ─────────────────────────────────────────────

/// Split `"head|rest"` at the first `|`. `head` is trimmed, `rest` is kept verbatim.
pub fn split_pipe<'a>(args: &'a str, capability: &str, format: &str) -> anyhow::Result<(&'a str, &'a str)> {
    args.split_once('|')
        .map(|(head, rest)| (head.trim(), rest))
        .ok_or_else(|| anyhow::anyhow!("{capability} requires args in format {format}"))
}

/// Trimmed args, rejecting empty input.
pub fn require_args<'a>(args: &'a str, capability: &str, what: &str) -> anyhow::Result<&'a str> {
    let trimmed = args.trim();
    if trimmed.is_empty() {
        anyhow::bail!("{capability} requires {what}");
    }
    Ok(trimmed)
}
