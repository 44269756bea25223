//! Shell capability — execute a command in a subprocess.
//!
//! Includes a deny-pattern safety guard, a hard timeout and an optional
//! workspace restriction.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{info, warn};

use super::base::{require_args, Capability};

/// Maximum output length before truncation (characters).
const MAX_OUTPUT_LEN: usize = 10_000;

/// Default command timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Dangerous command patterns that are always blocked (matched on the lowercased command).
const DENY_PATTERNS: &[&str] = &[
    r"\brm\s+-[rf]{1,2}\b",
    r"\brm\s+.*-r",
    r"\bdel\s+/[fq]\b",
    r"\brmdir\s+/s\b",
    r"\b(format|mkfs|diskpart)\b",
    r"\bmkfs\.\w+",
    r"\bdd\s+if=",
    r">\s*/dev/sd",
    r"\b(shutdown|reboot|poweroff)\b",
    r":\(\)\s*\{\s*:\s*\|\s*:\s*&", // fork bomb
    r"\b(curl|wget)\s+.*\|\s*(ba)?sh\b",
];

static DENY_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DENY_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

static ABS_PATH_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?:^|\s)(/[^\s"']+)"#).ok());

// ─────────────────────────────────────────────
// RunCmdCapability
// ─────────────────────────────────────────────

/// Execute shell commands in a subprocess.
pub struct RunCmdCapability {
    /// Working directory for commands.
    working_dir: PathBuf,
    timeout: Duration,
    /// If true, block commands that reference paths outside `working_dir`.
    restrict_to_workspace: bool,
}

impl RunCmdCapability {
    pub fn new(working_dir: PathBuf, timeout_secs: Option<u64>, restrict_to_workspace: bool) -> Self {
        Self {
            working_dir,
            timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            restrict_to_workspace,
        }
    }

    /// Check if a command is safe to execute. Returns the reason if blocked.
    fn guard_command(&self, command: &str) -> Option<String> {
        let lower = command.to_lowercase();

        if DENY_REGEXES.iter().any(|re| re.is_match(&lower)) {
            warn!(command = command, "command blocked by safety guard");
            return Some("command blocked for safety (e.g. rm -rf or similar)".into());
        }

        if self.restrict_to_workspace {
            if command.contains("../") || command.contains("..\\") {
                return Some("path traversal (../) not allowed in restricted mode".into());
            }

            if let Some(re) = ABS_PATH_RE.as_ref() {
                for cap in re.captures_iter(command) {
                    let raw = &cap[1];
                    let p = PathBuf::from(raw);
                    let resolved = p.canonicalize().unwrap_or(p);
                    if !resolved.starts_with(&self.working_dir) {
                        return Some(format!("command references path '{raw}' outside workspace"));
                    }
                }
            }
        }

        None
    }
}

#[async_trait]
impl Capability for RunCmdCapability {
    fn name(&self) -> &str {
        "run_cmd"
    }

    fn documentation(&self) -> &str {
        "Execute a shell command. Args: the full command string.
        Blocks dangerous operations (e.g. rm -rf)."
    }

    async fn execute(&self, args: &str) -> anyhow::Result<String> {
        let command = require_args(args, "run_cmd", "a command")?;

        if let Some(reason) = self.guard_command(command) {
            anyhow::bail!(reason);
        }

        info!(command = %command, cwd = %self.working_dir.display(), "executing shell command");

        let (shell, flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        let child = Command::new(shell)
            .args([flag, command])
            .current_dir(&self.working_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn command: {e}"))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => anyhow::bail!("Command failed: {e}"),
            Err(_) => anyhow::bail!("command timed out after {}s", self.timeout.as_secs()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let combined = match output.status.code() {
            Some(0) => match stdout.trim() {
                "" => "(no output)".to_string(),
                out => out.to_string(),
            },
            code => format!(
                "Exit code {}\nstdout:\n{stdout}\nstderr:\n{stderr}",
                code.unwrap_or(-1)
            )
            .trim()
            .to_string(),
        };

        Ok(truncate_output(combined))
    }
}

fn truncate_output(mut text: String) -> String {
    let total = text.chars().count();
    if total <= MAX_OUTPUT_LEN {
        return text;
    }
    let cut = text
        .char_indices()
        .nth(MAX_OUTPUT_LEN)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text.truncate(cut);
    text.push_str(&format!("\n... (truncated, {} more chars)", total - MAX_OUTPUT_LEN));
    text
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
