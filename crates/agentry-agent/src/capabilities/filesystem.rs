//! Filesystem capabilities — write, read, edit, list directory.
//!
//! Arguments use the pipe convention (`"path|content"`). Each capability
//! optionally restricts paths to an `allowed_dir`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use agentry_core::utils::expand_home;

use super::base::{require_args, split_pipe, Capability};

// ─────────────────────────────────────────────
// Shared path helper
// ─────────────────────────────────────────────

/// Resolve a user-supplied path to an absolute one, optionally restricting it
/// to `allowed_dir`.
///
/// `~` is expanded. Relative paths resolve against `allowed_dir` when set,
/// otherwise against the process working directory.
fn resolve_path(path: &str, allowed_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let expanded = expand_home(path.trim());

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        let base = match allowed_dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        base.join(expanded)
    };

    // Canonicalize if the path exists; for new files canonicalize the parent.
    let resolved = if absolute.exists() {
        absolute.canonicalize().unwrap_or(absolute)
    } else {
        match (absolute.parent(), absolute.file_name()) {
            (Some(parent), Some(name)) if parent.exists() => parent
                .canonicalize()
                .unwrap_or_else(|_| parent.to_path_buf())
                .join(name),
            _ => absolute,
        }
    };

    if let Some(allowed) = allowed_dir {
        let allowed_canon = allowed
            .canonicalize()
            .unwrap_or_else(|_| allowed.to_path_buf());
        let traverses = Path::new(path.trim())
            .components()
            .any(|c| c == Component::ParentDir);
        if traverses || !resolved.starts_with(&allowed_canon) {
            anyhow::bail!(
                "Access denied: path '{}' is outside allowed directory '{}'",
                resolved.display(),
                allowed_canon.display()
            );
        }
    }

    Ok(resolved)
}

// ─────────────────────────────────────────────
// WriteFileCapability
// ─────────────────────────────────────────────

/// Creates or overwrites a file with the given content.
pub struct WriteFileCapability {
    allowed_dir: Option<PathBuf>,
}

impl WriteFileCapability {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Capability for WriteFileCapability {
    fn name(&self) -> &str {
        "write_file"
    }

    fn documentation(&self) -> &str {
        "Write content to a file. Args format: \"path|content\".
        Supports ~ for the user's home (e.g. ~/Desktop/file.txt). Parent directories are created."
    }

    async fn execute(&self, args: &str) -> anyhow::Result<String> {
        let (raw_path, content) = split_pipe(args, "write_file", "path|content")?;
        if raw_path.is_empty() {
            anyhow::bail!("write_file requires a path");
        }
        let path = resolve_path(raw_path, self.allowed_dir.as_deref())?;
        info!(path = %path.display(), "writing file");

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow::anyhow!("Failed to create directory {}: {e}", parent.display())
                })?;
            }
        }

        std::fs::write(&path, content)
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;
        Ok(format!(
            "Wrote {} characters to {}",
            content.chars().count(),
            path.display()
        ))
    }
}

// ─────────────────────────────────────────────
// ReadFileCapability
// ─────────────────────────────────────────────

/// Reads and returns the entire content of a file.
pub struct ReadFileCapability {
    allowed_dir: Option<PathBuf>,
}

impl ReadFileCapability {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Capability for ReadFileCapability {
    fn name(&self) -> &str {
        "read_file"
    }

    fn documentation(&self) -> &str {
        "Read content from a file. Args format: \"path\".
        Supports ~ for the user's home."
    }

    async fn execute(&self, args: &str) -> anyhow::Result<String> {
        let raw_path = require_args(args, "read_file", "a path")?;
        let path = resolve_path(raw_path, self.allowed_dir.as_deref())?;

        if !path.exists() {
            anyhow::bail!("file not found: {}", path.display());
        }
        if !path.is_file() {
            anyhow::bail!("not a file: {}", path.display());
        }

        std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))
    }
}

// ─────────────────────────────────────────────
// EditFileCapability
// ─────────────────────────────────────────────

/// Replaces a text snippet within a file (first occurrence).
pub struct EditFileCapability {
    allowed_dir: Option<PathBuf>,
}

impl EditFileCapability {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Capability for EditFileCapability {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn documentation(&self) -> &str {
        "Replace the first occurrence of some text in a file. Args format: \"path|old_text|new_text\".
        Include enough context in old_text to identify the replacement site."
    }

    async fn execute(&self, args: &str) -> anyhow::Result<String> {
        const FORMAT: &str = "path|old_text|new_text";
        let (raw_path, rest) = split_pipe(args, "edit_file", FORMAT)?;
        let (old_text, new_text) = rest
            .split_once('|')
            .ok_or_else(|| anyhow::anyhow!("edit_file requires args in format {FORMAT}"))?;
        if old_text.is_empty() {
            anyhow::bail!("edit_file requires a non-empty old_text");
        }
        let path = resolve_path(raw_path, self.allowed_dir.as_deref())?;

        if !path.is_file() {
            anyhow::bail!("file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;

        let count = content.matches(old_text).count();
        if count == 0 {
            anyhow::bail!("old_text not found in {}", path.display());
        }

        let updated = content.replacen(old_text, new_text, 1);
        std::fs::write(&path, &updated)
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;

        let note = if count > 1 {
            format!(" (old_text appears {count} times; only the first was replaced)")
        } else {
            String::new()
        };
        Ok(format!("Edited {}{note}", path.display()))
    }
}

// ─────────────────────────────────────────────
// ListDirCapability
// ─────────────────────────────────────────────

/// Lists the contents of a directory.
pub struct ListDirCapability {
    allowed_dir: Option<PathBuf>,
}

impl ListDirCapability {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Capability for ListDirCapability {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn documentation(&self) -> &str {
        "List the entries of a directory. Args format: \"path\" (defaults to \".\")."
    }

    async fn execute(&self, args: &str) -> anyhow::Result<String> {
        let raw_path = match args.trim() {
            "" => ".",
            p => p,
        };
        let path = resolve_path(raw_path, self.allowed_dir.as_deref())?;

        if !path.is_dir() {
            anyhow::bail!("not a directory: {}", path.display());
        }

        let mut dir_entries: Vec<_> = std::fs::read_dir(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read directory {}: {e}", path.display()))?
            .filter_map(|e| e.ok())
            .collect();
        dir_entries.sort_by_key(|e| e.file_name());

        let entries: Vec<String> = dir_entries
            .iter()
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
                if is_dir {
                    format!("{name}/")
                } else {
                    name
                }
            })
            .collect();

        if entries.is_empty() {
            Ok("(empty directory)".into())
        } else {
            Ok(entries.join("\n"))
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
