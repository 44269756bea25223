//! Long-term memory — a similarity store behind a failure-tolerant gate.
//!
//! - [`SimilarityStore`]: the narrow add/query/count contract.
//! - [`MemoryBank`]: the shipped store. An append-only JSONL log at
//!   `~/.agentry/memory/agent_logs.jsonl`; entries are ranked by cosine
//!   similarity of hashed bag-of-words vectors, rebuilt in memory on open.
//! - [`MemoryGate`]: what the agent loop talks to. Recall never fails and
//!   logging never raises; store errors degrade to empty/no-op.

use std::collections::hash_map::DefaultHasher;
use std::fs::OpenOptions;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use agentry_core::utils::timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Typed failures of a similarity store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("memory store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("memory store record is invalid: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("memory store is empty")]
    Empty,
}

/// The long-term store contract. Each operation may fail independently.
pub trait SimilarityStore: Send + Sync {
    /// Store `text` under `id`.
    fn add(&self, id: &str, text: &str) -> Result<(), StoreError>;

    /// Up to `top_k` stored texts, most relevant first.
    fn query(&self, text: &str, top_k: usize) -> Result<Vec<String>, StoreError>;

    /// Number of stored entries.
    fn count(&self) -> Result<usize, StoreError>;
}

// ─────────────────────────────────────────────
// Embedding
// ─────────────────────────────────────────────

const EMBED_DIM: usize = 64;

/// Hashed bag-of-words vector, L2-normalized.
fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; EMBED_DIM];

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        token.to_lowercase().hash(&mut hasher);
        let idx = (hasher.finish() as usize) % EMBED_DIM;
        vector[idx] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
    vector
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let numerator = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>();
    let denom_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if denom_a == 0.0 || denom_b == 0.0 {
        0.0
    } else {
        numerator / (denom_a * denom_b)
    }
}

// ─────────────────────────────────────────────
// MemoryBank
// ─────────────────────────────────────────────

/// One line of the log file.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct LogRecord {
    id: String,
    text: String,
    timestamp: String,
}

struct IndexedRecord {
    record: LogRecord,
    embedding: Vec<f32>,
}

/// JSONL-backed similarity store.
pub struct MemoryBank {
    path: PathBuf,
    records: Mutex<Vec<IndexedRecord>>,
}

impl MemoryBank {
    /// Open (or create) the log at `path` and index its entries.
    ///
    /// Unreadable lines are skipped with a warning.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut records = Vec::new();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            for (lineno, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogRecord>(line) {
                    Ok(record) => records.push(IndexedRecord {
                        embedding: embed_text(&record.text),
                        record,
                    }),
                    Err(e) => warn!(line = lineno + 1, error = %e, "skipping unreadable memory entry"),
                }
            }
        }

        debug!(path = %path.display(), entries = records.len(), "memory bank opened");
        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<IndexedRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SimilarityStore for MemoryBank {
    fn add(&self, id: &str, text: &str) -> Result<(), StoreError> {
        let record = LogRecord {
            id: id.to_string(),
            text: text.to_string(),
            timestamp: timestamp(),
        };
        let line = serde_json::to_string(&record)?;

        let mut records = self.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        records.push(IndexedRecord {
            embedding: embed_text(text),
            record,
        });
        Ok(())
    }

    fn query(&self, text: &str, top_k: usize) -> Result<Vec<String>, StoreError> {
        let records = self.lock();
        if records.is_empty() {
            return Err(StoreError::Empty);
        }

        let query_vec = embed_text(text);
        let mut scored: Vec<(f32, &IndexedRecord)> = records
            .iter()
            .map(|r| (cosine_similarity(&query_vec, &r.embedding), r))
            .collect();
        // Stable sort: equal scores keep log order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, r)| r.record.text.clone())
            .collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.lock().len())
    }
}

// ─────────────────────────────────────────────
// MemoryGate
// ─────────────────────────────────────────────

/// Failure-tolerant front of the similarity store.
#[derive(Clone, Default)]
pub struct MemoryGate {
    store: Option<Arc<dyn SimilarityStore>>,
}

impl MemoryGate {
    pub fn new(store: Arc<dyn SimilarityStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A gate with no store: recall is always empty, logging is a no-op.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Up to `top_k` relevant past entries for `query`. Never fails.
    pub fn recall(&self, query: &str, top_k: usize) -> Vec<String> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let Some(store) = &self.store else {
            return Vec::new();
        };

        let count = match store.count() {
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "memory count failed");
                return Vec::new();
            }
        };

        match store.query(query, top_k.min(count.max(1))) {
            Ok(texts) => texts,
            Err(e) => {
                debug!(error = %e, "memory recall failed");
                Vec::new()
            }
        }
    }

    /// Persist `text`. Returns the id it was stored under, if any.
    ///
    /// A failed write is retried once as a diagnostic entry under an `err_` id.
    pub fn log(&self, text: &str) -> Option<String> {
        let store = self.store.as_ref()?;

        let id = format!(
            "{}Z_{}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f"),
            short_hex()
        );
        let err = match store.add(&id, text) {
            Ok(()) => return Some(id),
            Err(e) => e,
        };

        let err_id = format!("err_{}", short_hex());
        let diagnostic = format!("[add_log error] {text} (error: {err})");
        match store.add(&err_id, &diagnostic) {
            Ok(()) => Some(err_id),
            Err(e) => {
                warn!(first_error = %err, error = %e, "memory log write failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for MemoryGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGate")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn short_hex() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
