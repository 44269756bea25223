//! Core types for Agentry — chat messages, the conversation window, and the
//! per-user session that owns it.
//!
//! Messages follow the OpenAI chat completions shape (`{"role", "content"}`)
//! so they serialize straight into provider requests.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Who authored a message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message. Immutable once built: fields are only readable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    /// Create a message with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

// ─────────────────────────────────────────────
// Conversation window
// ─────────────────────────────────────────────

/// Append-only conversation history.
///
/// Storage is unbounded; callers cap what they *read* via [`recent`](Self::recent).
/// Nothing is ever removed or rewritten in place.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationWindow {
    messages: Vec<Message>,
}

impl ConversationWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a completed user/assistant exchange.
    pub fn push_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.messages.push(Message::user(user));
        self.messages.push(Message::assistant(assistant));
    }

    /// The most recent `2 × turn_cap` messages, oldest first.
    pub fn recent(&self, turn_cap: usize) -> &[Message] {
        self.tail(turn_cap.saturating_mul(2))
    }

    /// The last `n` messages, oldest first.
    pub fn tail(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Every stored message.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ─────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────

/// One interactive conversation. Owned by whoever drives the turns and passed
/// by `&mut` into the agent loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub window: ConversationWindow,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Session {
    /// Create a new empty session.
    pub fn new(key: impl Into<String>) -> Self {
        Session {
            key: key.into(),
            window: ConversationWindow::new(),
            created_at: chrono::Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
