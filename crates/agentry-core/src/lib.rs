//! Agentry core — message types, conversation window, config, and utilities.
//!
//! Shared by the provider layer, the agent loop, and the CLI.

pub mod config;
pub mod types;
pub mod utils;

pub use types::{ConversationWindow, Message, Role, Session};
