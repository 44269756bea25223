//! Interactive REPL.
//!
//! Uses `rustyline` for readline-style editing with persistent history.
//! Session commands (`/save`, `/quit`) are handled here, outside the agent loop.

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use agentry_agent::AgentLoop;
use agentry_core::types::{ConversationWindow, Session};

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

const SAVE_COMMAND: &str = "/save";

/// How many window messages `/save` summarizes.
const SAVE_TAIL: usize = 6;

/// Per-message character cap in the `/save` summary.
const SAVE_CHARS: usize = 200;

/// Run the interactive REPL loop until the user quits.
pub async fn run(agent: &AgentLoop, session: &mut Session) -> Result<()> {
    helpers::print_banner(agent.model());

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => {
                // Ctrl-C — exit cleanly
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                // Ctrl-D — exit cleanly
                break;
            }
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_exit_command(trimmed) {
            break;
        }

        let _ = editor.add_history_entry(&input);

        if trimmed.eq_ignore_ascii_case(SAVE_COMMAND) {
            let summary = conversation_summary(&session.window);
            match agent.memory().log(&summary) {
                Some(id) => {
                    debug!(id = %id, "conversation summary saved");
                    helpers::print_notice("Saved recent context to long-term memory.");
                }
                None => helpers::print_notice("Long-term memory is unavailable; nothing saved."),
            }
            continue;
        }

        debug!(session = %session.key, input = trimmed, "processing input");
        helpers::print_thinking();

        match agent.process_turn(session, trimmed).await {
            Ok(response) => {
                helpers::clear_thinking();
                debug!(reply = ?response, "final answer");
                helpers::print_response(&response);
            }
            Err(e) => {
                helpers::clear_thinking();
                eprintln!("\nError: {e}\n");
            }
        }
    }

    println!("\nGoodbye.");
    save_history(&mut editor);

    Ok(())
}

/// `"Conversation summary: "` + the last few window messages, each capped.
fn conversation_summary(window: &ConversationWindow) -> String {
    let parts: Vec<String> = window
        .tail(SAVE_TAIL)
        .iter()
        .map(|m| m.content())
        .filter(|c| !c.is_empty())
        .map(|c| c.chars().take(SAVE_CHARS).collect::<String>())
        .collect();
    format!("Conversation summary: {}", parts.join("; "))
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// Path to the history file.
fn history_path() -> std::path::PathBuf {
    agentry_core::utils::get_data_path()
        .join("history")
        .join("cli_history")
}

/// Check if input is an exit command.
fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
