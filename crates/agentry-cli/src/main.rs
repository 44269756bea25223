//! Agentry CLI — entry point.
//!
//! # Commands
//!
//! - `agentry chat [-m MESSAGE] [-s SESSION] [--logs]` — single-shot or REPL
//! - `agentry onboard` — initialize config, workspace, and memory dirs
//! - `agentry status` — show configuration, providers, and capabilities

mod helpers;
mod onboard;
mod repl;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use agentry_agent::{
    builtin_registry, AgentLoop, AgentSettings, CapabilityOptions, MemoryBank, MemoryGate,
};
use agentry_core::config::{load_config, Config};
use agentry_core::types::Session;
use agentry_providers::http_provider::create_provider;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Agentry — a local agent that acts through fenced JSON requests
#[derive(Parser)]
#[command(name = "agentry", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (single-shot or interactive REPL)
    Chat {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Session identifier
        #[arg(short, long, default_value = "cli:default")]
        session: String,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Initialize configuration, workspace, and memory directories
    Onboard,

    /// Show configuration, provider status, and capabilities
    Status,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            message,
            session,
            logs,
        } => {
            init_logging(logs);
            run_chat(message, session).await
        }
        Commands::Onboard => onboard::run(),
        Commands::Status => status::run(),
    }
}

// ─────────────────────────────────────────────
// Chat command
// ─────────────────────────────────────────────

async fn run_chat(message: Option<String>, session_id: String) -> Result<()> {
    let config = load_config(None);
    let agent_loop = build_agent_loop(&config)?;
    let mut session = Session::new(session_id);

    match message {
        Some(msg) => {
            info!(session = %session.key, "processing single message");
            let response = agent_loop
                .process_turn(&mut session, &msg)
                .await
                .context("agent processing failed")?;
            helpers::print_response(&response);
        }
        None => {
            repl::run(&agent_loop, &mut session).await?;
        }
    }

    Ok(())
}

/// Build an `AgentLoop` from the loaded configuration.
pub fn build_agent_loop(config: &Config) -> Result<AgentLoop> {
    let defaults = &config.agents.defaults;

    let workspace = helpers::expand_tilde(&defaults.workspace);
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("failed to create workspace: {}", workspace.display()))?;

    let provider = create_provider(
        &defaults.model,
        defaults.provider.as_deref(),
        &config.providers.to_map(),
    )?;

    let options = CapabilityOptions::from_config(workspace, &config.tools);
    let registry = builtin_registry(&options).context("failed to build capability registry")?;

    Ok(AgentLoop::new(
        Arc::new(provider),
        registry,
        open_memory(config),
        AgentSettings::from_config(config),
    ))
}

/// Open the long-term store; a store that cannot be opened disables memory.
fn open_memory(config: &Config) -> MemoryGate {
    let path = helpers::expand_tilde(&config.memory.path);
    match MemoryBank::open(&path) {
        Ok(bank) => MemoryGate::new(Arc::new(bank)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "long-term memory unavailable");
            MemoryGate::disabled()
        }
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("agentry=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
