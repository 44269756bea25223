//! `agentry onboard` — initialize configuration, workspace, and memory.
//!
//! - Creates `~/.agentry/config.json` with defaults (never overwrites)
//! - Creates the workspace, the memory log's directory, and the history dir

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use agentry_core::config::{get_config_path, load_config, save_config, Config};
use agentry_core::utils::get_data_path;

use crate::helpers::expand_tilde;

/// Run the onboard command.
pub fn run() -> Result<()> {
    println!();
    println!("{}", "Agentry — Setup".cyan().bold());
    println!();

    let config_path = get_config_path();
    let config = if config_path.exists() {
        println!(
            "  {} config already exists at {}",
            "✓".green(),
            config_path.display()
        );
        load_config(Some(&config_path))
    } else {
        let config = Config::default();
        save_config(&config, Some(&config_path))?;
        println!(
            "  {} created config at {}",
            "✓".green(),
            config_path.display()
        );
        config
    };

    for (label, dir) in directories(&config, &get_data_path()) {
        std::fs::create_dir_all(&dir)?;
        println!("  {} {} at {}", "✓".green(), label, dir.display());
    }

    println!();
    println!(
        "{}",
        "  Setup complete! Run `agentry chat` to start chatting.".green()
    );
    println!();

    Ok(())
}

/// Directories the agent expects to exist, with display labels.
fn directories(config: &Config, data_dir: &Path) -> Vec<(&'static str, std::path::PathBuf)> {
    let mut dirs = vec![("workspace", expand_tilde(&config.agents.defaults.workspace))];
    if let Some(parent) = expand_tilde(&config.memory.path).parent() {
        dirs.push(("memory dir", parent.to_path_buf()));
    }
    dirs.push(("history dir", data_dir.join("history")));
    dirs
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
