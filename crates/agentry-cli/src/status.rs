//! `agentry status` — show configuration, provider status, and capabilities.

use anyhow::Result;
use colored::Colorize;

use agentry_agent::{builtin_registry, CapabilityOptions};
use agentry_core::config::{get_config_path, load_config};
use agentry_providers::registry::{match_provider, PROVIDERS};

use crate::helpers::expand_tilde;

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();
    let defaults = &config.agents.defaults;

    println!();
    println!("{}", "Agentry Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        found_marker(config_path.exists())
    );

    let workspace = expand_tilde(&defaults.workspace);
    println!(
        "  {:<18} {} {}",
        "Workspace:".bold(),
        workspace.display(),
        found_marker(workspace.exists())
    );

    let memory_path = expand_tilde(&config.memory.path);
    println!(
        "  {:<18} {} {}",
        "Memory:".bold(),
        memory_path.display(),
        found_marker(memory_path.exists())
    );

    println!("  {:<18} {}", "Model:".bold(), defaults.model);

    let providers_map = config.providers.to_map();
    let resolved = match_provider(&defaults.model, defaults.provider.as_deref(), &providers_map)
        .map(|(_, spec)| spec.display_name.to_string())
        .unwrap_or_else(|| "(none)".red().to_string());
    println!("  {:<18} {}", "Provider:".bold(), resolved);

    println!(
        "  {:<18} {} | {} | {}",
        "Parameters:".bold(),
        format!("temp: {}", defaults.temperature).dimmed(),
        format!("max_tokens: {}", defaults.max_tokens).dimmed(),
        format!("retries: {}", defaults.max_tool_retries).dimmed(),
    );

    // Providers
    println!();
    println!("  {}", "Providers:".bold());
    for spec in PROVIDERS {
        let status = match providers_map.get(spec.name) {
            Some(prov) if prov.is_configured() => format!("{} (key set)", "✓".green()),
            _ if spec.is_local => format!("{}", "· local, no key needed".dimmed()),
            _ => format!("{}", "· not configured".dimmed()),
        };
        println!("    {:<20} {}", spec.display_name, status);
    }

    // Brave Search
    println!();
    let brave_status = if config.tools.web.search.api_key.is_empty() {
        format!("{}", "· not configured".dimmed())
    } else {
        format!("{} (key set)", "✓".green())
    };
    println!("  {:<18} {}", "Brave Search:".bold(), brave_status);

    // Capabilities
    println!();
    println!("  {}", "Capabilities:".bold());
    let registry = builtin_registry(&CapabilityOptions::from_config(workspace, &config.tools))?;
    for (name, description) in registry.listing() {
        println!("    {:<20} {}", name, description.dimmed());
    }

    println!();

    Ok(())
}

fn found_marker(exists: bool) -> String {
    if exists {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}
