//! Initialize Vellum.

use super::get_paths;
use anyhow::{Context, Result};
use colored::Colorize;
use vellum_config::Config;

pub fn run() -> Result<()> {
    let paths = get_paths()?;

    if paths.is_initialized() {
        println!("{} Vellum is already initialized.", "Note:".yellow().bold());
        println!("  Config: {}", paths.config_file.display());
        println!("  Cache: {}", paths.cache_file.display());
        return Ok(());
    }

    println!("{}", "Initializing Vellum...".cyan().bold());

    paths.ensure_dirs().context("Failed to create directories")?;
    println!("  {} Created directories", "✓".green());

    Config::create_default_file(&paths.config_file).context("Failed to create config file")?;
    println!(
        "  {} Created config: {}",
        "✓".green(),
        paths.config_file.display()
    );

    println!();
    println!("{}", "Vellum initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  1. Point [storage] postgres_url at a database with pgvector: {}",
        "vellum config set storage.postgres_url <url>".cyan()
    );
    println!(
        "  2. Add watch directories: {}",
        "vellum config add-watch ~/Papers".cyan()
    );
    println!("  3. Start watching: {}", "vellum watch".cyan());

    Ok(())
}
