//! Configuration commands.

use super::get_paths;
use anyhow::{Context, Result};
use colored::Colorize;
use vellum_config::{CacheBackend, Config};

pub fn show() -> Result<()> {
    let paths = get_paths()?;

    if !paths.config_file.exists() {
        anyhow::bail!("Config file not found. Run 'vellum init' first.");
    }

    let contents =
        std::fs::read_to_string(&paths.config_file).context("Failed to read config file")?;

    println!("{}", "Current Configuration".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("{}", contents);

    Ok(())
}

pub fn add_watch(path: &str) -> Result<()> {
    let paths = get_paths()?;

    let expanded = shellexpand::tilde(path);
    if !std::path::Path::new(expanded.as_ref()).is_dir() {
        anyhow::bail!("Directory does not exist: {}", expanded);
    }

    let mut config = Config::load_from(&paths.config_file).context("Failed to load config")?;

    if config.watch.directories.iter().any(|d| d == path) {
        println!(
            "{} Directory already in watch list: {}",
            "Note:".yellow(),
            path
        );
        return Ok(());
    }

    config.add_watch_directory(path.to_string());
    config
        .save_to(&paths.config_file)
        .context("Failed to save config")?;

    println!("{} Added watch directory: {}", "✓".green(), path);

    Ok(())
}

pub fn set(key: &str, value: &str) -> Result<()> {
    let paths = get_paths()?;

    let mut config = Config::load_from(&paths.config_file).context("Failed to load config")?;
    apply(&mut config, key, value)?;
    config.validate().context("Rejected configuration value")?;

    config
        .save_to(&paths.config_file)
        .context("Failed to save config")?;

    println!("{} Set {} = {}", "✓".green(), key.cyan(), value);

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["ollama", "host"] => config.ollama.host = value.to_string(),
        ["ollama", "model"] => config.ollama.model = value.to_string(),
        ["ollama", "embedding_model"] => config.ollama.embedding_model = value.to_string(),
        ["ollama", "embedding_dimensions"] => {
            config.ollama.embedding_dimensions =
                value.parse().context("Invalid embedding_dimensions value")?;
        }
        ["ollama", "timeout_seconds"] => {
            config.ollama.timeout_seconds = value.parse().context("Invalid timeout value")?;
        }
        ["retry", "max_retries"] => {
            config.retry.max_retries = value.parse().context("Invalid max_retries value")?;
        }
        ["classification", "confidence_threshold"] => {
            config.classification.confidence_threshold =
                value.parse().context("Invalid confidence_threshold value")?;
        }
        ["cache", "backend"] => {
            config.cache.backend = match value {
                "sqlite" => CacheBackend::Sqlite,
                "redis" => CacheBackend::Redis,
                "memory" => CacheBackend::Memory,
                "disabled" => CacheBackend::Disabled,
                other => anyhow::bail!("Unknown cache backend: {}", other),
            };
        }
        ["cache", "ttl_seconds"] => {
            config.cache.ttl_seconds = value.parse().context("Invalid ttl_seconds value")?;
        }
        ["cache", "redis_url"] => config.cache.redis_url = Some(value.to_string()),
        ["storage", "postgres_url"] => config.storage.postgres_url = value.to_string(),
        ["storage", "lock_namespace"] => config.storage.lock_namespace = value.to_string(),
        ["chunking", "chunk_size"] => {
            config.chunking.chunk_size = value.parse().context("Invalid chunk_size value")?;
        }
        ["chunking", "chunk_overlap"] => {
            config.chunking.chunk_overlap =
                value.parse().context("Invalid chunk_overlap value")?;
        }
        ["chunking", "fallback_strategy"] => {
            config.chunking.fallback_strategy = value.to_string();
        }
        ["watch", "poll_interval_seconds"] => {
            config.watch.poll_interval_seconds =
                value.parse().context("Invalid poll_interval_seconds value")?;
        }
        ["metrics", "enabled"] => {
            config.metrics.enabled = value.parse().context("Invalid boolean value")?;
        }
        ["metrics", "bind"] => config.metrics.bind = value.to_string(),
        _ => {
            anyhow::bail!("Unknown config key: {}", key);
        }
    }

    Ok(())
}
