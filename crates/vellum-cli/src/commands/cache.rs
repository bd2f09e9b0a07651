//! Classification cache maintenance.

use super::{load_config, runtime};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use vellum_cache::{cache_key, ClassificationCache};
use vellum_config::{AppPaths, Config};
use vellum_ingest::extract_blocking;

async fn open(config: &Config, paths: &AppPaths) -> Result<ClassificationCache> {
    let cache = ClassificationCache::from_config(&config.cache, &config.cache_path(paths))
        .await
        .context("Failed to open classification cache")?;
    if !cache.is_enabled() {
        anyhow::bail!("Classification cache is disabled (cache.backend = \"disabled\")");
    }
    Ok(cache)
}

/// Drop a single entry, addressed by key or by the file it was computed from.
pub fn invalidate(key: Option<String>, file: Option<String>) -> Result<()> {
    let (config, paths) = load_config()?;
    let rt = runtime()?;

    rt.block_on(async {
        let cache = open(&config, &paths).await?;

        let key = match (key, file) {
            (Some(key), _) => key,
            (None, Some(file)) => {
                let path = PathBuf::from(shellexpand::tilde(&file).as_ref());
                let extraction = extract_blocking(path)
                    .await
                    .context("Failed to extract file")?;
                cache_key(&extraction.text, &extraction.metadata)
            }
            (None, None) => anyhow::bail!("Pass either --key or --file"),
        };

        let removed = cache.invalidate(&key).await?;
        if removed {
            println!("{} Invalidated {}", "✓".green(), key.cyan());
        } else {
            println!("{} No entry for {}", "Note:".yellow(), key);
        }
        Ok(())
    })
}

/// Remove every entry.
pub fn flush() -> Result<()> {
    let (config, paths) = load_config()?;
    let rt = runtime()?;

    rt.block_on(async {
        let cache = open(&config, &paths).await?;
        let removed = cache.flush().await?;
        println!(
            "{} Flushed {} entries from the {} cache",
            "✓".green(),
            removed,
            cache.backend_name()
        );
        Ok(())
    })
}

/// Remove entries older than the configured TTL.
pub fn purge() -> Result<()> {
    let (config, paths) = load_config()?;
    let rt = runtime()?;

    rt.block_on(async {
        let cache = open(&config, &paths).await?;
        let removed = cache.purge_expired().await?;
        println!("{} Purged {} expired entries", "✓".green(), removed);
        Ok(())
    })
}
