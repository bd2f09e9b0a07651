//! Ingest command implementation.

use super::{build_pipeline, load_config, runtime};
use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vellum_ingest::{extractor, IngestOutcome};
use vellum_metrics::MetricsCollector;

/// Ingest a single file or every supported file under a directory.
pub fn run(path: &str, dry_run: bool) -> Result<()> {
    let path = PathBuf::from(shellexpand::tilde(path).as_ref());
    if !path.exists() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }

    let files = if path.is_file() {
        vec![path.clone()]
    } else {
        collect_files(&path)
    };

    if files.is_empty() {
        println!("{}", "No supported files found.".yellow());
        return Ok(());
    }

    if dry_run {
        for file in &files {
            println!("{} {}", "Would ingest:".cyan(), file.display());
        }
        println!("\n{} file(s)", files.len());
        return Ok(());
    }

    let (config, paths) = load_config()?;
    let rt = runtime()?;
    rt.block_on(async {
        let metrics = Arc::new(MetricsCollector::new());
        let pipeline = build_pipeline(&config, &paths, metrics.clone()).await?;

        let mut indexed = 0;
        let mut unchanged = 0;
        let mut failed = 0;
        let mut auth_failure = false;

        for file in &files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.display().to_string());

            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));

            let result = pipeline
                .ingest_file_with_progress(file, |stage| {
                    pb.set_message(format!("{} {}", stage, name));
                })
                .await;

            match result {
                Ok(IngestOutcome::Indexed(doc)) => {
                    indexed += 1;
                    pb.finish_with_message(format!(
                        "{} {} ({} chunks, {}{})",
                        "Indexed:".green().bold(),
                        name,
                        doc.chunks,
                        doc.strategy_name,
                        if doc.cache_hit { ", cached classification" } else { "" }
                    ));
                    println!(
                        "  ID: {}  Domain: {}  Category: {}  Confidence: {:.2}",
                        doc.document.short_id(),
                        doc.classification.domain,
                        doc.classification.category,
                        doc.classification.confidence
                    );
                }
                Ok(IngestOutcome::Unchanged(doc)) => {
                    unchanged += 1;
                    pb.finish_with_message(format!(
                        "{} {} [{}]",
                        "Unchanged:".yellow(),
                        name,
                        doc.short_id()
                    ));
                }
                Err(e) => {
                    failed += 1;
                    auth_failure |= e.is_fatal_alert();
                    pb.finish_with_message(format!("{} {}: {}", "Failed:".red().bold(), name, e));
                }
            }

            if auth_failure {
                break;
            }
        }

        if files.len() > 1 {
            println!();
            println!(
                "{} indexed, {} unchanged, {} failed",
                indexed.to_string().green(),
                unchanged,
                if failed > 0 {
                    failed.to_string().red()
                } else {
                    failed.to_string().normal()
                }
            );
        }

        if auth_failure {
            anyhow::bail!(
                "The remote service rejected the credential; check ollama.api_key or VELLUM_API_KEY"
            );
        }
        if failed > 0 && indexed == 0 && unchanged == 0 {
            anyhow::bail!("No file was ingested");
        }
        Ok(())
    })
}

/// Supported, non-hidden files under `dir`, in path order.
fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .map(|n| n.starts_with('.'))
                    .unwrap_or(false)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && extractor::is_supported(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}
