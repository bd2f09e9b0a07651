//! Status command implementation.

use super::{connect_store, load_config, runtime};
use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use vellum_core::DocumentId;
use vellum_ingest::{status_for_path, status_report, JobState, StatusReport};

pub fn run(target: Option<String>, limit: i64, json: bool) -> Result<()> {
    let (config, _paths) = load_config()?;
    let rt = runtime()?;

    rt.block_on(async {
        let store = connect_store(&config).await?;

        match target {
            Some(target) => {
                let report = match target.parse::<DocumentId>() {
                    Ok(id) => status_report(store.as_ref(), id).await?,
                    Err(_) => {
                        let expanded = shellexpand::tilde(&target).to_string();
                        let path = std::fs::canonicalize(&expanded)
                            .with_context(|| format!("No such document or file: {}", target))?;
                        status_for_path(store.as_ref(), &path.to_string_lossy()).await?
                    }
                };

                let Some(report) = report else {
                    anyhow::bail!("No indexed document for {}", target);
                };

                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_detail(&report);
                }
            }
            None => {
                let documents = store.list_documents(limit).await?;
                let mut reports = Vec::with_capacity(documents.len());
                for doc in documents {
                    if let Some(report) = status_report(store.as_ref(), doc.id).await? {
                        reports.push(report);
                    }
                }
                let coverage = store.coverage().await?;

                if json {
                    let body = serde_json::json!({
                        "documents": reports,
                        "coverage": coverage,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                    return Ok(());
                }

                if reports.is_empty() {
                    println!("{}", "No documents indexed yet.".yellow());
                } else {
                    println!("{}", "Recent Documents".cyan().bold());
                    println!("{}", "─".repeat(70));
                    for report in &reports {
                        println!(
                            "  {} {:<10} {:>4}/{:<4} {:<24} {}",
                            report.document.short_id().dimmed(),
                            state_label(report.state),
                            report.counts.embedded,
                            report.counts.total,
                            report.document.chunking_strategy.as_deref().unwrap_or("-"),
                            report.document.file_name
                        );
                    }
                }

                println!();
                println!(
                    "Coverage: {:.1}% ({} / {} chunks embedded)",
                    coverage.percent(),
                    coverage.embedded_chunks,
                    coverage.total_chunks
                );
            }
        }

        Ok(())
    })
}

fn state_label(state: JobState) -> ColoredString {
    match state {
        JobState::Completed => state.as_str().green(),
        JobState::Incomplete => state.as_str().yellow(),
    }
}

fn print_detail(report: &StatusReport) {
    let doc = &report.document;
    println!("{}", doc.file_name.cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  ID:        {}", doc.id);
    println!("  Path:      {}", doc.file_path);
    println!("  State:     {}", state_label(report.state));
    println!("  Status:    {}", doc.status);
    println!(
        "  Chunks:    {} / {} embedded",
        report.counts.embedded, report.counts.total
    );
    if let Some(strategy) = &doc.chunking_strategy {
        println!("  Strategy:  {}", strategy);
    }
    println!("  Hash:      {}", doc.content_hash);
    println!(
        "  Updated:   {}",
        doc.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(error) = &doc.error {
        println!("  Error:     {}", error.red());
    }
}
