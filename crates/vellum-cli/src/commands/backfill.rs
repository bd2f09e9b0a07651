//! Backfill command implementation.

use super::{build_indexer, connect_store, load_config, runtime};
use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;
use vellum_ingest::Backfill;
use vellum_metrics::MetricsCollector;

pub fn run(limit: i64, json: bool) -> Result<()> {
    let (config, _paths) = load_config()?;
    let rt = runtime()?;

    rt.block_on(async {
        let metrics = Arc::new(MetricsCollector::new());
        let store = connect_store(&config).await?;
        let indexer = build_indexer(&config, store, metrics.clone())?;

        let summary = Backfill::new(indexer, metrics)
            .with_limit(limit)
            .run()
            .await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }

        println!("{}", "Backfill".cyan().bold());
        println!("{}", "─".repeat(40));
        println!("  Candidates:  {}", summary.candidates);
        println!("  Processed:   {}", summary.processed.to_string().green());
        println!("  Skipped:     {}", summary.skipped.to_string().yellow());
        println!(
            "  Failed:      {}",
            if summary.failed > 0 {
                summary.failed.to_string().red()
            } else {
                summary.failed.to_string().normal()
            }
        );
        println!(
            "  Coverage:    {:.1}% ({} / {} chunks embedded)",
            summary.coverage_percent(),
            summary.coverage.embedded_chunks,
            summary.coverage.total_chunks
        );

        Ok(())
    })
}
