//! Watch command implementation.

use super::{build_pipeline, load_config, runtime};
use crate::server;
use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use vellum_ingest::{Watcher, WatcherConfig};
use vellum_metrics::MetricsCollector;

pub fn run(no_metrics: bool) -> Result<()> {
    let (config, paths) = load_config()?;

    if config.watch.directories.is_empty() {
        println!("{}", "No directories configured to watch.".yellow());
        println!("Add directories with: vellum config add-watch <path>");
        return Ok(());
    }

    println!("{}", "Watching directories:".cyan().bold());
    for dir in &config.watch.directories {
        println!("  {}", dir);
    }
    println!();
    println!("Press Ctrl+C to stop.");
    println!();

    let rt = runtime()?;
    rt.block_on(async {
        let metrics = Arc::new(MetricsCollector::new());
        let pipeline = Arc::new(build_pipeline(&config, &paths, metrics.clone()).await?);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server_handle = if !no_metrics && config.metrics.enabled {
            let listener = tokio::net::TcpListener::bind(&config.metrics.bind)
                .await
                .with_context(|| format!("Failed to bind {}", config.metrics.bind))?;
            let app = server::router(metrics.clone(), pipeline.store().clone());
            Some(tokio::spawn(server::serve(
                listener,
                app,
                shutdown_rx.clone(),
            )))
        } else {
            None
        };

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
            let _ = shutdown_tx.send(true);
        });

        let mut watcher = Watcher::new(WatcherConfig::from_config(&config.watch), pipeline);
        watcher.run(shutdown_rx).await?;

        if let Some(handle) = server_handle {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Metrics endpoint stopped with an error"),
                Err(e) => warn!(error = %e, "Metrics endpoint task failed"),
            }
        }

        let snapshot = metrics.snapshot();
        println!();
        println!(
            "{} {} indexed, {} failed",
            "Stopped.".green().bold(),
            snapshot.documents_processed,
            snapshot.documents_failed
        );

        Ok(())
    })
}
