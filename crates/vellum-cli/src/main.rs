//! Vellum CLI - Classify, chunk and index documents into a vector store.

mod commands;
mod server;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Vellum - Classification-driven document indexing
#[derive(Parser)]
#[command(name = "vellum")]
#[command(version)]
#[command(about = "Classification-driven document indexing", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Vellum (create config and data directories)
    Init,

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Ingest a file, or every supported file under a directory
    Ingest {
        /// Path to file or directory
        path: String,

        /// Show what would be ingested without doing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Watch configured directories and index new or changed files
    Watch {
        /// Do not serve the metrics endpoint
        #[arg(long)]
        no_metrics: bool,
    },

    /// Re-embed documents whose chunks are missing vectors
    Backfill {
        /// Maximum number of documents to sweep
        #[arg(short, long, default_value = "500")]
        limit: i64,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show indexing status for a document (ID or path), or recent documents
    Status {
        /// Document ID or file path
        target: Option<String>,

        /// Maximum documents to list
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the classification cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Add a directory to watch
    AddWatch {
        /// Directory path
        path: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., ollama.model)
        key: String,

        /// Value to set
        value: String,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Drop one entry, by digest key or by the file it was computed from
    Invalidate {
        /// Cache key as logged by the classifier
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        key: Option<String>,

        /// File whose classification should be forgotten
        #[arg(long)]
        file: Option<String>,
    },

    /// Remove every cached classification
    Flush,

    /// Remove expired entries
    Purge,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vellum=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vellum=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(),
            ConfigCommands::AddWatch { path } => commands::config::add_watch(&path),
            ConfigCommands::Set { key, value } => commands::config::set(&key, &value),
        },
        Commands::Ingest { path, dry_run } => commands::ingest::run(&path, dry_run),
        Commands::Watch { no_metrics } => commands::watch::run(no_metrics),
        Commands::Backfill { limit, json } => commands::backfill::run(limit, json),
        Commands::Status {
            target,
            limit,
            json,
        } => commands::status::run(target, limit, json),
        Commands::Cache(cmd) => match cmd {
            CacheCommands::Invalidate { key, file } => commands::cache::invalidate(key, file),
            CacheCommands::Flush => commands::cache::flush(),
            CacheCommands::Purge => commands::cache::purge(),
        },
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
