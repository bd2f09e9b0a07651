//! Polling directory watcher that feeds new and changed files to the pipeline.

use crate::error::IngestResult;
use crate::pipeline::{hash_file, IngestOutcome, Pipeline};
use glob::Pattern;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Configuration for the directory watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Directories to scan, recursively.
    pub directories: Vec<PathBuf>,
    /// Patterns matched against file names and full paths.
    pub ignore_patterns: Vec<Pattern>,
    /// Lowercase extensions to pick up.
    pub extensions: Vec<String>,
    /// Pause between scan cycles.
    pub poll_interval: Duration,
}

impl WatcherConfig {
    /// Create from config.
    pub fn from_config(config: &vellum_config::WatchConfig) -> Self {
        let directories = config
            .directories
            .iter()
            .map(|s| PathBuf::from(shellexpand::tilde(s).as_ref()))
            .collect();

        let ignore_patterns = config
            .ignore_patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Ignoring invalid ignore pattern");
                    None
                }
            })
            .collect();

        let extensions = config
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();

        Self {
            directories,
            ignore_patterns,
            extensions,
            poll_interval: Duration::from_secs(config.poll_interval_seconds.max(1)),
        }
    }

    /// Check if a path should be ignored.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            return true;
        };
        if filename.starts_with('.') {
            return true;
        }
        let path_str = path.to_string_lossy();
        self.ignore_patterns
            .iter()
            .any(|p| p.matches(filename) || p.matches(&path_str))
    }

    fn wants_extension(&self, path: &Path) -> bool {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.extensions.iter().any(|e| *e == extension)
    }
}

/// Where the watcher is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Scanning,
    Processing,
}

/// Counts from one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Set when shutdown was requested before the cycle finished.
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

#[derive(Debug, Clone)]
struct KnownFile {
    fingerprint: Fingerprint,
    content_hash: String,
}

/// Scans the configured directories and drives the pipeline for every file
/// whose content hash it has not seen yet. One file is in flight at a time.
pub struct Watcher {
    config: WatcherConfig,
    pipeline: Arc<Pipeline>,
    known: HashMap<PathBuf, KnownFile>,
    state: WatchState,
}

impl Watcher {
    pub fn new(config: WatcherConfig, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            pipeline,
            known: HashMap::new(),
            state: WatchState::Idle,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Supported files under the watched directories, in path order.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for dir in &self.config.directories {
            if !dir.exists() {
                warn!(directory = %dir.display(), "Watch directory does not exist");
                continue;
            }
            for entry in walkdir::WalkDir::new(dir)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !self.should_skip_entry(e.path()))
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if entry.file_type().is_file()
                    && !self.config.should_ignore(path)
                    && self.config.wants_extension(path)
                {
                    files.push(path.to_path_buf());
                }
            }
        }
        files.sort();
        files.dedup();
        files
    }

    fn should_skip_entry(&self, path: &Path) -> bool {
        path.is_dir() && self.config.should_ignore(path)
    }

    /// Run one scan cycle to completion.
    pub async fn cycle(&mut self) -> CycleReport {
        self.cycle_until(None).await
    }

    async fn cycle_until(&mut self, shutdown: Option<&watch::Receiver<bool>>) -> CycleReport {
        self.state = WatchState::Scanning;
        let files = self.scan();
        let mut report = CycleReport {
            scanned: files.len(),
            ..CycleReport::default()
        };
        self.known.retain(|path, _| files.binary_search(path).is_ok());

        for path in files {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                report.interrupted = true;
                break;
            }

            let fingerprint = match fingerprint(&path) {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    debug!(file = %path.display(), error = %e, "File vanished during scan");
                    continue;
                }
            };
            if self
                .known
                .get(&path)
                .is_some_and(|known| known.fingerprint == fingerprint)
            {
                report.unchanged += 1;
                continue;
            }

            let content_hash = match hash_file(&path).await {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Could not hash file");
                    report.failed += 1;
                    continue;
                }
            };
            if let Some(known) = self.known.get_mut(&path) {
                if known.content_hash == content_hash {
                    known.fingerprint = fingerprint;
                    report.unchanged += 1;
                    continue;
                }
            }

            self.state = WatchState::Processing;
            let result = self.pipeline.ingest_file(&path).await;
            self.state = WatchState::Scanning;

            let remember = match result {
                Ok(IngestOutcome::Indexed(indexed)) => {
                    report.indexed += 1;
                    info!(
                        file = %path.display(),
                        document_id = %indexed.document.id,
                        strategy = %indexed.strategy_name,
                        chunks = indexed.chunks,
                        "Watcher indexed file"
                    );
                    true
                }
                Ok(IngestOutcome::Unchanged(_)) => {
                    report.unchanged += 1;
                    true
                }
                // The pipeline has already logged the failure with its stage.
                Err(e) => {
                    report.failed += 1;
                    !e.is_transient() && !e.is_fatal_alert()
                }
            };
            if remember {
                self.known.insert(
                    path,
                    KnownFile {
                        fingerprint,
                        content_hash,
                    },
                );
            }
        }

        self.state = WatchState::Idle;
        report
    }

    /// Poll until `shutdown` turns true or its sender is dropped.
    ///
    /// Shutdown is honored between files and during the pause between cycles.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> IngestResult<()> {
        info!(
            directories = ?self.config.directories,
            interval_secs = self.config.poll_interval.as_secs(),
            "Watcher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.cycle_until(Some(&shutdown)).await;
            if report.indexed > 0 || report.failed > 0 {
                info!(
                    scanned = report.scanned,
                    indexed = report.indexed,
                    unchanged = report.unchanged,
                    failed = report.failed,
                    "Scan cycle finished"
                );
            } else {
                debug!(scanned = report.scanned, "Scan cycle found nothing new");
            }
            if report.interrupted {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Watcher stopped");
        Ok(())
    }
}

fn fingerprint(path: &Path) -> std::io::Result<Fingerprint> {
    let metadata = std::fs::metadata(path)?;
    Ok(Fingerprint {
        modified: metadata.modified().ok(),
        len: metadata.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pipeline_with, sample_classification, ScriptedClassifier, ScriptedEmbedder};
    use tempfile::tempdir;
    use vellum_store::{MemoryVectorStore, VectorStore};

    const DIMS: usize = 8;

    fn config_for(dir: &Path) -> WatcherConfig {
        WatcherConfig::from_config(&vellum_config::WatchConfig {
            directories: vec![dir.to_string_lossy().to_string()],
            ignore_patterns: vec!["*.tmp".to_string(), "drafts".to_string()],
            extensions: vec!["md".to_string(), "txt".to_string(), ".PDF".to_string()],
            poll_interval_seconds: 1,
        })
    }

    fn watcher(dir: &Path, store: MemoryVectorStore) -> (Watcher, Arc<ScriptedClassifier>) {
        let backend = Arc::new(ScriptedClassifier::always(sample_classification(0.9)));
        let (pipeline, _) = pipeline_with(store, backend.clone(), ScriptedEmbedder::new(DIMS));
        (Watcher::new(config_for(dir), Arc::new(pipeline)), backend)
    }

    #[test]
    fn test_should_ignore() {
        let config = config_for(Path::new("/docs"));
        assert!(config.should_ignore(Path::new("/docs/.hidden.md")));
        assert!(config.should_ignore(Path::new("/docs/file.tmp")));
        assert!(config.should_ignore(Path::new("/docs/drafts")));
        assert!(!config.should_ignore(Path::new("/docs/paper.md")));
        assert!(config.wants_extension(Path::new("/docs/scan.pdf")));
        assert!(!config.wants_extension(Path::new("/docs/photo.jpg")));
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("drafts")).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.md"), "b").unwrap();
        std::fs::write(dir.path().join("sub/a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("drafts/c.md"), "c").unwrap();
        std::fs::write(dir.path().join("notes.tmp"), "x").unwrap();
        std::fs::write(dir.path().join("photo.jpg"), "x").unwrap();

        let (watcher, _) = watcher(dir.path(), MemoryVectorStore::new(DIMS));
        let names: Vec<String> = watcher
            .scan()
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["b.md", "sub/a.txt"]);
    }

    #[tokio::test]
    async fn test_cycle_indexes_new_then_skips_known() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("one.md"), "# One\n\nFirst document.").unwrap();
        std::fs::write(dir.path().join("two.txt"), "Second document.").unwrap();

        let store = MemoryVectorStore::new(DIMS);
        let (mut watcher, backend) = watcher(dir.path(), store.clone());

        let first = watcher.cycle().await;
        assert_eq!(first.scanned, 2);
        assert_eq!(first.indexed, 2);
        assert_eq!(watcher.state(), WatchState::Idle);

        let second = watcher.cycle().await;
        assert_eq!(second.indexed, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(backend.calls(), 2);
        assert_eq!(store.list_documents(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_on_one_file_does_not_abort_cycle() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a_empty.md"), "   \n").unwrap();
        std::fs::write(dir.path().join("b_bad.txt"), [0xffu8, 0xfe, 0x00]).unwrap();
        std::fs::write(dir.path().join("c_good.md"), "Readable content.").unwrap();

        let (mut watcher, _) = watcher(dir.path(), MemoryVectorStore::new(DIMS));
        let report = watcher.cycle().await;
        assert_eq!(report.scanned, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(report.indexed, 1);

        // Permanent failures are remembered until the file changes.
        let again = watcher.cycle().await;
        assert_eq!(again.failed, 0);
        assert_eq!(again.unchanged, 3);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_next_cycle() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("paper.md"), "Body text.").unwrap();

        let backend = Arc::new(ScriptedClassifier::new(vec![
            Err(vellum_ollama::OllamaError::Connection("refused".into())),
            Ok(sample_classification(0.9)),
        ]));
        let (pipeline, _) = pipeline_with(
            MemoryVectorStore::new(DIMS),
            backend.clone(),
            ScriptedEmbedder::new(DIMS),
        );
        let mut watcher = Watcher::new(config_for(dir.path()), Arc::new(pipeline));

        assert_eq!(watcher.cycle().await.failed, 1);
        assert_eq!(watcher.cycle().await.indexed, 1);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "Alpha.").unwrap();

        let store = MemoryVectorStore::new(DIMS);
        let (mut watcher, _) = watcher(dir.path(), store.clone());
        let (tx, rx) = watch::channel(false);

        let stopper = async {
            while store.list_documents(1).await.unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(5), watcher.run(rx)),
            stopper
        );
        assert!(result.unwrap().is_ok());
    }
}
