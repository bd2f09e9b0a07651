//! Application paths management.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Platform locations for config, local cache database and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    pub cache_file: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    /// Create paths using platform-specific directories.
    pub fn new() -> Option<Self> {
        let proj_dirs = ProjectDirs::from("org", "vellum", "vellum")?;
        Some(Self::from_dirs(
            proj_dirs.config_dir().to_path_buf(),
            proj_dirs.data_dir().to_path_buf(),
        ))
    }

    /// Build paths rooted at explicit directories.
    pub fn from_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("config.toml"),
            cache_file: data_dir.join("classification_cache.db"),
            log_dir: data_dir.join("logs"),
            config_dir,
            data_dir,
        }
    }

    /// Re-root the data directory, as `[general] data_dir` asks.
    pub fn with_data_dir(self, data_dir: PathBuf) -> Self {
        Self::from_dirs(self.config_dir, data_dir)
    }

    /// Create all necessary directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }

    /// Check if vellum has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.config_file.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_paths_layout() {
        let paths = AppPaths::from_dirs(PathBuf::from("/cfg"), PathBuf::from("/data"));
        assert_eq!(paths.config_file, PathBuf::from("/cfg/config.toml"));
        assert_eq!(
            paths.cache_file,
            PathBuf::from("/data/classification_cache.db")
        );

        let moved = paths.with_data_dir(PathBuf::from("/srv/vellum"));
        assert_eq!(moved.config_file, PathBuf::from("/cfg/config.toml"));
        assert_eq!(moved.log_dir, PathBuf::from("/srv/vellum/logs"));
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::from_dirs(dir.path().join("cfg"), dir.path().join("data"));
        paths.ensure_dirs().unwrap();
        assert!(paths.log_dir.is_dir());
        assert!(!paths.is_initialized());
    }
}
