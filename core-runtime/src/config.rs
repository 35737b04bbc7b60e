//! # Core Configuration Module
//!
//! Application-level configuration for the library mirror core: where the
//! database lives, where locally cached assets go, and how logging is set
//! up. Component tuning (retry policy, request gate, import batching) lives
//! next to the components themselves.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::new("mirror.db", "/tmp/mirror-cache")
//!     .with_event_buffer(256);
//! assert!(config.validate().is_ok());
//! ```
//!
//! Environment overrides (applied by [`CoreConfig::from_env`]):
//! - `MIRROR_DATABASE_PATH`
//! - `MIRROR_CACHE_DIR`
//! - `MIRROR_LOG` (filter directive, same syntax as `RUST_LOG`)

use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Core configuration for the library mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Directory for locally cached asset files (images, thumbnails)
    pub cache_dir: PathBuf,

    /// Event bus channel buffer size
    pub event_buffer: usize,

    /// Logging setup
    #[serde(skip, default)]
    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Create a configuration with the given database path and cache dir.
    pub fn new(database_path: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            cache_dir: cache_dir.into(),
            event_buffer: crate::events::DEFAULT_EVENT_BUFFER_SIZE,
            logging: LoggingConfig::default(),
        }
    }

    /// Build a configuration from defaults plus environment overrides.
    pub fn from_env(default_database: impl Into<PathBuf>, default_cache: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(default_database, default_cache);

        if let Ok(path) = std::env::var("MIRROR_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("MIRROR_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Ok(directive) = std::env::var("MIRROR_LOG") {
            config.logging = config.logging.with_default_directive(directive);
        }

        config
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn with_event_buffer(mut self, buffer: usize) -> Self {
        self.event_buffer = buffer;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Fail-fast validation of the configured paths.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("database_path must not be empty".to_string()));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("cache_dir must not be empty".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(Error::Config("event_buffer must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_accepts_sane_config() {
        let config = CoreConfig::new("mirror.db", "/tmp/cache");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let config = CoreConfig::new("", "/tmp/cache");
        assert!(config.validate().is_err());

        let config = CoreConfig::new("mirror.db", "");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let config = CoreConfig::new("mirror.db", "/tmp/cache").with_event_buffer(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_round_trip() {
        let config = CoreConfig::new("mirror.db", "/tmp/cache").with_event_buffer(42);
        let json = serde_json::to_string(&config).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = CoreConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.database_path, PathBuf::from("mirror.db"));
        assert_eq!(loaded.event_buffer, 42);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(CoreConfig::from_file(Path::new("/nonexistent/config.json")).is_err());
    }
}
