//! Configuration types for apidiff

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{ApiDiffError, Result};

/// Directory name used under `$HOME` when no storage directory is configured
pub const DEFAULT_STORAGE_DIR: &str = ".apidiff";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory holding one subdirectory per recorded session
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Persistence wait barrier used by comparisons
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Rendering of JSON body differences
    #[serde(default)]
    pub diff: DiffConfig,
    /// HTTP transport settings
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_storage_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join(DEFAULT_STORAGE_DIR)
}

/// Bounded polling for cassettes flushed in the background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Delay between two existence checks
    pub poll_interval_ms: u64,
    /// Number of checks before giving up
    pub max_attempts: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_attempts: 50, // ~5s ceiling
        }
    }
}

impl PersistenceConfig {
    /// Delay between two existence checks
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on the total wait
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.poll_interval() * self.max_attempts
    }
}

/// Rendering options for JSON body deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Render array positions (`items[2]`) instead of `items[]`
    pub show_array_index: bool,
    /// Wrap delta lines in ANSI colors
    pub coloring: bool,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            show_array_index: true,
            coloring: false,
        }
    }
}

/// HTTP transport settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bound on DNS lookup, TCP connect and TLS handshake combined
    pub connect_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
        }
    }
}

impl HttpConfig {
    /// Connection setup bound
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            persistence: PersistenceConfig::default(),
            diff: DiffConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ApiDiffError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ApiDiffError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.storage_dir.as_os_str().is_empty() {
            return Err(ApiDiffError::Config(
                "storage_dir cannot be empty".to_string(),
            ));
        }

        if self.persistence.poll_interval_ms == 0 {
            return Err(ApiDiffError::Config(
                "persistence.poll_interval_ms must be > 0".to_string(),
            ));
        }

        if self.persistence.max_attempts == 0 {
            return Err(ApiDiffError::Config(
                "persistence.max_attempts must be > 0".to_string(),
            ));
        }

        if self.http.connect_timeout_ms == 0 {
            return Err(ApiDiffError::Config(
                "http.connect_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Create the storage directory if it does not exist yet
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn ensure_storage_dir(&self) -> Result<()> {
        if !self.storage_dir.exists() {
            std::fs::create_dir_all(&self.storage_dir)?;
        }
        Ok(())
    }
}
