//! Configuration for hierarchy-params

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hierarchy-params")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database and config file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Database file name inside `data_dir`
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// Serve reads from a separate connection (file databases only)
    #[serde(default = "default_true")]
    pub read_split: bool,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Number of pool workers started at boot
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Upper bound on pool workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Maximum queued operations before callers wait
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Caller-side operation timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Language used to localize error messages
    #[serde(default = "default_language")]
    pub default_language: String,
}

fn default_db_file() -> String {
    "parameters.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_worker_count() -> usize {
    10
}

fn default_max_workers() -> usize {
    20
}

fn default_max_queue_size() -> usize {
    256
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_language() -> String {
    "es".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: default_db_file(),
            read_split: true,
            busy_timeout_ms: default_busy_timeout(),
            worker_count: default_worker_count(),
            max_workers: default_max_workers(),
            max_queue_size: default_max_queue_size(),
            request_timeout_ms: default_request_timeout(),
            default_language: default_language(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get database path
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// Workers actually started, never above `max_workers`
    pub fn effective_workers(&self) -> usize {
        self.worker_count.clamp(1, self.max_workers.max(1))
    }
}
