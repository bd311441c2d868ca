//! Configuration module for filedrop.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{DropError, Result};

/// Longest identifier the allocator will generate.
pub const MAX_ID_LENGTH: usize = 32;

/// Longest accepted retention window (100 years).
pub const MAX_RETENTION_HOURS: u64 = 24 * 365 * 100;

/// Storage and retention configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding blobs and the metadata file.
    #[serde(default = "default_upload_directory")]
    pub upload_directory: String,
    /// Name of the metadata file inside the upload directory.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
    /// Hours a file stays downloadable.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// Number of hex characters in a file identifier.
    #[serde(default = "default_id_length")]
    pub id_length: usize,
    /// Collision retries before giving up on allocation.
    #[serde(default = "default_max_id_attempts")]
    pub max_id_attempts: usize,
    /// Age in seconds before an unreferenced blob is swept.
    #[serde(default = "default_orphan_grace")]
    pub orphan_grace_secs: u64,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_upload_directory() -> String {
    "uploads".to_string()
}

fn default_metadata_file() -> String {
    "metadata.json".to_string()
}

fn default_retention_hours() -> u64 {
    96
}

fn default_id_length() -> usize {
    4
}

fn default_max_id_attempts() -> usize {
    1000
}

fn default_orphan_grace() -> u64 {
    3600 // 1 hour
}

fn default_max_upload_size() -> u64 {
    100
}

impl StorageConfig {
    /// Retention window as a chrono duration, capped at [`MAX_RETENTION_HOURS`].
    pub fn retention_window(&self) -> chrono::Duration {
        let hours = self.retention_hours.min(MAX_RETENTION_HOURS);
        chrono::Duration::hours(hours as i64)
    }

    /// Grace period before orphan blobs are swept.
    pub fn orphan_grace(&self) -> Duration {
        Duration::from_secs(self.orphan_grace_secs)
    }

    /// Full path to the metadata file.
    pub fn metadata_path(&self) -> PathBuf {
        Path::new(&self.upload_directory).join(&self.metadata_file)
    }

    /// Maximum upload size in bytes. Saturates for absurdly large limits.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_directory: default_upload_directory(),
            metadata_file: default_metadata_file(),
            retention_hours: default_retention_hours(),
            id_length: default_id_length(),
            max_id_attempts: default_max_id_attempts(),
            orphan_grace_secs: default_orphan_grace(),
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

/// Share link configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShareConfig {
    /// Base URL prepended to identifiers in share links.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Host address to bind.
    #[serde(default = "default_web_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            cors_origins: vec![],
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/filedrop.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Storage and retention configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Share link configuration.
    #[serde(default)]
    pub share: ShareConfig,
    /// HTTP transport configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(DropError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| DropError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILEDROP_BASE_URL`: Override the share link base URL
    pub fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("FILEDROP_BASE_URL") {
            if !base_url.is_empty() {
                self.share.base_url = Some(base_url);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.retention_hours == 0 {
            return Err(DropError::Config(
                "retention_hours must be greater than zero".to_string(),
            ));
        }
        if self.storage.retention_hours > MAX_RETENTION_HOURS {
            return Err(DropError::Config(format!(
                "retention_hours must be at most {MAX_RETENTION_HOURS}"
            )));
        }
        if self.storage.id_length == 0 || self.storage.id_length > MAX_ID_LENGTH {
            return Err(DropError::Config(format!(
                "id_length must be between 1 and {MAX_ID_LENGTH}"
            )));
        }
        if self.storage.max_id_attempts == 0 {
            return Err(DropError::Config(
                "max_id_attempts must be greater than zero".to_string(),
            ));
        }
        if self.storage.max_upload_size_mb.checked_mul(1024 * 1024).is_none() {
            return Err(DropError::Config(
                "max_upload_size_mb is too large".to_string(),
            ));
        }
        if self.storage.metadata_file.is_empty() {
            return Err(DropError::Config("metadata_file must be set".to_string()));
        }
        Ok(())
    }
}
