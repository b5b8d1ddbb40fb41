//! Application configuration
//!
//! Layered with the `config` crate: built-in defaults, then optional
//! `config/default`, `config/local` and `memoria` files, then `MEMORIA_*`
//! environment variables (`MEMORIA_PREPROCESS__WORKERS=4`).

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{PreprocessError, Result};

/// Largest worker pool accepted.
pub const MAX_WORKERS: usize = 256;

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings
    pub logging: LoggingConfig,
    /// Pipeline settings
    pub preprocess: PreprocessConfig,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level filter used when `RUST_LOG` is unset
    pub level: String,
    /// Log file; empty disables file logging
    pub file_path: String,
    /// `text` or `json`
    pub format: String,
}

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Threads used for hashing and copying
    pub workers: usize,
    /// Owner label; empty derives it from the export directory name
    pub owner_name: String,
    /// Output directory; empty uses `<first export parent>/imessage-processed`
    pub output_directory: String,
    /// Contact card used when none is found next to an export
    pub contacts_fallback_path: String,
    /// Extra banned file-name patterns
    pub extra_banned_patterns: Vec<String>,
    /// Read size used while hashing
    pub hash_chunk_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: String::new(),
                format: "text".to_string(),
            },
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            owner_name: String::new(),
            output_directory: String::new(),
            contacts_fallback_path: "/mnt/media/originals/contacts.vcf".to_string(),
            extra_banned_patterns: Vec::new(),
            hash_chunk_size: 64 * 1024,
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("memoria").required(false))
            .add_source(
                Environment::with_prefix("MEMORIA")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("preprocess.extra_banned_patterns")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(PreprocessError::InvalidConfig(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(PreprocessError::InvalidConfig(format!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format, valid_formats
            )));
        }

        if self.preprocess.workers == 0 || self.preprocess.workers > MAX_WORKERS {
            return Err(PreprocessError::InvalidConfig(format!(
                "workers must be between 1 and {MAX_WORKERS}, got {}",
                self.preprocess.workers
            )));
        }

        if self.preprocess.hash_chunk_size == 0 {
            return Err(PreprocessError::InvalidConfig(
                "hash_chunk_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Log file, if one is configured
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        non_empty_path(&self.logging.file_path)
    }

    /// True when logs should be JSON
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.logging.format == "json"
    }
}

impl PreprocessConfig {
    /// Configured output directory, if any
    #[must_use]
    pub fn output_directory(&self) -> Option<PathBuf> {
        non_empty_path(&self.output_directory).map(Path::to_path_buf)
    }

    /// Configured owner label, if any
    #[must_use]
    pub fn owner_name(&self) -> Option<&str> {
        Some(self.owner_name.trim()).filter(|name| !name.is_empty())
    }

    /// Configured fallback contact card, if any
    #[must_use]
    pub fn contacts_fallback(&self) -> Option<&Path> {
        non_empty_path(&self.contacts_fallback_path)
    }
}

fn non_empty_path(value: &str) -> Option<&Path> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| Path::new(trimmed))
}
