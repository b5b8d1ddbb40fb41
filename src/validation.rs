//! Input validation for CLI and configuration values.

use std::path::Path;

use crate::config::MAX_WORKERS;
use crate::error::{PreprocessError, Result};

/// Longest owner label accepted.
pub const MAX_OWNER_LABEL_LEN: usize = 100;

/// Validation utilities for user-supplied inputs
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// An export source must be an existing directory.
    pub fn validate_export_path(path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(PreprocessError::InvalidInput("Export path cannot be empty".to_string()));
        }

        if !path.exists() {
            return Err(PreprocessError::InvalidInput(format!(
                "Export path does not exist: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(PreprocessError::InvalidInput(format!(
                "Export path is not a directory: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Validate worker count
    pub fn validate_workers(workers: usize) -> Result<()> {
        if workers == 0 {
            return Err(PreprocessError::InvalidInput("Worker count must be greater than 0".to_string()));
        }

        if workers > MAX_WORKERS {
            return Err(PreprocessError::InvalidInput(format!(
                "Worker count too large (max {MAX_WORKERS})"
            )));
        }

        Ok(())
    }

    /// Validate an owner label
    pub fn validate_owner_label(label: &str) -> Result<()> {
        if label.trim().is_empty() {
            return Err(PreprocessError::InvalidInput("Owner label cannot be empty".to_string()));
        }

        if label.chars().count() > MAX_OWNER_LABEL_LEN {
            return Err(PreprocessError::InvalidInput(format!(
                "Owner label too long (max {MAX_OWNER_LABEL_LEN} characters)"
            )));
        }

        if label.chars().any(char::is_control) {
            return Err(PreprocessError::InvalidInput(
                "Owner label contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }

    /// Drop control characters and surrounding whitespace.
    #[must_use]
    pub fn sanitize_owner_label(label: &str) -> String {
        label
            .chars()
            .filter(|c| !c.is_control())
            .collect::<String>()
            .trim()
            .chars()
            .take(MAX_OWNER_LABEL_LEN)
            .collect()
    }
}
