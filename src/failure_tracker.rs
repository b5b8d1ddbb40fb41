//! End-of-run failure report.
//!
//! Hash and copy failures are collected during a run and written to
//! `<output>/issues/failure-report.json` so they can be retried by hand.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

/// Directory under the output root holding failure artifacts.
pub const ISSUES_DIR: &str = "issues";
/// Report file name inside [`ISSUES_DIR`].
pub const REPORT_FILE: &str = "failure-report.json";

/// A file that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingFailure {
    /// File that failed
    pub file_path: String,
    /// Short reason, e.g. "hash failed"
    pub reason: String,
    /// Underlying error text
    pub error_details: String,
    /// Extra fields such as the export or destination
    pub context: BTreeMap<String, String>,
}

/// Counts per failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Every tracked failure
    pub total_failures: usize,
    /// Failures while hashing or copying
    pub failed_processing: usize,
}

/// Serialized report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Processor that produced the report
    pub processor_name: String,
    /// Export directory (or directories) processed
    pub export_directory: String,
    /// When tracking started, RFC 3339
    pub timestamp: String,
    /// Counts
    pub summary: FailureSummary,
    /// Entries in the order they were tracked
    pub failed_processing: Vec<ProcessingFailure>,
}

/// Collects per-file failures for one run.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    processor_name: String,
    export_directory: String,
    timestamp: String,
    failures: Vec<ProcessingFailure>,
}

impl FailureTracker {
    /// Start tracking for `export_directory`
    #[must_use]
    pub fn new(processor_name: &str, export_directory: &str) -> Self {
        Self {
            processor_name: processor_name.to_string(),
            export_directory: export_directory.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            failures: Vec::new(),
        }
    }

    /// Track a file that failed during processing.
    pub fn add_processing_failure(
        &mut self,
        file_path: &Path,
        reason: &str,
        error_details: &str,
        context: BTreeMap<String, String>,
    ) {
        debug!(path = %file_path.display(), reason, "Tracked processing failure");
        self.failures.push(ProcessingFailure {
            file_path: file_path.display().to_string(),
            reason: reason.to_string(),
            error_details: error_details.to_string(),
            context,
        });
    }

    /// True when anything was tracked
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Tracked entries
    #[must_use]
    pub fn failures(&self) -> &[ProcessingFailure] {
        &self.failures
    }

    /// Build the report
    #[must_use]
    pub fn report(&self) -> FailureReport {
        FailureReport {
            processor_name: self.processor_name.clone(),
            export_directory: self.export_directory.clone(),
            timestamp: self.timestamp.clone(),
            summary: FailureSummary {
                total_failures: self.failures.len(),
                failed_processing: self.failures.len(),
            },
            failed_processing: self.failures.clone(),
        }
    }

    /// Write the report under `output_dir` when there is something to report.
    ///
    /// Returns the report path if one was written.
    pub fn save_report(&self, output_dir: &Path) -> Result<Option<PathBuf>> {
        if !self.has_failures() {
            info!("No failures to report");
            return Ok(None);
        }

        let issues_dir = output_dir.join(ISSUES_DIR);
        fs::create_dir_all(&issues_dir)?;
        let report_path = issues_dir.join(REPORT_FILE);

        let writer = BufWriter::new(File::create(&report_path)?);
        serde_json::to_writer_pretty(writer, &self.report())?;

        info!(path = %report_path.display(), failures = self.failures.len(), "Failure report saved");
        Ok(Some(report_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_tracker_writes_nothing() {
        let dir = tempdir().expect("Failed to create temp dir");
        let tracker = FailureTracker::new("iMessage", "/exports/mac");
        assert!(!tracker.has_failures());
        assert_eq!(tracker.save_report(dir.path()).unwrap(), None);
        assert!(!dir.path().join(ISSUES_DIR).exists());
    }

    #[test]
    fn test_report_is_written() {
        let dir = tempdir().expect("Failed to create temp dir");
        let mut tracker = FailureTracker::new("iMessage", "/exports/mac");
        let mut context = BTreeMap::new();
        context.insert("source_export".to_string(), "mac".to_string());
        tracker.add_processing_failure(Path::new("/exports/mac/a.jpg"), "hash failed", "permission denied", context);

        let path = tracker.save_report(dir.path()).unwrap().expect("report path");
        assert_eq!(path, dir.path().join("issues/failure-report.json"));

        let report: FailureReport = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(report.processor_name, "iMessage");
        assert_eq!(report.summary.total_failures, 1);
        assert_eq!(report.failed_processing[0].reason, "hash failed");
        assert_eq!(report.failed_processing[0].context["source_export"], "mac");
    }
}
