//! Preprocessing orchestrator.
//!
//! Runs contacts -> per-export queries -> deduplication -> metadata for one
//! or more exports. Failures are recovered at the narrowest scope: a bad
//! export is skipped, a bad file is reported, and only output I/O ends a run.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::PreprocessConfig;
use crate::contacts::{find_contacts_vcf, ContactMap};
use crate::db::{owner_label_from_path, AttachmentQuery, ExportSource};
use crate::dedup::Deduplicator;
use crate::error::{PreprocessError, Result};
use crate::failure_tracker::FailureTracker;
use crate::file_writer::{prepare_output_dir, write_metadata};
use crate::logging::OperationTimer;
use crate::media::{BannedFilesFilter, ExtensionCorrector, SignatureCorrector};
use crate::metrics::RunStats;
use crate::models::{AttachmentRecord, ExportInfo, MetadataDocument};
use crate::timestamp::format_timestamp;
use crate::validation::InputValidator;

/// Name recorded in failure reports.
pub const PROCESSOR_NAME: &str = "iMessage";
/// Output directory created next to the first export when none is configured.
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "imessage-processed";

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Counters for the run
    pub stats: RunStats,
    /// The document written to disk
    pub document: MetadataDocument,
    /// Path of `metadata.json`
    pub metadata_path: PathBuf,
    /// Path of the failure report, when one was written
    pub failure_report: Option<PathBuf>,
}

/// Per-run state handed explicitly between phases.
struct RunContext {
    contacts: ContactMap,
    stats: RunStats,
    failures: FailureTracker,
}

/// Preprocesses one or more iMessage exports into a single output.
pub struct Preprocessor {
    export_paths: Vec<PathBuf>,
    output_dir: PathBuf,
    owner_name: String,
    settings: PreprocessConfig,
    corrector: Box<dyn ExtensionCorrector>,
}

impl Preprocessor {
    /// Set up a run over `export_paths`.
    pub fn new(export_paths: Vec<PathBuf>, settings: PreprocessConfig) -> Result<Self> {
        let first = export_paths
            .first()
            .ok_or_else(|| PreprocessError::InvalidInput("At least one export path is required".to_string()))?;
        InputValidator::validate_workers(settings.workers)?;

        let output_dir = settings
            .output_directory()
            .unwrap_or_else(|| default_output_dir(first));

        let owner_name = match settings.owner_name() {
            Some(name) => {
                InputValidator::validate_owner_label(name)?;
                InputValidator::sanitize_owner_label(name)
            }
            None => owner_label_from_path(first),
        };

        Ok(Self {
            export_paths,
            output_dir,
            owner_name,
            settings,
            corrector: Box::new(SignatureCorrector),
        })
    }

    /// Replace the extension corrector
    #[must_use]
    pub fn with_corrector(mut self, corrector: Box<dyn ExtensionCorrector>) -> Self {
        self.corrector = corrector;
        self
    }

    /// Where output goes
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Owner label written to the document
    #[must_use]
    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    /// Run the whole pipeline.
    pub fn run(&self) -> Result<RunSummary> {
        info!(exports = self.export_paths.len(), output = %self.output_dir.display(), "Starting iMessage preprocessing");

        let export_list = self
            .export_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>();

        let mut ctx = RunContext {
            contacts: self.load_contacts(),
            stats: RunStats::default(),
            failures: FailureTracker::new(PROCESSOR_NAME, &export_list.join(", ")),
        };
        ctx.stats.contacts_loaded = ctx.contacts.len() as u64;

        let records = self.query_exports(&mut ctx);
        ctx.stats.total_attachments = records.len() as u64;
        if records.is_empty() {
            warn!("No attachments found in any export");
        }

        let media_dir = prepare_output_dir(&self.output_dir)?;
        let deduplicator = Deduplicator::new(
            &media_dir,
            self.settings.workers,
            self.settings.hash_chunk_size,
            self.corrector.as_ref(),
        )?;
        let outcome = deduplicator.run(records, &mut ctx.stats, &mut ctx.failures)?;

        let document = MetadataDocument {
            export_info: ExportInfo {
                export_path: export_list.first().cloned().unwrap_or_default(),
                export_paths: export_list,
                export_username: self.owner_name.clone(),
                processed_date: format_timestamp(&Utc::now()),
                contacts_loaded: ctx.contacts.len(),
            },
            conversations: outcome.conversations,
            orphaned_media: Vec::new(),
        };
        let metadata_path = write_metadata(&document, &self.output_dir)?;
        let failure_report = ctx.failures.save_report(&self.output_dir)?;

        ctx.stats.publish();
        info!(
            unique_files = ctx.stats.unique_files,
            duplicate_files = ctx.stats.duplicate_files,
            conversations = ctx.stats.conversations,
            "iMessage preprocessing complete"
        );

        Ok(RunSummary {
            stats: ctx.stats,
            document,
            metadata_path,
            failure_report,
        })
    }

    /// Merge contact cards of every export; later exports win.
    fn load_contacts(&self) -> ContactMap {
        let timer = OperationTimer::new("contacts");
        let mut contacts = ContactMap::new();
        for export in &self.export_paths {
            match find_contacts_vcf(export, self.settings.contacts_fallback()) {
                Some(path) => contacts.merge(ContactMap::from_file(&path)),
                None => info!(export = %export.display(), "No contact card found"),
            }
        }
        timer.finish();
        contacts
    }

    /// Query every export, skipping the ones that fail.
    fn query_exports(&self, ctx: &mut RunContext) -> Vec<AttachmentRecord> {
        let timer = OperationTimer::new("query");
        let banned = BannedFilesFilter::new(&self.settings.extra_banned_patterns);
        let query = AttachmentQuery::new(&ctx.contacts, &banned);
        let mut records = Vec::new();

        for export in &self.export_paths {
            let result = ExportSource::detect(export).and_then(|source| query.run(&source, &mut ctx.stats));
            match result {
                Ok(found) => {
                    ctx.stats.exports_processed += 1;
                    records.extend(found);
                }
                Err(e) => {
                    error!(export = %export.display(), error = %e, "Failed to process export");
                    ctx.stats.exports_failed += 1;
                }
            }
        }

        timer.finish();
        records
    }
}

/// `<parent of export>/imessage-processed`
#[must_use]
pub fn default_output_dir(first_export: &Path) -> PathBuf {
    first_export
        .parent()
        .unwrap_or(first_export)
        .join(DEFAULT_OUTPUT_DIR_NAME)
}
