//! Run statistics
//!
//! Every skip and failure category of a preprocessing run is counted here so
//! silent recoveries stay auditable. The block is printed at the end of a run
//! and published through the `metrics` facade for any installed recorder.

use std::fmt;

use metrics::counter;
use serde::{Deserialize, Serialize};

/// Counters accumulated over one preprocessing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Export sources queried successfully
    pub exports_processed: u64,
    /// Export sources that failed (unknown layout, unreadable database)
    pub exports_failed: u64,
    /// Handles in the merged contact map
    pub contacts_loaded: u64,
    /// Attachment records produced by all queries
    pub total_attachments: u64,
    /// Live photo video companions synthesized
    pub live_photos: u64,
    /// Rows whose file was not on disk
    pub missing_files: u64,
    /// Rows whose file matched a banned pattern
    pub banned_files: u64,
    /// Rows whose file was neither image nor video
    pub non_media_files: u64,
    /// Rows that could not be read
    pub malformed_rows: u64,
    /// Rich-text blobs that failed to decode
    pub body_decode_failures: u64,
    /// Files that could not be hashed
    pub hash_failures: u64,
    /// Distinct files copied to the output
    pub unique_files: u64,
    /// Extra occurrences of copied files
    pub duplicate_files: u64,
    /// Successful copies
    pub files_copied: u64,
    /// Failed copies
    pub copy_failures: u64,
    /// Output names whose extension was corrected from the file signature
    pub extensions_corrected: u64,
    /// Records left out of conversations for lack of a conversation id
    pub unassigned_records: u64,
    /// Conversations in the output document
    pub conversations: u64,
}

impl RunStats {
    /// Counter names and values, in display order.
    #[must_use]
    pub const fn entries(&self) -> [(&'static str, u64); 18] {
        [
            ("exports_processed", self.exports_processed),
            ("exports_failed", self.exports_failed),
            ("contacts_loaded", self.contacts_loaded),
            ("total_attachments", self.total_attachments),
            ("live_photos", self.live_photos),
            ("missing_files", self.missing_files),
            ("banned_files", self.banned_files),
            ("non_media_files", self.non_media_files),
            ("malformed_rows", self.malformed_rows),
            ("body_decode_failures", self.body_decode_failures),
            ("hash_failures", self.hash_failures),
            ("unique_files", self.unique_files),
            ("duplicate_files", self.duplicate_files),
            ("files_copied", self.files_copied),
            ("copy_failures", self.copy_failures),
            ("extensions_corrected", self.extensions_corrected),
            ("unassigned_records", self.unassigned_records),
            ("conversations", self.conversations),
        ]
    }

    /// Emit every counter as `memoria_imessage_<name>`.
    pub fn publish(&self) {
        for (name, value) in self.entries() {
            counter!(format!("memoria_imessage_{name}")).increment(value);
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "iMessage preprocessing statistics")?;
        writeln!(f, "---------------------------------")?;
        for (name, value) in self.entries() {
            writeln!(f, "{name:<22} {value}")?;
        }
        Ok(())
    }
}
