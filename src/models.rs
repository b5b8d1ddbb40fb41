//! Data models for attachment extraction and the output document
//!
//! [`AttachmentRecord`] is what the query engine produces per attachment.
//! Everything else in this module is the shape of `metadata.json`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

/// Kind of conversation an attachment was shared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// Multi-party chat
    Group,
    /// One-to-one chat
    Direct,
}

/// One resolved (message, file) pair from an export database.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRecord {
    /// Attachment row id in the source database
    pub attachment_id: i64,
    /// File on disk, verified to exist when the record was created
    pub source_path: PathBuf,
    /// Original file name as sent
    pub transfer_name: String,
    /// Declared MIME type
    pub mime_type: Option<String>,
    /// Declared size in bytes
    pub total_bytes: i64,
    /// True if the attachment was sent from this device
    pub is_outgoing: bool,
    /// Message timestamp
    pub sent_at: Option<DateTime<Utc>>,
    /// Message timestamp in display form
    pub created: Option<String>,
    /// Message text, empty when there is none
    pub content: String,
    /// True if the export owner sent the message
    pub is_from_me: bool,
    /// Display name of the sender
    pub sender: String,
    /// Conversation identifier, may be empty
    pub conversation_id: String,
    /// Group or direct
    pub conversation_kind: ConversationKind,
    /// Display title of the conversation
    pub conversation_title: String,
    /// Name of the export directory the record came from
    pub source_export: String,
    /// xxHash64 of the file content, set by the deduplication stage
    pub content_hash: Option<String>,
    /// Set on the video half of a live photo: the image's attachment id
    pub live_photo_image_id: Option<i64>,
}

impl AttachmentRecord {
    /// True for the synthesized video companion of a live photo
    #[must_use]
    pub const fn is_live_photo_video(&self) -> bool {
        self.live_photo_image_id.is_some()
    }

    /// Media kind as reported in the output document
    #[must_use]
    pub fn media_kind(&self) -> MediaKind {
        MediaKind::from_declared(self.mime_type.as_deref(), &self.transfer_name)
    }

    /// Name to derive the output file name from.
    #[must_use]
    pub fn original_name(&self) -> String {
        if self.transfer_name.is_empty() {
            self.source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            self.transfer_name.clone()
        }
    }

    /// Per-occurrence context of this record
    #[must_use]
    pub fn occurrence(&self) -> Occurrence {
        Occurrence {
            source_export: self.source_export.clone(),
            conversation_id: self.conversation_id.clone(),
            conversation_type: self.conversation_kind,
            conversation_title: self.conversation_title.clone(),
            sender: self.sender.clone(),
            created: self.created.clone(),
            content: self.content.clone(),
            is_sender: self.is_from_me,
        }
    }
}

/// Where and by whom one copy of a file was shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Export directory name
    pub source_export: String,
    /// Conversation identifier
    pub conversation_id: String,
    /// Group or direct
    pub conversation_type: ConversationKind,
    /// Conversation display title
    pub conversation_title: String,
    /// Sender display name
    pub sender: String,
    /// Message timestamp
    pub created: Option<String>,
    /// Message text
    pub content: String,
    /// True if the export owner sent it
    pub is_sender: bool,
}

/// A file shared once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleEntry {
    /// Sharing context
    #[serde(flatten)]
    pub occurrence: Occurrence,
    /// File name under `media/`
    pub media_file: String,
    /// Image or video
    pub media_type: MediaKind,
    /// Present on live photo video companions
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_live_photo_video: bool,
}

/// A file shared several times, stored once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedEntry {
    /// File name under `media/`
    pub media_file: String,
    /// Timestamp of the primary occurrence
    pub primary_created: Option<String>,
    /// Always true
    pub is_duplicate: bool,
    /// Image or video
    pub media_type: MediaKind,
    /// Present on live photo video companions
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_live_photo_video: bool,
    /// Every occurrence, primary first
    pub messages: Vec<Occurrence>,
}

/// Entry in a conversation's message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageEntry {
    /// Multi-occurrence record
    Merged(MergedEntry),
    /// Single-occurrence record
    Single(SingleEntry),
}

impl MessageEntry {
    /// File name under `media/`
    #[must_use]
    pub fn media_file(&self) -> &str {
        match self {
            Self::Single(entry) => &entry.media_file,
            Self::Merged(entry) => &entry.media_file,
        }
    }

    /// Number of logical occurrences this entry stands for
    #[must_use]
    pub fn occurrence_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Merged(entry) => entry.messages.len(),
        }
    }
}

/// A chat thread and the media shared in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Group or direct
    pub kind: ConversationKind,
    /// Display title
    pub title: String,
    /// Always equals `messages.len()`
    pub message_count: usize,
    /// Entries in the order they were assembled
    pub messages: Vec<MessageEntry>,
}

impl Conversation {
    /// Create an empty conversation
    #[must_use]
    pub const fn new(kind: ConversationKind, title: String) -> Self {
        Self {
            kind,
            title,
            message_count: 0,
            messages: Vec::new(),
        }
    }

    /// Append an entry, keeping `message_count` in step
    pub fn push(&mut self, entry: MessageEntry) {
        self.messages.push(entry);
        self.message_count = self.messages.len();
    }
}

/// Provenance block of the metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportInfo {
    /// First export directory
    pub export_path: String,
    /// Every export directory, in input order
    pub export_paths: Vec<String>,
    /// Owner label
    pub export_username: String,
    /// When the run happened, `YYYY-MM-DD HH:MM:SS UTC`
    pub processed_date: String,
    /// Number of handles in the merged contact map
    pub contacts_loaded: usize,
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Provenance
    pub export_info: ExportInfo,
    /// Conversations keyed by identifier
    pub conversations: BTreeMap<String, Conversation>,
    /// Always empty for iMessage; every attachment belongs to a message
    pub orphaned_media: Vec<serde_json::Value>,
}
