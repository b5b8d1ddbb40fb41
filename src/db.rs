//! Export source detection and the attachment query.
//!
//! An export is either a Mac copy of `~/Library/Messages` (`chat.db` at the
//! root) or an iPhone backup extract (`SMS/sms.db`). Both are read with one
//! join across attachment, message, chat and handle tables; every row is then
//! resolved against the file system into zero, one or two
//! [`AttachmentRecord`]s.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{Connection, OpenFlags, Row};
use thiserror::Error;
use tracing::{debug, info};

use crate::attributed_body::{decode_attributed_body, has_meaningful_text, strip_placeholders, BodyDecodeError};
use crate::contacts::ContactMap;
use crate::error::{PreprocessError, Result};
use crate::media::{classify_media, BannedFilesFilter};
use crate::metrics::RunStats;
use crate::models::{AttachmentRecord, ConversationKind};
use crate::schema::{
    attachment, chat, chat_message_join, handle, message, message_attachment_join, GROUP_CHAT_STYLE,
    TRANSFER_COMPLETE,
};
use crate::timestamp::{convert_apple_timestamp, format_timestamp};

/// Transfer name iOS gives the still half of a live photo.
pub const LIVE_PHOTO_IMAGE: &str = "lp_image.HEIC";
/// Sibling file holding the motion half.
pub const LIVE_PHOTO_VIDEO: &str = "lp_image.MOV";
/// Sender shown for messages the export owner sent.
pub const OWNER_SENDER: &str = "me";
/// Owner label used when none can be derived.
pub const UNKNOWN_OWNER: &str = "unknown";

#[allow(clippy::expect_used)]
static OWNER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(mac|iph\w+)-messages-\d{8}").expect("valid regex"));

/// Which device produced an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportLayout {
    /// Mac `~/Library/Messages` copy
    Desktop,
    /// iPhone backup extract
    Mobile,
}

impl ExportLayout {
    /// Database location relative to the export root
    #[must_use]
    pub const fn database_path(self) -> &'static str {
        match self {
            Self::Desktop => "chat.db",
            Self::Mobile => "SMS/sms.db",
        }
    }

    /// Attachment directory relative to the export root
    #[must_use]
    pub const fn attachments_path(self) -> &'static str {
        match self {
            Self::Desktop => "Attachments",
            Self::Mobile => "SMS/Attachments",
        }
    }

    /// Both the database file and the attachment directory exist below `root`
    fn present_in(self, root: &Path) -> bool {
        root.join(self.database_path()).is_file() && root.join(self.attachments_path()).is_dir()
    }

    /// Home-relative prefix stored in `attachment.filename`
    #[must_use]
    pub const fn home_prefix(self) -> &'static str {
        match self {
            Self::Desktop => "~/Library/Messages/",
            Self::Mobile => "~/Library/SMS/",
        }
    }

    /// Same prefix without the home marker, as found in absolute paths
    const fn library_marker(self) -> &'static str {
        match self {
            Self::Desktop => "/Library/Messages/",
            Self::Mobile => "/Library/SMS/",
        }
    }

    /// Short name used in logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Desktop => "mac",
            Self::Mobile => "iphone",
        }
    }
}

/// One export directory with its detected layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSource {
    root: PathBuf,
    layout: ExportLayout,
}

impl ExportSource {
    /// Detect the layout of `root`.
    ///
    /// A layout matches only when its database and its `Attachments/`
    /// directory are both present.
    pub fn detect(root: &Path) -> Result<Self> {
        let layout = if ExportLayout::Desktop.present_in(root) {
            ExportLayout::Desktop
        } else if ExportLayout::Mobile.present_in(root) {
            ExportLayout::Mobile
        } else {
            return Err(PreprocessError::UnknownExportLayout(root.to_path_buf()));
        };

        Ok(Self {
            root: root.to_path_buf(),
            layout,
        })
    }

    /// Export directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Detected layout
    #[must_use]
    pub const fn layout(&self) -> ExportLayout {
        self.layout
    }

    /// Final component of the export directory
    #[must_use]
    pub fn name(&self) -> String {
        export_name(&self.root)
    }

    /// Path of the message database
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.root.join(self.layout.database_path())
    }

    /// Directory stored attachment paths are relative to
    #[must_use]
    pub fn attachment_root(&self) -> PathBuf {
        match self.layout {
            ExportLayout::Desktop => self.root.clone(),
            ExportLayout::Mobile => self.root.join("SMS"),
        }
    }

    /// Map a stored `attachment.filename` onto the export's file system.
    #[must_use]
    pub fn resolve_attachment_path(&self, stored: &str) -> PathBuf {
        let prefix = self.layout.home_prefix();
        let marker = self.layout.library_marker();
        let relative = stored
            .strip_prefix(prefix)
            .or_else(|| stored.find(marker).map(|at| &stored[at + marker.len()..]))
            .unwrap_or_else(|| stored.trim_start_matches("~/").trim_start_matches('/'));
        self.attachment_root().join(relative)
    }

    /// Open the database read-only.
    pub fn connect(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI;
        Ok(Connection::open_with_flags(self.database_path(), flags)?)
    }
}

/// Final component of a directory path, lossily converted.
#[must_use]
pub fn export_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Derive the owner label from an export directory name.
///
/// `mac-messages-20240101` gives `mac`, `iphone14-messages-20240101` gives
/// `iphone14`; anything else is [`UNKNOWN_OWNER`].
#[must_use]
pub fn owner_label_from_path(path: &Path) -> String {
    let name = export_name(path);
    OWNER_PATTERN
        .captures(&name)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| UNKNOWN_OWNER.to_string(), |m| m.as_str().to_string())
}

/// Why a row produced no records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowSkip {
    /// Resolved file is not on disk
    #[error("attachment file not found: {}", .0.display())]
    MissingFile(PathBuf),
    /// File name matched a banned pattern
    #[error("banned file: {}", .0.display())]
    Banned(PathBuf),
    /// Neither image nor video
    #[error("not a media file: {}", .0.display())]
    NotMedia(PathBuf),
    /// Row could not be read
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// Columns of one joined attachment row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentRow {
    /// `attachment.ROWID`
    pub attachment_id: i64,
    /// `attachment.filename`
    pub filename: String,
    /// `attachment.mime_type`
    pub mime_type: Option<String>,
    /// `attachment.transfer_name`
    pub transfer_name: Option<String>,
    /// `attachment.total_bytes`
    pub total_bytes: Option<i64>,
    /// `attachment.is_outgoing`
    pub is_outgoing: Option<i64>,
    /// `message.text`
    pub text: Option<String>,
    /// `message.attributedBody`
    pub attributed_body: Option<Vec<u8>>,
    /// `message.date`
    pub message_date: Option<i64>,
    /// `message.is_from_me`
    pub is_from_me: Option<i64>,
    /// `chat.display_name`
    pub chat_display_name: Option<String>,
    /// `chat.chat_identifier`
    pub chat_identifier: Option<String>,
    /// `chat.style`
    pub chat_style: Option<i64>,
    /// `handle.id` of the sender
    pub sender_id: Option<String>,
}

/// Records produced by one row, plus any rich-text problem met on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    /// The attachment record, followed by its live photo companion if any
    pub records: Vec<AttachmentRecord>,
    /// Set when the rich-text body was present but could not be decoded
    pub body_error: Option<BodyDecodeError>,
}

/// The joined attachment query.
#[must_use]
pub fn attachment_query_sql() -> String {
    format!(
        "SELECT a.{a_id} AS attachment_id, a.{a_filename} AS filename, a.{a_mime} AS mime_type, \
         a.{a_transfer} AS transfer_name, a.{a_bytes} AS total_bytes, a.{a_outgoing} AS is_outgoing, \
         m.{m_text} AS text, m.{m_body} AS attributed_body, m.{m_date} AS message_date, \
         m.{m_from_me} AS is_from_me, c.{c_name} AS chat_display_name, \
         c.{c_ident} AS chat_identifier, c.{c_style} AS chat_style, h.{h_id} AS sender_id \
         FROM {a_table} a \
         JOIN {maj} maj ON a.{a_id} = maj.{maj_attachment} \
         JOIN {m_table} m ON maj.{maj_message} = m.{m_id} \
         JOIN {cmj} cmj ON m.{m_id} = cmj.{cmj_message} \
         JOIN {c_table} c ON cmj.{cmj_chat} = c.{c_id} \
         LEFT JOIN {h_table} h ON m.{m_handle} = h.{h_rowid} \
         WHERE a.{a_filename} IS NOT NULL AND a.{a_state} = {complete} \
         ORDER BY m.{m_date}",
        a_table = attachment::TABLE,
        a_id = attachment::ROWID,
        a_filename = attachment::FILENAME,
        a_mime = attachment::MIME_TYPE,
        a_transfer = attachment::TRANSFER_NAME,
        a_bytes = attachment::TOTAL_BYTES,
        a_outgoing = attachment::IS_OUTGOING,
        a_state = attachment::TRANSFER_STATE,
        complete = TRANSFER_COMPLETE,
        maj = message_attachment_join::TABLE,
        maj_attachment = message_attachment_join::ATTACHMENT_ID,
        maj_message = message_attachment_join::MESSAGE_ID,
        m_table = message::TABLE,
        m_id = message::ROWID,
        m_text = message::TEXT,
        m_body = message::ATTRIBUTED_BODY,
        m_date = message::DATE,
        m_from_me = message::IS_FROM_ME,
        m_handle = message::HANDLE_ID,
        cmj = chat_message_join::TABLE,
        cmj_message = chat_message_join::MESSAGE_ID,
        cmj_chat = chat_message_join::CHAT_ID,
        c_table = chat::TABLE,
        c_id = chat::ROWID,
        c_name = chat::DISPLAY_NAME,
        c_ident = chat::CHAT_IDENTIFIER,
        c_style = chat::STYLE,
        h_table = handle::TABLE,
        h_rowid = handle::ROWID,
        h_id = handle::ID,
    )
}

/// Pick the message text: the plain column when it says something, else the
/// decoded rich-text body.
pub fn extract_message_text(
    text: Option<&str>,
    attributed_body: Option<&[u8]>,
) -> std::result::Result<Option<String>, BodyDecodeError> {
    if has_meaningful_text(text) {
        return Ok(text.map(strip_placeholders));
    }

    match attributed_body {
        Some(blob) if !blob.is_empty() => {
            let decoded = decode_attributed_body(blob)?;
            Ok(has_meaningful_text(Some(&decoded.text)).then(|| strip_placeholders(&decoded.text)))
        }
        _ => Ok(None),
    }
}

/// Group when the chat style says so; anything else, including no style, is direct.
#[must_use]
pub const fn conversation_kind(chat_style: Option<i64>) -> ConversationKind {
    match chat_style {
        Some(GROUP_CHAT_STYLE) => ConversationKind::Group,
        _ => ConversationKind::Direct,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Runs the attachment query for export sources.
pub struct AttachmentQuery<'a> {
    contacts: &'a ContactMap,
    banned: &'a BannedFilesFilter,
}

impl<'a> AttachmentQuery<'a> {
    /// Create a query resolving names through `contacts`
    #[must_use]
    pub const fn new(contacts: &'a ContactMap, banned: &'a BannedFilesFilter) -> Self {
        Self { contacts, banned }
    }

    /// Query one export source.
    ///
    /// Row-level problems are counted in `stats` and never abort the query.
    pub fn run(&self, source: &ExportSource, stats: &mut RunStats) -> Result<Vec<AttachmentRecord>> {
        let conn = source.connect()?;
        let mut stmt = conn.prepare(&attachment_query_sql())?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        let source_export = source.name();

        while let Some(row) = rows.next()? {
            let resolved = Self::map_attachment_row(row)
                .map_err(|e| RowSkip::Malformed(e.to_string()))
                .and_then(|raw| self.resolve_row(source, &source_export, raw));

            match resolved {
                Ok(resolved) => {
                    if let Some(e) = resolved.body_error {
                        debug!(error = %e, "Could not decode message body");
                        stats.body_decode_failures += 1;
                    }
                    if resolved.records.len() > 1 {
                        stats.live_photos += 1;
                    }
                    records.extend(resolved.records);
                }
                Err(skip) => {
                    debug!(reason = %skip, "Skipping attachment row");
                    match skip {
                        RowSkip::MissingFile(_) => stats.missing_files += 1,
                        RowSkip::Banned(_) => stats.banned_files += 1,
                        RowSkip::NotMedia(_) => stats.non_media_files += 1,
                        RowSkip::Malformed(_) => stats.malformed_rows += 1,
                    }
                }
            }
        }

        info!(
            export = %source_export,
            layout = source.layout().name(),
            records = records.len(),
            "Queried attachments"
        );
        Ok(records)
    }

    /// Map a database row to an [`AttachmentRow`]
    fn map_attachment_row(row: &Row<'_>) -> rusqlite::Result<AttachmentRow> {
        Ok(AttachmentRow {
            attachment_id: row.get("attachment_id")?,
            filename: row.get("filename")?,
            mime_type: row.get("mime_type")?,
            transfer_name: row.get("transfer_name")?,
            total_bytes: row.get("total_bytes")?,
            is_outgoing: row.get("is_outgoing")?,
            text: row.get("text")?,
            attributed_body: row.get("attributed_body")?,
            message_date: row.get("message_date")?,
            is_from_me: row.get("is_from_me")?,
            chat_display_name: row.get("chat_display_name")?,
            chat_identifier: row.get("chat_identifier")?,
            chat_style: row.get("chat_style")?,
            sender_id: row.get("sender_id")?,
        })
    }

    /// Turn one joined row into records.
    pub fn resolve_row(
        &self,
        source: &ExportSource,
        source_export: &str,
        row: AttachmentRow,
    ) -> std::result::Result<ResolvedRow, RowSkip> {
        let source_path = source.resolve_attachment_path(&row.filename);
        if !source_path.is_file() {
            return Err(RowSkip::MissingFile(source_path));
        }
        if self.banned.is_banned(&source_path) {
            return Err(RowSkip::Banned(source_path));
        }
        if classify_media(&source_path).is_none() {
            return Err(RowSkip::NotMedia(source_path));
        }

        let sent_at = row.message_date.and_then(convert_apple_timestamp);
        let conversation_kind = conversation_kind(row.chat_style);
        let conversation_id = row.chat_identifier.clone().unwrap_or_default();
        let conversation_title = match conversation_kind {
            ConversationKind::Group => non_empty(row.chat_display_name.as_deref())
                .unwrap_or(conversation_id.as_str())
                .to_string(),
            ConversationKind::Direct => self.contacts.resolve(&conversation_id),
        };

        let is_from_me = row.is_from_me.unwrap_or(0) != 0;
        let sender = if is_from_me {
            OWNER_SENDER.to_string()
        } else {
            self.contacts.resolve(row.sender_id.as_deref().unwrap_or_default())
        };

        let (content, body_error) =
            match extract_message_text(row.text.as_deref(), row.attributed_body.as_deref()) {
                Ok(text) => (text.unwrap_or_default(), None),
                Err(e) => (String::new(), Some(e)),
            };

        let transfer_name = row.transfer_name.unwrap_or_default();
        let record = AttachmentRecord {
            attachment_id: row.attachment_id,
            source_path,
            transfer_name,
            mime_type: row.mime_type,
            total_bytes: row.total_bytes.unwrap_or(0),
            is_outgoing: row.is_outgoing.unwrap_or(0) != 0,
            sent_at,
            created: sent_at.as_ref().map(format_timestamp),
            content,
            is_from_me,
            sender,
            conversation_id,
            conversation_kind,
            conversation_title,
            source_export: source_export.to_string(),
            content_hash: None,
            live_photo_image_id: None,
        };

        let companion = live_photo_companion(&record);
        let mut records = vec![record];
        records.extend(companion);

        Ok(ResolvedRow { records, body_error })
    }
}

/// Video half of a live photo, when `record` is the still half and the
/// sibling file exists.
#[must_use]
pub fn live_photo_companion(record: &AttachmentRecord) -> Option<AttachmentRecord> {
    if record.transfer_name != LIVE_PHOTO_IMAGE {
        return None;
    }
    let video_path = record.source_path.parent()?.join(LIVE_PHOTO_VIDEO);
    if !video_path.is_file() {
        return None;
    }

    Some(AttachmentRecord {
        source_path: video_path,
        transfer_name: LIVE_PHOTO_VIDEO.to_string(),
        mime_type: Some("video/quicktime".to_string()),
        live_photo_image_id: Some(record.attachment_id),
        ..record.clone()
    })
}
