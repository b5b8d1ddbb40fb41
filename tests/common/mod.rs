//! Shared fixtures: synthetic iMessage exports backed by real SQLite files.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

/// Apple nanoseconds for a Unix timestamp in seconds.
pub fn apple_nanos(unix_seconds: i64) -> i64 {
    (unix_seconds - 978_307_200) * 1_000_000_000
}

/// Minimal JPEG signature followed by `tag` so contents can differ.
pub fn jpeg_bytes(tag: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    bytes.extend_from_slice(tag);
    bytes
}

/// PNG signature followed by `tag`.
pub fn png_bytes(tag: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D];
    bytes.extend_from_slice(tag);
    bytes
}

/// Typedstream blob carrying `text` with a one-byte length.
pub fn attributed_body(text: &str) -> Vec<u8> {
    let mut blob = b"\x04\x0bstreamtyped".to_vec();
    blob.extend_from_slice(b"\x81\xe8\x03\x84\x01@\x84\x84\x84\x12NSAttributedString\x00\x84\x84\x08NSObject\x00\x85\x92\x84\x84\x84\x08NSString\x01\x94\x84");
    blob.extend_from_slice(b"\x01+");
    blob.push(u8::try_from(text.len()).expect("short text"));
    blob.extend_from_slice(text.as_bytes());
    blob.extend_from_slice(b"\x86\x84\x02iI\x01\x05\x92");
    blob
}

const SCHEMA: &str = "
CREATE TABLE handle (ROWID INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT NOT NULL);
CREATE TABLE chat (
    ROWID INTEGER PRIMARY KEY AUTOINCREMENT,
    guid TEXT,
    display_name TEXT,
    chat_identifier TEXT,
    style INTEGER
);
CREATE TABLE message (
    ROWID INTEGER PRIMARY KEY AUTOINCREMENT,
    guid TEXT,
    text TEXT,
    attributedBody BLOB,
    date INTEGER,
    is_from_me INTEGER DEFAULT 0,
    handle_id INTEGER DEFAULT 0
);
CREATE TABLE attachment (
    ROWID INTEGER PRIMARY KEY AUTOINCREMENT,
    guid TEXT,
    filename TEXT,
    mime_type TEXT,
    transfer_name TEXT,
    transfer_state INTEGER DEFAULT 0,
    total_bytes INTEGER DEFAULT 0,
    is_outgoing INTEGER DEFAULT 0,
    created_date INTEGER DEFAULT 0
);
CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);
CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
";

/// One attachment row to insert.
#[derive(Debug, Clone)]
pub struct FixtureAttachment {
    pub chat_id: i64,
    pub handle_id: Option<i64>,
    pub is_from_me: bool,
    pub date: i64,
    pub text: Option<String>,
    pub body: Option<Vec<u8>>,
    /// Path below `Attachments/`
    pub relative_path: String,
    pub transfer_name: Option<String>,
    pub mime_type: Option<String>,
    pub transfer_state: i64,
    /// File contents; `None` leaves the file missing
    pub contents: Option<Vec<u8>>,
}

impl FixtureAttachment {
    pub fn new(chat_id: i64, relative_path: &str, contents: Vec<u8>) -> Self {
        let transfer_name = Path::new(relative_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Self {
            chat_id,
            handle_id: None,
            is_from_me: false,
            date: apple_nanos(1_700_000_000),
            text: None,
            body: None,
            relative_path: relative_path.to_string(),
            transfer_name,
            mime_type: Some("image/jpeg".to_string()),
            transfer_state: 5,
            contents: Some(contents),
        }
    }

    pub fn from_handle(mut self, handle_id: i64) -> Self {
        self.handle_id = Some(handle_id);
        self
    }

    pub fn from_me(mut self) -> Self {
        self.is_from_me = true;
        self
    }

    pub fn at(mut self, unix_seconds: i64) -> Self {
        self.date = apple_nanos(unix_seconds);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_mime(mut self, mime: Option<&str>) -> Self {
        self.mime_type = mime.map(ToString::to_string);
        self
    }

    pub fn with_transfer_state(mut self, state: i64) -> Self {
        self.transfer_state = state;
        self
    }

    pub fn missing_file(mut self) -> Self {
        self.contents = None;
        self
    }
}

/// Which database location the fixture uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureLayout {
    Desktop,
    Mobile,
}

/// A synthetic export directory.
pub struct ExportFixture {
    pub root: PathBuf,
    pub layout: FixtureLayout,
    conn: Connection,
}

impl ExportFixture {
    pub fn desktop(parent: &Path, name: &str) -> Self {
        Self::create(parent, name, FixtureLayout::Desktop)
    }

    pub fn mobile(parent: &Path, name: &str) -> Self {
        Self::create(parent, name, FixtureLayout::Mobile)
    }

    fn create(parent: &Path, name: &str, layout: FixtureLayout) -> Self {
        let root = parent.join(name);
        let db_path = match layout {
            FixtureLayout::Desktop => root.join("chat.db"),
            FixtureLayout::Mobile => root.join("SMS").join("sms.db"),
        };
        fs::create_dir_all(db_path.parent().expect("db parent")).expect("Failed to create export dir");
        let attachments = db_path.parent().expect("db parent").join("Attachments");
        fs::create_dir_all(attachments).expect("Failed to create attachment dir");

        let conn = Connection::open(&db_path).expect("Failed to create database");
        conn.execute_batch(SCHEMA).expect("Failed to create schema");

        Self { root, layout, conn }
    }

    /// Directory stored paths resolve against
    pub fn attachment_root(&self) -> PathBuf {
        match self.layout {
            FixtureLayout::Desktop => self.root.clone(),
            FixtureLayout::Mobile => self.root.join("SMS"),
        }
    }

    fn stored_prefix(&self) -> &'static str {
        match self.layout {
            FixtureLayout::Desktop => "~/Library/Messages/",
            FixtureLayout::Mobile => "~/Library/SMS/",
        }
    }

    pub fn add_handle(&self, id: &str) -> i64 {
        self.conn
            .execute("INSERT INTO handle (id) VALUES (?1)", params![id])
            .expect("insert handle");
        self.conn.last_insert_rowid()
    }

    pub fn add_chat(&self, identifier: Option<&str>, display_name: Option<&str>, style: Option<i64>) -> i64 {
        self.conn
            .execute(
                "INSERT INTO chat (guid, display_name, chat_identifier, style) VALUES (?1, ?2, ?3, ?4)",
                params![identifier.map(|i| format!("iMessage;-;{i}")), display_name, identifier, style],
            )
            .expect("insert chat");
        self.conn.last_insert_rowid()
    }

    pub fn add_group_chat(&self, identifier: &str, display_name: Option<&str>) -> i64 {
        self.add_chat(Some(identifier), display_name, Some(43))
    }

    pub fn add_direct_chat(&self, identifier: &str) -> i64 {
        self.add_chat(Some(identifier), None, Some(45))
    }

    /// Write a file below `Attachments/` without a database row.
    pub fn write_attachment_file(&self, relative_path: &str, contents: &[u8]) -> PathBuf {
        let path = self.attachment_root().join("Attachments").join(relative_path);
        fs::create_dir_all(path.parent().expect("attachment parent")).expect("create attachment dir");
        fs::write(&path, contents).expect("write attachment");
        path
    }

    /// Insert message, attachment and join rows; writes the file when it has contents.
    pub fn add_attachment(&self, attachment: &FixtureAttachment) -> i64 {
        self.conn
            .execute(
                "INSERT INTO message (guid, text, attributedBody, date, is_from_me, handle_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    format!("msg-{}", attachment.relative_path),
                    attachment.text,
                    attachment.body,
                    attachment.date,
                    i64::from(attachment.is_from_me),
                    attachment.handle_id.unwrap_or(0),
                ],
            )
            .expect("insert message");
        let message_id = self.conn.last_insert_rowid();

        let total_bytes = attachment.contents.as_ref().map_or(0, |c| c.len() as i64);
        self.conn
            .execute(
                "INSERT INTO attachment (guid, filename, mime_type, transfer_name, transfer_state, total_bytes, is_outgoing)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    format!("att-{}", attachment.relative_path),
                    format!("{}Attachments/{}", self.stored_prefix(), attachment.relative_path),
                    attachment.mime_type,
                    attachment.transfer_name,
                    attachment.transfer_state,
                    total_bytes,
                    i64::from(attachment.is_from_me),
                ],
            )
            .expect("insert attachment");
        let attachment_id = self.conn.last_insert_rowid();

        self.conn
            .execute(
                "INSERT INTO message_attachment_join (message_id, attachment_id) VALUES (?1, ?2)",
                params![message_id, attachment_id],
            )
            .expect("insert message_attachment_join");
        self.conn
            .execute(
                "INSERT INTO chat_message_join (chat_id, message_id) VALUES (?1, ?2)",
                params![attachment.chat_id, message_id],
            )
            .expect("insert chat_message_join");

        if let Some(contents) = &attachment.contents {
            self.write_attachment_file(&attachment.relative_path, contents);
        }

        attachment_id
    }

    pub fn write_contacts(&self, vcf: &str) -> PathBuf {
        let path = self.root.join("contacts.vcf");
        fs::write(&path, vcf).expect("write contacts");
        path
    }
}
