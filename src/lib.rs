//! Memoria iMessage - attachment extraction and deduplication
//!
//! Reads one or more iMessage exports (Mac `chat.db` copies and iPhone
//! `sms.db` extracts), resolves every completed media attachment to a file,
//! deduplicates identical files across exports and conversations, and writes
//! a conversation-keyed `metadata.json` next to a flat `media/` directory.
//!
//! # Pipeline
//!
//! - Contact cards are merged into a handle -> name map
//! - Each export is queried for attachments with sender and chat context
//! - Files are hashed and copied in parallel, one copy per distinct content
//! - Conversations are rebuilt, with merged entries for repeated files

/// Rich-text message body decoding
pub mod attributed_body;
/// Configuration management
pub mod config;
/// vCard parsing and handle resolution
pub mod contacts;
/// Export detection and the attachment query
pub mod db;
/// Hashing, grouping, copying and conversation assembly
pub mod dedup;
/// Error types
pub mod error;
/// End-of-run failure report
pub mod failure_tracker;
/// Output directory and metadata document
pub mod file_writer;
/// Logging setup and utilities
pub mod logging;
/// Media classification and extension correction
pub mod media;
/// Run statistics
pub mod metrics;
/// Data models and structures
pub mod models;
/// Database schema definitions
pub mod schema;
/// Preprocessing orchestrator
pub mod service;
/// Apple timestamp conversion
pub mod timestamp;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use config::AppConfig;
pub use contacts::ContactMap;
pub use error::{PreprocessError, Result};
pub use metrics::RunStats;
pub use models::{AttachmentRecord, Conversation, MessageEntry, MetadataDocument};
pub use service::{Preprocessor, RunSummary};
