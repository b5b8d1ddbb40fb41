//! iMessage database schema definitions
//!
//! Table and column names of the `chat.db` / `sms.db` tables read by the
//! attachment query. Both layouts share the same schema.

/// `transfer_state` value of a fully downloaded attachment
pub const TRANSFER_COMPLETE: i64 = 5;

/// `chat.style` value of a group conversation
pub const GROUP_CHAT_STYLE: i64 = 43;

/// Attachment table schema
pub mod attachment {
    /// Table name
    pub const TABLE: &str = "attachment";
    /// Primary key column
    pub const ROWID: &str = "ROWID";
    /// Globally unique identifier column
    pub const GUID: &str = "guid";
    /// Home-relative file path column
    pub const FILENAME: &str = "filename";
    /// Declared MIME type column
    pub const MIME_TYPE: &str = "mime_type";
    /// Original file name column
    pub const TRANSFER_NAME: &str = "transfer_name";
    /// Transfer state column
    pub const TRANSFER_STATE: &str = "transfer_state";
    /// File size column
    pub const TOTAL_BYTES: &str = "total_bytes";
    /// Outgoing flag column
    pub const IS_OUTGOING: &str = "is_outgoing";
    /// Creation timestamp column
    pub const CREATED_DATE: &str = "created_date";
}

/// Message table schema
pub mod message {
    /// Table name
    pub const TABLE: &str = "message";
    /// Primary key column
    pub const ROWID: &str = "ROWID";
    /// Globally unique identifier column
    pub const GUID: &str = "guid";
    /// Plain text column
    pub const TEXT: &str = "text";
    /// Serialized rich-text column
    pub const ATTRIBUTED_BODY: &str = "attributedBody";
    /// Message timestamp column (Apple epoch nanoseconds)
    pub const DATE: &str = "date";
    /// Flag indicating the message was sent by the owner
    pub const IS_FROM_ME: &str = "is_from_me";
    /// Foreign key to the handle table
    pub const HANDLE_ID: &str = "handle_id";
}

/// Message to attachment join table
pub mod message_attachment_join {
    /// Table name
    pub const TABLE: &str = "message_attachment_join";
    /// Foreign key to the message table
    pub const MESSAGE_ID: &str = "message_id";
    /// Foreign key to the attachment table
    pub const ATTACHMENT_ID: &str = "attachment_id";
}

/// Chat to message join table
pub mod chat_message_join {
    /// Table name
    pub const TABLE: &str = "chat_message_join";
    /// Foreign key to the chat table
    pub const CHAT_ID: &str = "chat_id";
    /// Foreign key to the message table
    pub const MESSAGE_ID: &str = "message_id";
}

/// Chat table schema
pub mod chat {
    /// Table name
    pub const TABLE: &str = "chat";
    /// Primary key column
    pub const ROWID: &str = "ROWID";
    /// Conversation identifier column
    pub const GUID: &str = "guid";
    /// Group name column
    pub const DISPLAY_NAME: &str = "display_name";
    /// Counterpart handle or group identifier column
    pub const CHAT_IDENTIFIER: &str = "chat_identifier";
    /// Chat style column (43 = group)
    pub const STYLE: &str = "style";
}

/// Handle table schema
pub mod handle {
    /// Table name
    pub const TABLE: &str = "handle";
    /// Primary key column
    pub const ROWID: &str = "ROWID";
    /// Phone number or email column
    pub const ID: &str = "id";
}
