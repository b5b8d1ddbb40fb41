//! Plain-text extraction from `message.attributedBody` blobs.
//!
//! The column holds an `NSAttributedString` archived with `NSTypedStream`.
//! Only the embedded `NSString` payload is recovered; styling runs are
//! ignored apart from a few marker scans that flag mentions and inline
//! attachments.

use thiserror::Error;

/// `NSTypedStream` magic: version byte, length byte, then `streamtyped`.
pub const TYPEDSTREAM_HEADER: &[u8; 13] = b"\x04\x0bstreamtyped";

/// Marker preceding the length-prefixed UTF-8 payload.
pub const TEXT_MARKER: &[u8; 2] = b"\x01+";

const MENTION_MARKER: &[u8] = b"__kIMMentionConfirmedMention";
const INLINE_ATTACHMENT_MARKER: &[u8] = b"__kIMFileTransferGUIDAttributeName";

/// U+FFFC, inserted where an attachment sits inline in the text.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';
const REPLACEMENT_CHARACTER: char = '\u{FFFD}';

/// Why a blob could not be decoded. The `Display` text is the diagnostic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BodyDecodeError {
    /// Blob shorter than the typedstream header
    #[error("blob too short ({0} bytes)")]
    TooShort(usize),

    /// Header bytes do not match
    #[error("invalid NSTypedStream header")]
    InvalidHeader,

    /// No `0x01 '+'` marker anywhere in the blob
    #[error("no text marker found")]
    MissingTextMarker,

    /// Blob ends inside the length prefix
    #[error("truncated length prefix")]
    TruncatedLength,

    /// Leading length byte is not one of the known forms
    #[error("unknown length encoding: 0x{0:02x}")]
    UnknownLengthEncoding(u8),

    /// Declared length runs past the end of the blob
    #[error("text extends beyond blob ({end} > {len})")]
    TextOutOfBounds {
        /// Byte offset where the text would end
        end: usize,
        /// Blob length
        len: usize,
    },
}

/// Decoded text plus the auxiliary flags found in the blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBody {
    /// Text exactly as stored, replacement characters included
    pub text: String,
    /// Blob carries a confirmed-mention attribute
    pub has_mentions: bool,
    /// Blob carries a file-transfer attribute
    pub has_inline_attachment: bool,
    /// Decoded text contains U+FFFC
    pub has_object_replacement: bool,
}

/// Decode an `attributedBody` blob into plain text.
///
/// Length prefix forms after the marker:
///
/// | lead   | following bytes                          | length             |
/// |--------|------------------------------------------|--------------------|
/// | `0x00` | none                                     | empty string       |
/// | `<0x80`| none                                     | the lead byte      |
/// | `0x81` | `lo hi` with `lo < 0x80`                 | `lo + 256 * hi`    |
/// | `0x81` | `n 0x00` with `n >= 0x80`                | `n`                |
/// | `0x82` | 2 bytes big-endian                       | that value         |
/// | `0x84` | 4 bytes big-endian                       | that value         |
pub fn decode_attributed_body(blob: &[u8]) -> Result<DecodedBody, BodyDecodeError> {
    if blob.len() < TYPEDSTREAM_HEADER.len() {
        return Err(BodyDecodeError::TooShort(blob.len()));
    }
    if !blob.starts_with(TYPEDSTREAM_HEADER) {
        return Err(BodyDecodeError::InvalidHeader);
    }

    let marker = find_subsequence(blob, TEXT_MARKER).ok_or(BodyDecodeError::MissingTextMarker)?;
    let length_start = marker + TEXT_MARKER.len();
    if length_start >= blob.len() {
        return Err(BodyDecodeError::TruncatedLength);
    }

    let Some((text_start, text_length)) = read_length(blob, length_start)? else {
        return Ok(DecodedBody::default());
    };

    let text_end = text_start
        .checked_add(text_length)
        .filter(|end| *end <= blob.len())
        .ok_or(BodyDecodeError::TextOutOfBounds {
            end: text_start.saturating_add(text_length),
            len: blob.len(),
        })?;

    let text = String::from_utf8_lossy(&blob[text_start..text_end]).into_owned();
    let has_object_replacement = text.contains(OBJECT_REPLACEMENT);

    Ok(DecodedBody {
        text,
        has_mentions: find_subsequence(blob, MENTION_MARKER).is_some(),
        has_inline_attachment: find_subsequence(blob, INLINE_ATTACHMENT_MARKER).is_some(),
        has_object_replacement,
    })
}

/// Returns `(text_start, text_length)`, or `None` for the empty-string form.
fn read_length(blob: &[u8], at: usize) -> Result<Option<(usize, usize)>, BodyDecodeError> {
    let byte = |offset: usize| blob.get(at + offset).copied().map(usize::from);

    match blob[at] {
        0x00 => Ok(None),
        lead if lead < 0x80 => Ok(Some((at + 1, usize::from(lead)))),
        0x81 => {
            if at + 2 >= blob.len() {
                return Err(BodyDecodeError::TruncatedLength);
            }
            let second = byte(1).ok_or(BodyDecodeError::TruncatedLength)?;
            if second < 0x80 {
                let third = byte(2).ok_or(BodyDecodeError::TruncatedLength)?;
                Ok(Some((at + 3, second | (third << 8))))
            } else {
                // single length byte followed by a zero pad
                Ok(Some((at + 3, second)))
            }
        }
        0x82 => {
            if at + 2 >= blob.len() {
                return Err(BodyDecodeError::TruncatedLength);
            }
            let length = (usize::from(blob[at + 1]) << 8) | usize::from(blob[at + 2]);
            Ok(Some((at + 3, length)))
        }
        0x84 => {
            if at + 4 >= blob.len() {
                return Err(BodyDecodeError::TruncatedLength);
            }
            let raw = u32::from_be_bytes([blob[at + 1], blob[at + 2], blob[at + 3], blob[at + 4]]);
            let length = usize::try_from(raw).map_err(|_| BodyDecodeError::TextOutOfBounds {
                end: usize::MAX,
                len: blob.len(),
            })?;
            Ok(Some((at + 5, length)))
        }
        other => Err(BodyDecodeError::UnknownLengthEncoding(other)),
    }
}

/// Remove object-replacement and replacement characters, then trim.
#[must_use]
pub fn strip_placeholders(text: &str) -> String {
    text.chars()
        .filter(|c| *c != OBJECT_REPLACEMENT && *c != REPLACEMENT_CHARACTER)
        .collect::<String>()
        .trim()
        .to_string()
}

/// True when something other than placeholders and whitespace remains.
#[must_use]
pub fn has_meaningful_text(text: Option<&str>) -> bool {
    text.is_some_and(|t| !strip_placeholders(t).is_empty())
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
