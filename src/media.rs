//! Media classification helpers.
//!
//! Three collaborators used while resolving and copying attachments:
//! the banned-file filter, the image/video classifier and the
//! signature-based extension corrector.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Extensions treated as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".heic", ".heif", ".tiff", ".tif", ".dng", ".avif",
];

/// Extensions treated as video.
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".webm", ".mkv", ".m4v"];

/// NAS, photo-manager and OS artifacts that never count as media.
pub const DEFAULT_BANNED_PATTERNS: &[&str] = &[
    "@eaDir",
    "@__thumb",
    "SYNOFILE_THUMB_",
    "Lightroom Catalog",
    "thumbnails",
    ".DS_Store",
    "._",
    ".photostructure",
];

/// Detected mime type -> canonical extension and its category.
const SIGNATURE_EXTENSIONS: &[(&str, &str, MediaKind)] = &[
    ("image/jpeg", ".jpg", MediaKind::Image),
    ("image/png", ".png", MediaKind::Image),
    ("image/gif", ".gif", MediaKind::Image),
    ("image/webp", ".webp", MediaKind::Image),
    ("image/heif", ".heic", MediaKind::Image),
    ("image/heic", ".heic", MediaKind::Image),
    ("image/tiff", ".tiff", MediaKind::Image),
    ("image/bmp", ".bmp", MediaKind::Image),
    ("image/avif", ".avif", MediaKind::Image),
    ("video/mp4", ".mp4", MediaKind::Video),
    ("video/quicktime", ".mov", MediaKind::Video),
    ("video/x-msvideo", ".avi", MediaKind::Video),
    ("video/webm", ".webm", MediaKind::Video),
    ("video/x-matroska", ".mkv", MediaKind::Video),
    ("video/x-m4v", ".m4v", MediaKind::Video),
];

/// Spellings of the same format.
const EXTENSION_ALIASES: &[(&str, &str)] = &[(".jpeg", ".jpg"), (".heif", ".heic"), (".tif", ".tiff")];

/// Kind of media file as written to the metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaKind {
    /// Still image
    Image,
    /// Video clip
    Video,
}

impl MediaKind {
    /// Decide the kind from a declared mime type, falling back to the file name.
    ///
    /// Anything declaring a non-image mime type is treated as video.
    #[must_use]
    pub fn from_declared(mime_type: Option<&str>, file_name: &str) -> Self {
        match mime_type.map(str::trim).filter(|m| !m.is_empty()) {
            Some(mime) if mime.contains("image") => Self::Image,
            Some(_) => Self::Video,
            None => classify_media(Path::new(file_name)).unwrap_or(Self::Video),
        }
    }
}

/// Lowercased extension including the leading dot, or an empty string.
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Classify a path as image or video by extension.
#[must_use]
pub fn classify_media(path: &Path) -> Option<MediaKind> {
    kind_for_extension(&extension_of(path))
}

fn kind_for_extension(ext: &str) -> Option<MediaKind> {
    if IMAGE_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

fn canonical_alias(ext: &str) -> &str {
    EXTENSION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == ext)
        .map_or(ext, |(_, canonical)| *canonical)
}

/// Name-based filter for platform cache and system artifacts.
#[derive(Debug, Clone)]
pub struct BannedFilesFilter {
    patterns: Vec<String>,
}

impl Default for BannedFilesFilter {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl BannedFilesFilter {
    /// Build a filter with the default patterns plus `extra`.
    #[must_use]
    pub fn new(extra: &[String]) -> Self {
        let mut patterns: Vec<String> = DEFAULT_BANNED_PATTERNS.iter().map(ToString::to_string).collect();
        for pattern in extra {
            if !pattern.is_empty() && !patterns.contains(pattern) {
                patterns.push(pattern.clone());
            }
        }
        Self { patterns }
    }

    /// True when the file name equals or starts with a banned pattern.
    #[must_use]
    pub fn is_banned(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        self.patterns.iter().any(|pattern| name.starts_with(pattern.as_str()))
    }

    /// Active patterns
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Decides whether a file's real format disagrees with its declared name.
pub trait ExtensionCorrector: Send + Sync {
    /// The extension (with leading dot) the file should carry, or `None`
    /// when `declared_name` is already right or nothing could be detected.
    fn corrected_extension(&self, path: &Path, declared_name: &str) -> Option<String>;
}

/// [`ExtensionCorrector`] backed by magic-byte inspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureCorrector;

impl SignatureCorrector {
    /// Compare a detected mime type against the declared extension.
    ///
    /// Only corrections within the same category are accepted, and alias
    /// spellings of one format are left alone.
    #[must_use]
    pub fn correction_for(detected_mime: &str, declared_name: &str) -> Option<String> {
        let (_, detected_ext, detected_kind) = SIGNATURE_EXTENSIONS
            .iter()
            .find(|(mime, _, _)| *mime == detected_mime)?;

        let declared_ext = extension_of(Path::new(declared_name));
        if canonical_alias(&declared_ext) == canonical_alias(detected_ext) {
            return None;
        }

        let declared_kind = kind_for_extension(&declared_ext)
            .or_else(|| (declared_ext == ".bmp").then_some(MediaKind::Image))?;
        if declared_kind != *detected_kind {
            debug!(
                name = declared_name,
                from = %declared_ext,
                to = detected_ext,
                "Skipping cross-category extension correction"
            );
            return None;
        }

        Some((*detected_ext).to_string())
    }
}

impl ExtensionCorrector for SignatureCorrector {
    fn corrected_extension(&self, path: &Path, declared_name: &str) -> Option<String> {
        match infer::get_from_path(path) {
            Ok(Some(kind)) => Self::correction_for(kind.mime_type(), declared_name),
            Ok(None) => None,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Signature detection failed");
                None
            }
        }
    }
}
