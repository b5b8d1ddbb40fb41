//! Output layout and the metadata document writer.
//!
//! A processed output directory looks like:
//!
//! ```text
//! <output>/
//!   metadata.json
//!   media/
//!   issues/failure-report.json   (only when something failed)
//! ```

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::MetadataDocument;

/// Metadata document file name.
pub const METADATA_FILE: &str = "metadata.json";
/// Directory holding copied media.
pub const MEDIA_DIR: &str = "media";

/// Media directory inside `output_dir`
#[must_use]
pub fn media_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(MEDIA_DIR)
}

/// Create the output and media directories.
pub fn prepare_output_dir(output_dir: &Path) -> Result<PathBuf> {
    let media = media_dir(output_dir);
    create_dir_all(&media)?;
    Ok(media)
}

/// Write `document` as pretty JSON to `<output_dir>/metadata.json`.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_metadata(document: &MetadataDocument, output_dir: &Path) -> Result<PathBuf> {
    create_dir_all(output_dir)?;
    let file_path = output_dir.join(METADATA_FILE);

    let file = File::create(&file_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document)?;
    writeln!(writer)?;
    writer.flush()?;

    Ok(file_path)
}

/// Read a metadata document back.
pub fn read_metadata(output_dir: &Path) -> Result<MetadataDocument> {
    let file = File::open(output_dir.join(METADATA_FILE))?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}
