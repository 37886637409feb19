//! Input resolution: turn a row's `file_path` cell into a document on disk.
//!
//! Relative paths resolve against the directory holding the store file, so
//! a store and its attachment folder can be moved together. The PDF magic
//! bytes (`%PDF`) are checked here so a misnamed spreadsheet or HTML page
//! fails with a clear marker instead of a pdfium parse error.

use crate::error::{ExtractionError, RowError};
use crate::store::RowStore;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

/// Resolve `file_path` for a row and check it names a readable PDF.
///
/// # Errors
/// - [`RowError::MissingFile`] when nothing exists at the resolved path
/// - [`RowError::Extraction`] (`Unreadable`) when the file cannot be read
///   or does not start with `%PDF`
pub fn locate_document(store: &RowStore, file_path: &str) -> Result<PathBuf, RowError> {
    let path = store.resolve_path(file_path.trim());

    if !path.is_file() {
        return Err(RowError::MissingFile { path });
    }

    let mut file = std::fs::File::open(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RowError::MissingFile { path: path.clone() }
        } else {
            ExtractionError::Unreadable(format!("{}: {e}", path.display())).into()
        }
    })?;

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(ExtractionError::Unreadable(format!(
            "{} is not a PDF file",
            path.display()
        ))
        .into());
    }

    debug!("Resolved document: {}", path.display());
    Ok(path)
}
