//! Error types for the cn-extract library.
//!
//! Two tiers mirror the two scopes of failure in a run:
//!
//! * [`PipelineError`] — **Fatal**: the run cannot proceed or cannot save
//!   its work (store missing or corrupt, persist failed, provider not
//!   configured). Returned as `Err(PipelineError)` from
//!   [`crate::processor::RowProcessor::run`].
//!
//! * [`RowError`] — **Non-fatal**: one row failed (file missing, no password
//!   unlocks the document, a capability call failed). Caught at the row
//!   boundary and written into the row's error-marker cell; processing moves
//!   on to the next row.

use std::path::PathBuf;
use thiserror::Error;

/// Prefix every error-marker cell starts with.
pub const ERROR_MARKER_PREFIX: &str = "ERROR:";

/// All fatal errors returned by the cn-extract library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Store errors ──────────────────────────────────────────────────────
    /// The store file does not exist.
    #[error("Store file not found: '{path}'")]
    StoreNotFound { path: PathBuf },

    /// The store file exists but could not be read or parsed.
    #[error("Store file '{path}' is unreadable: {detail}")]
    StoreCorrupt { path: PathBuf, detail: String },

    /// A sheet the run depends on is absent.
    #[error("Sheet '{name}' not found in store '{path}'")]
    SheetMissing { path: PathBuf, name: String },

    /// Writing the store back to disk failed.
    #[error("Failed to persist store '{path}': {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required value is absent from a parameters sheet.
    #[error("Parameter '{name}' not set in sheet '{sheet}'")]
    ParameterMissing { sheet: String, name: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Service errors ────────────────────────────────────────────────────
    /// The configured LLM provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure for a single row.
///
/// [`RowError::marker`] renders the text written into the row's
/// error-marker cell.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowError {
    /// The document is not present at the resolved path.
    #[error("File not found: {}", path.display())]
    MissingFile { path: PathBuf },

    /// Neither the empty password nor any candidate unlocked the document.
    #[error("Password protected ({attempts} attempts rejected)")]
    DecryptionFailure { attempts: usize },

    /// Rasterisation, text recognition or field extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl RowError {
    /// Text stored in the error-marker cell for this failure.
    pub fn marker(&self) -> String {
        match self {
            RowError::MissingFile { path } => {
                format!("{ERROR_MARKER_PREFIX} File not found: {}", path.display())
            }
            RowError::DecryptionFailure { .. } => {
                format!("{ERROR_MARKER_PREFIX} Password protected")
            }
            RowError::Extraction(e) => format!("{ERROR_MARKER_PREFIX} {e}"),
        }
    }
}

/// Failures in the stages after a document has been unlocked.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionError {
    /// The document could not be opened for reasons other than a password.
    #[error("Unreadable document: {0}")]
    Unreadable(String),

    /// pdfium failed to render a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    Rasterisation { page: usize, detail: String },

    /// A rendered page could not be PNG-encoded.
    #[error("Image encoding failed for page {page}: {detail}")]
    Encoding { page: usize, detail: String },

    /// The text-recognition capability failed.
    #[error("Text recognition failed on page {page}: {detail}")]
    Recognition { page: usize, detail: String },

    /// The field-extraction capability failed.
    #[error("Field extraction failed: {0}")]
    FieldExtraction(String),

    /// The model replied but no JSON object could be parsed from the reply.
    #[error("Could not parse model reply as JSON: {0}")]
    UnparseableResponse(String),

    /// An external capability call exceeded its time budget.
    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },
}
