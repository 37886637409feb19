//! # cn-extract
//!
//! Extract structured transaction fields from password-protected
//! Confirmation Note (CN) PDFs into a row store.
//!
//! Each row of the store names a PDF and carries up to three candidate
//! passwords. The processor unlocks the document, rasterises its pages,
//! reads them with a vision model and asks a text model for twelve fixed
//! fields (operation type, currency, amounts, NAV, dates). Results or an
//! error marker go back into the row; passwords are cleared once the row is
//! extracted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! row
//!  │
//!  ├─ 1. Input    resolve file_path against the store directory
//!  ├─ 2. Decrypt  no password, then each candidate in order (pdfium)
//!  ├─ 3. Render   every page at dpi/72 scale → PNG
//!  ├─ 4. OCR      page images → text, pages in order
//!  ├─ 5. Extract  text (first 4000 chars) → JSON fields
//!  └─ 6. Record   fields + clear secrets, or an "ERROR: …" marker
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cn_extract::{process_store, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Local models through Ollama by default.
//!     let config = PipelineConfig::default();
//!     let summary = process_store("cn_database.json", config).await?;
//!     println!("{} rows processed, {} failed", summary.processed, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cn-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! cn-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod credentials;
pub mod error;
pub mod fields;
pub mod intake;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use credentials::{stage_secrets, CandidateSecrets, CredentialTable, StagingError};
pub use error::{ExtractionError, PipelineError, RowError};
pub use fields::{CnField, ExtractedFields, FieldMap};
pub use intake::{run_intake, AttachmentQuery, AttachmentSource, IntakeSummary};
pub use pipeline::decrypt::{Document, DocumentEngine, OpenError, PdfiumEngine};
pub use pipeline::extract::{FieldExtractor, LlmFieldExtractor};
pub use pipeline::ocr::{TextRecognizer, VisionTextRecognizer};
pub use pipeline::render::PageImage;
pub use processor::{process_store, RowProcessor, RowState, RunSummary};
pub use progress::{NoopProgressCallback, ProgressCallback, RowProgressCallback};
pub use store::{CellValue, RowRecord, RowStatus, RowStore};
