//! Progress-callback trait for per-row processing events.
//!
//! Inject an [`Arc<dyn RowProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the processor walks the row store. The CLI renders them as a
//! progress bar; a service could forward them to a log or a channel.
//!
//! # Example
//!
//! ```rust
//! use cn_extract::{PipelineConfig, RowProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl RowProgressCallback for CountingCallback {
//!     fn on_row_complete(&self, row_id: Option<u64>, fields_found: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("row {:?}: {} fields", row_id, fields_found);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .progress_callback(cb as Arc<dyn RowProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the row processor as it handles each row.
///
/// All methods default to no-ops so implementors override only what they
/// need. Rows are processed sequentially; events for one row never
/// interleave with another's.
pub trait RowProgressCallback: Send + Sync {
    /// Called once before the first row.
    ///
    /// * `total_rows` — data rows in the sheet (including ones that will be skipped)
    fn on_run_start(&self, total_rows: usize) {
        let _ = total_rows;
    }

    /// Called when a row is picked up for processing.
    fn on_row_start(&self, row_id: Option<u64>, file_name: &str) {
        let _ = (row_id, file_name);
    }

    /// Called as a row moves between pipeline stages ("decrypting",
    /// "rasterising 3 pages", ...).
    fn on_row_stage(&self, row_id: Option<u64>, stage: &str) {
        let _ = (row_id, stage);
    }

    /// Called when a row's fields have been written.
    ///
    /// * `fields_found` — schema fields the extractor actually found
    fn on_row_complete(&self, row_id: Option<u64>, fields_found: usize) {
        let _ = (row_id, fields_found);
    }

    /// Called when a row ends with an error marker.
    fn on_row_error(&self, row_id: Option<u64>, marker: &str) {
        let _ = (row_id, marker);
    }

    /// Called when a row is skipped without processing.
    fn on_row_skipped(&self, row_id: Option<u64>, reason: &str) {
        let _ = (row_id, reason);
    }

    /// Called once after every row has been visited.
    fn on_run_complete(&self, processed: usize, failed: usize) {
        let _ = (processed, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RowProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn RowProgressCallback>;
