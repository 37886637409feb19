//! Row processor: walks the row store and drives each row through the
//! pipeline.
//!
//! ## Row lifecycle
//!
//! ```text
//! Pending ──unlock+render──▶ Unlocked ──ocr+extract──▶ Extracted
//!    │                          │                          │
//!    └──────────────────────────┴──────▶ Failed            ▼
//!                                    (marker written)   fields written,
//!                                                       secrets cleared
//! ```
//!
//! Rows run one at a time in ascending id order. The store is a single
//! mutable document with no isolation between writers, so there is no
//! row-level concurrency. A failing row is recorded and the walk moves on;
//! only store I/O errors end the run.
//!
//! The store is persisted after every `persist_every` terminal rows and
//! once more at the end. Both writes of a successful row (fields, secret
//! clear) are applied in memory before the next persist, so the file on disk
//! never holds one without the other.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, RowError};
use crate::fields::{CnField, ExtractedFields};
use crate::pipeline::decrypt::{self, DocumentEngine, PdfiumEngine};
use crate::pipeline::extract::{FieldExtractor, LlmFieldExtractor};
use crate::pipeline::llm::resolve_provider;
use crate::pipeline::ocr::{self, TextRecognizer, VisionTextRecognizer};
use crate::pipeline::render::{self, PageImage};
use crate::pipeline::{bounded, input};
use crate::store::{RowRecord, RowStatus, RowStore};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a row is within one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Pending,
    /// The document opened and every page is rendered.
    Unlocked,
    /// Fields are extracted and written; secrets are cleared.
    Extracted,
    /// An error marker is written; secrets are untouched.
    Failed,
}

impl fmt::Display for RowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RowState::Pending => "pending",
            RowState::Unlocked => "unlocked",
            RowState::Extracted => "extracted",
            RowState::Failed => "failed",
        })
    }
}

/// Counters for one pass over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Data rows in the sheet.
    pub total_rows: usize,
    /// Rows that reached [`RowState::Extracted`] in this pass.
    pub processed: usize,
    /// Rows that ended with an error marker in this pass.
    pub failed: usize,
    /// Rows with no file path.
    pub skipped_empty: usize,
    /// Rows already completed by an earlier pass.
    pub skipped_completed: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    /// The run counts as successful when at least one row was processed.
    pub fn is_success(&self) -> bool {
        self.processed > 0
    }
}

/// Drives rows through unlock → render → OCR → extract.
///
/// Owns its services; construct once per run and pass the store in.
pub struct RowProcessor {
    engine: Box<dyn DocumentEngine>,
    recognizer: Arc<dyn TextRecognizer>,
    extractor: Arc<dyn FieldExtractor>,
    config: PipelineConfig,
}

impl RowProcessor {
    /// Assemble a processor from explicit services.
    pub fn new(
        engine: Box<dyn DocumentEngine>,
        recognizer: Arc<dyn TextRecognizer>,
        extractor: Arc<dyn FieldExtractor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            engine,
            recognizer,
            extractor,
            config,
        }
    }

    /// Bind pdfium and create the model-backed services named by `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let engine = PdfiumEngine::bind()?;

        let extraction_provider = resolve_provider(
            config.provider.as_ref(),
            config.provider_name.as_deref(),
            &config.model,
        )?;
        let ocr_provider = resolve_provider(
            config.ocr_provider.as_ref(),
            config.provider_name.as_deref(),
            &config.ocr_model,
        )?;
        info!(
            "Using model '{}' for extraction, '{}' for OCR",
            config.model, config.ocr_model
        );

        let recognizer = Arc::new(VisionTextRecognizer::new(ocr_provider, &config));
        let extractor = Arc::new(LlmFieldExtractor::new(extraction_provider, &config));
        Ok(Self::new(Box::new(engine), recognizer, extractor, config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every eligible row of `store` once.
    ///
    /// # Errors
    /// Only [`PipelineError::PersistFailed`] (or serialisation trouble)
    /// ends a run early; row failures are recorded in the store.
    pub async fn run(&self, store: &mut RowStore) -> Result<RunSummary, PipelineError> {
        let start = Instant::now();
        let records = store.records();
        let callback = self.config.progress_callback.as_deref();

        let mut summary = RunSummary {
            total_rows: records.len(),
            ..Default::default()
        };
        info!(
            "Processing {} rows from {}",
            records.len(),
            store.path().display()
        );
        if let Some(cb) = callback {
            cb.on_run_start(records.len());
        }

        let mut unsaved = 0usize;
        for record in &records {
            let Some(file_path) = record.file_path.as_deref() else {
                debug!("Row {}: no file path, skipping", record.row_number);
                summary.skipped_empty += 1;
                if let Some(cb) = callback {
                    cb.on_row_skipped(record.id, "no file path");
                }
                continue;
            };

            if record.status == RowStatus::Completed && !self.config.reprocess_completed {
                debug!("Row {}: already completed, skipping", record.row_number);
                summary.skipped_completed += 1;
                if let Some(cb) = callback {
                    cb.on_row_skipped(record.id, "already completed");
                }
                continue;
            }

            if let RowStatus::Failed { marker } = &record.status {
                debug!("Row {}: retrying after '{}'", record.row_number, marker);
            }
            if let Some(cb) = callback {
                cb.on_row_start(record.id, file_path);
            }

            match self.process_row(store, record, file_path).await {
                Ok(fields) => {
                    store.complete_row(record.row_number, &fields);
                    summary.processed += 1;
                    info!(
                        "Row {}: {} → {} ({} of 12 fields found)",
                        record.row_number,
                        file_path,
                        RowState::Extracted,
                        fields.found_count()
                    );
                    if let Some(cb) = callback {
                        cb.on_row_complete(record.id, fields.found_count());
                    }
                }
                Err(err) if record.status == RowStatus::Completed => {
                    // Reprocessing only replaces fields with better ones; a
                    // failed attempt keeps the earlier extraction.
                    let marker = err.marker();
                    summary.failed += 1;
                    warn!(
                        "Row {}: {} → reprocess failed, keeping earlier fields: {}",
                        record.row_number, file_path, err
                    );
                    if let Some(cb) = callback {
                        cb.on_row_error(record.id, &marker);
                    }
                }
                Err(err) => {
                    let marker = err.marker();
                    store.mark_error(record.row_number, &marker);
                    summary.failed += 1;
                    warn!(
                        "Row {}: {} → {}: {}",
                        record.row_number,
                        file_path,
                        RowState::Failed,
                        err
                    );
                    if let Some(cb) = callback {
                        cb.on_row_error(record.id, &marker);
                    }
                }
            }

            unsaved += 1;
            if self.config.persist_every > 0 && unsaved >= self.config.persist_every {
                store.persist()?;
                unsaved = 0;
            }
        }

        store.persist()?;
        summary.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Run complete: {} processed, {} failed, {} skipped in {}ms",
            summary.processed,
            summary.failed,
            summary.skipped_empty + summary.skipped_completed,
            summary.duration_ms
        );
        if let Some(cb) = callback {
            cb.on_run_complete(summary.processed, summary.failed);
        }
        Ok(summary)
    }

    /// Take one row from `Pending` to extracted fields.
    ///
    /// Nothing is written to the store here; the caller records the outcome.
    async fn process_row(
        &self,
        store: &RowStore,
        record: &RowRecord,
        file_path: &str,
    ) -> Result<ExtractedFields, RowError> {
        let callback = self.config.progress_callback.as_deref();
        let stage = |name: &str| {
            if let Some(cb) = callback {
                cb.on_row_stage(record.id, name);
            }
        };

        let path = input::locate_document(store, file_path)?;

        stage("decrypting");
        let secrets = record.secrets.non_empty();
        let (pages, unlocked_with) = self.unlock_and_render(&path, &secrets)?;
        debug!(
            "Row {}: {} → {} ({} pages, candidate {:?})",
            record.row_number,
            RowState::Pending,
            RowState::Unlocked,
            pages.len(),
            unlocked_with.map(|i| i + 1)
        );

        stage("recognising text");
        let timeout = self.config.capability_timeout_secs;
        let text = ocr::recognize_document(self.recognizer.as_ref(), &pages, timeout).await?;
        drop(pages);

        stage("extracting fields");
        let schema = CnField::schema();
        let map = bounded(
            "Field extraction",
            timeout,
            self.extractor.extract(&text, &schema),
        )
        .await?;

        Ok(ExtractedFields::from_map(&map))
    }

    /// Open the document and render every page.
    ///
    /// Synchronous: the open document borrows the engine and must be gone
    /// before the first `.await`.
    fn unlock_and_render(
        &self,
        path: &Path,
        secrets: &[&str],
    ) -> Result<(Vec<PageImage>, Option<usize>), RowError> {
        let unlocked = decrypt::unlock(self.engine.as_ref(), path, secrets)?;
        let pages = render::rasterize(unlocked.document.as_ref(), self.config.dpi)?;
        Ok((pages, unlocked.unlocked_with))
    }
}

/// Open the store at `path`, process it with services built from `config`,
/// and persist the result.
pub async fn process_store(
    path: impl Into<PathBuf>,
    config: PipelineConfig,
) -> Result<RunSummary, PipelineError> {
    let path = path.into();
    let mut store = RowStore::open(&path, &config.sheet_name)?;
    let processor = RowProcessor::from_config(config)?;
    processor.run(&mut store).await
}
