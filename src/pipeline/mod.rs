//! Pipeline stages for turning one row's document into extracted fields.
//!
//! Each submodule implements exactly one step, so each can be tested alone
//! and swapped (a different rendering backend, a different OCR engine)
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ decrypt ──▶ render ──▶ ocr ──▶ extract
//! (path)    (unlock)    (PNG)     (text)   (fields)
//! ```
//!
//! 1. [`input`]: resolve the row's path and check it is a readable PDF
//! 2. [`decrypt`]: open the document, trying the empty password and then
//!    each candidate in order
//! 3. [`render`]: rasterise every page at `dpi / 72` scale, PNG-encoded
//! 4. [`ocr`]: page images → one text blob, pages in order
//! 5. [`extract`]: text → the twelve schema fields
//!
//! [`encode`], [`llm`] and [`postprocess`] are shared helpers: PNG/base64
//! wrapping, the retrying chat call used by both model-backed stages, and
//! cleanup of model replies.

pub mod decrypt;
pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod render;

use crate::error::ExtractionError;
use std::future::Future;
use std::time::Duration;

/// Run `fut` under a time budget of `secs` seconds (0 = unbounded).
///
/// Expiry maps to [`ExtractionError::Timeout`] naming `stage`.
pub async fn bounded<T, F>(stage: &'static str, secs: u64, fut: F) -> Result<T, ExtractionError>
where
    F: Future<Output = Result<T, ExtractionError>>,
{
    if secs == 0 {
        return fut.await;
    }
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(ExtractionError::Timeout { stage, secs }),
    }
}
