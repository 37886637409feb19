//! Document opening and multi-password unlocking.
//!
//! The decryptor never sees the row store: it gets a path and an ordered
//! list of candidate passwords and either hands back an open document or
//! says why it could not. Clearing the row's secrets is the processor's job.
//!
//! ## Attempt order
//!
//! 1. No password. Unencrypted documents and documents protected only by an
//!    owner password (printing/copy restrictions) open here.
//! 2. Each candidate, in the order staged on the row.
//!
//! A rejected password moves on to the next candidate. Any other failure
//! (truncated file, not a PDF) stops immediately: trying more passwords on
//! a corrupt file cannot help.

use crate::error::{ExtractionError, PipelineError, RowError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An opened, readable document.
pub trait Document {
    fn page_count(&self) -> usize;

    /// Render page `index` (0-based) at `scale` × its native 72-dpi size.
    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, String>;
}

/// Why a single open attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    /// The document is encrypted and this password does not unlock it.
    PasswordRejected,
    /// The file cannot be parsed as a document at all.
    Unreadable(String),
}

/// A backend that can open documents with an optional password.
pub trait DocumentEngine {
    fn open<'a>(
        &'a self,
        path: &Path,
        password: Option<&'a str>,
    ) -> Result<Box<dyn Document + 'a>, OpenError>;
}

// ── Ordered fallback ─────────────────────────────────────────────────────

/// Outcome of [`first_success`] when no candidate succeeded.
#[derive(Debug, PartialEq, Eq)]
pub enum Fallback<E> {
    /// Every candidate was tried and rejected.
    Exhausted { attempts: usize },
    /// A candidate failed in a way that makes further attempts pointless.
    Aborted(E),
}

/// Try each candidate in order until one succeeds.
///
/// Errors for which `retryable` returns `true` move on to the next
/// candidate; any other error aborts. On success returns the 0-based index
/// of the winning candidate with its value.
pub fn first_success<C, T, E>(
    candidates: impl IntoIterator<Item = C>,
    mut attempt: impl FnMut(C) -> Result<T, E>,
    mut retryable: impl FnMut(&E) -> bool,
) -> Result<(usize, T), Fallback<E>> {
    let mut attempts = 0;
    for (idx, candidate) in candidates.into_iter().enumerate() {
        attempts += 1;
        match attempt(candidate) {
            Ok(value) => return Ok((idx, value)),
            Err(e) if retryable(&e) => continue,
            Err(e) => return Err(Fallback::Aborted(e)),
        }
    }
    Err(Fallback::Exhausted { attempts })
}

// ── Unlock ───────────────────────────────────────────────────────────────

/// A document opened by [`unlock`].
pub struct Unlocked<'a> {
    pub document: Box<dyn Document + 'a>,
    /// 0-based index into the candidate list that opened the document, or
    /// `None` when it opened without a password.
    pub unlocked_with: Option<usize>,
}

/// Open `path`, trying no password first and then each of `secrets` in order.
///
/// # Errors
/// - [`RowError::DecryptionFailure`] when every attempt was rejected
/// - [`RowError::Extraction`] (`Unreadable`) when the file is not a usable document
pub fn unlock<'a>(
    engine: &'a dyn DocumentEngine,
    path: &Path,
    secrets: &[&'a str],
) -> Result<Unlocked<'a>, RowError> {
    let attempts = std::iter::once(None).chain(secrets.iter().map(|s| Some(*s)));

    match first_success(
        attempts,
        |password| engine.open(path, password),
        |e| *e == OpenError::PasswordRejected,
    ) {
        Ok((idx, document)) => {
            let unlocked_with = idx.checked_sub(1);
            match unlocked_with {
                Some(slot) => info!("Unlocked {} with candidate {}", path.display(), slot + 1),
                None => debug!("Opened {} without a password", path.display()),
            }
            Ok(Unlocked {
                document,
                unlocked_with,
            })
        }
        Err(Fallback::Exhausted { attempts }) => Err(RowError::DecryptionFailure { attempts }),
        Err(Fallback::Aborted(OpenError::Unreadable(detail))) => {
            Err(ExtractionError::Unreadable(detail).into())
        }
        Err(Fallback::Aborted(OpenError::PasswordRejected)) => {
            Err(RowError::DecryptionFailure { attempts: 1 })
        }
    }
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// [`DocumentEngine`] over a bound pdfium library.
///
/// Bind once per run and share by reference; binding loads a shared library.
pub struct PdfiumEngine {
    pdfium: Pdfium,
}

impl PdfiumEngine {
    /// Bind to pdfium, looking in order at `PDFIUM_LIB_PATH`, the current
    /// directory and the system library path.
    pub fn bind() -> Result<Self, PipelineError> {
        let from_env = std::env::var("PDFIUM_LIB_PATH")
            .ok()
            .map(PathBuf::from)
            .filter(|p| p.exists());

        let bindings = match from_env {
            Some(path) => Pdfium::bind_to_library(&path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{e:?}")))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl DocumentEngine for PdfiumEngine {
    fn open<'a>(
        &'a self,
        path: &Path,
        password: Option<&'a str>,
    ) -> Result<Box<dyn Document + 'a>, OpenError> {
        match self.pdfium.load_pdf_from_file(path, password) {
            Ok(document) => Ok(Box::new(PdfiumDocument { document })),
            Err(e) => {
                let detail = format!("{e:?}");
                if detail.contains("Password") || detail.contains("password") {
                    Err(OpenError::PasswordRejected)
                } else {
                    Err(OpenError::Unreadable(detail))
                }
            }
        }
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl Document for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, String> {
        let page = self
            .document
            .pages()
            .get(page_index(index)?)
            .map_err(|e| format!("{e:?}"))?;
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| format!("{e:?}"))?;
        Ok(bitmap.as_image())
    }
}

/// pdfium addresses pages with `u16`.
fn page_index(index: usize) -> Result<u16, String> {
    u16::try_from(index)
        .map_err(|_| format!("page index {index} exceeds the pdfium page limit"))
}
