//! Text recognition: rendered pages → one text blob.
//!
//! [`TextRecognizer`] is the seam: anything that turns a page image into
//! text plugs in here. The shipped implementation sends each page to a
//! vision-capable model; tests use scripted recognizers.

use crate::config::PipelineConfig;
use crate::error::ExtractionError;
use crate::pipeline::bounded;
use crate::pipeline::encode::to_image_data;
use crate::pipeline::llm::{build_options, chat_with_retry, RetryPolicy};
use crate::pipeline::postprocess::clean_transcript;
use crate::pipeline::render::PageImage;
use crate::prompts::{ocr_user_prompt, OCR_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, LLMProvider};
use std::sync::Arc;
use tracing::{debug, info};

/// Recognises the text on one rendered page.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Text lines found on `page`, newline-separated, in reading order.
    async fn recognize_page(&self, page: &PageImage) -> Result<String, ExtractionError>;
}

/// Recognise every page and join the results with `\n`, pages in order.
///
/// Each page call is bounded by `timeout_secs` (0 = unbounded). Pages with
/// no text contribute nothing, so a blank cover page does not leave an
/// empty line at the start of the blob.
pub async fn recognize_document(
    recognizer: &dyn TextRecognizer,
    pages: &[PageImage],
    timeout_secs: u64,
) -> Result<String, ExtractionError> {
    let mut texts = Vec::with_capacity(pages.len());
    for page in pages {
        let text = bounded(
            "Text recognition",
            timeout_secs,
            recognizer.recognize_page(page),
        )
        .await?;
        debug!("Page {}: {} chars recognised", page.page_num, text.len());
        if !text.trim().is_empty() {
            texts.push(text);
        }
    }

    let joined = texts.join("\n");
    info!(
        "Recognised {} chars across {} pages",
        joined.len(),
        pages.len()
    );
    Ok(joined)
}

/// [`TextRecognizer`] backed by a vision model.
pub struct VisionTextRecognizer {
    provider: Arc<dyn LLMProvider>,
    user_prompt: String,
    max_tokens: usize,
    retry: RetryPolicy,
}

impl VisionTextRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            user_prompt: ocr_user_prompt(&config.ocr_languages),
            max_tokens: config.ocr_max_tokens,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
            },
        }
    }
}

#[async_trait]
impl TextRecognizer for VisionTextRecognizer {
    async fn recognize_page(&self, page: &PageImage) -> Result<String, ExtractionError> {
        let messages = vec![
            ChatMessage::system(OCR_SYSTEM_PROMPT),
            ChatMessage::user_with_images(&self.user_prompt, vec![to_image_data(&page.png)]),
        ];
        // Transcription wants the most likely reading, not variety.
        let options = build_options(0.0, self.max_tokens);
        let label = format!("page {}", page.page_num);

        let raw = chat_with_retry(&self.provider, &label, &messages, &options, self.retry)
            .await
            .map_err(|detail| ExtractionError::Recognition {
                page: page.page_num,
                detail,
            })?;
        Ok(clean_transcript(&raw))
    }
}
