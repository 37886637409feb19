//! Field extraction: recognised text → a JSON object of schema fields.
//!
//! [`FieldExtractor`] takes the text and the list of keys to fill and
//! returns whatever the backend produced as a [`FieldMap`]. Mapping that
//! map onto the twelve status columns (sentinels for missing values) is
//! [`crate::fields::ExtractedFields::from_map`]'s job, not the extractor's.

use crate::config::PipelineConfig;
use crate::error::ExtractionError;
use crate::fields::FieldMap;
use crate::pipeline::llm::{build_options, chat_with_retry, RetryPolicy};
use crate::pipeline::postprocess::strip_code_fences;
use crate::prompts::extraction_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extracts schema fields from document text.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Fill `schema` keys from `text`. Keys the backend could not find may be
    /// absent or `null`.
    async fn extract(&self, text: &str, schema: &[&str]) -> Result<FieldMap, ExtractionError>;
}

/// [`FieldExtractor`] backed by a text model.
pub struct LlmFieldExtractor {
    provider: Arc<dyn LLMProvider>,
    max_text_chars: usize,
    options: CompletionOptions,
    retry: RetryPolicy,
}

impl LlmFieldExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            max_text_chars: config.max_text_chars,
            options: build_options(config.temperature, config.max_tokens),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms,
            },
        }
    }
}

#[async_trait]
impl FieldExtractor for LlmFieldExtractor {
    async fn extract(&self, text: &str, schema: &[&str]) -> Result<FieldMap, ExtractionError> {
        let prompt = extraction_prompt(text, schema, self.max_text_chars);
        let messages = vec![ChatMessage::user(&prompt)];

        let reply = chat_with_retry(
            &self.provider,
            "field extraction",
            &messages,
            &self.options,
            self.retry,
        )
        .await
        .map_err(ExtractionError::FieldExtraction)?;

        debug!("Extraction reply: {} chars", reply.len());
        parse_json_response(&reply)
    }
}

/// Flat `{ ... }` objects, the shape the prompt asks for.
static RE_FLAT_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^{}]*\}").unwrap());

/// Pull the JSON object out of a model reply.
///
/// Tried in order:
/// 1. the whole reply (fences stripped) as a JSON object
/// 2. the span from the first `{` to the last `}`
/// 3. each flat `{ ... }` span, first that parses wins
///
/// Models wrap answers in prose ("Here is the JSON: ...") often enough that
/// step 1 alone is not enough.
pub fn parse_json_response(reply: &str) -> Result<FieldMap, ExtractionError> {
    let body = strip_code_fences(reply);

    if let Ok(map) = serde_json::from_str::<FieldMap>(body) {
        return Ok(map);
    }

    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end {
            if let Ok(map) = serde_json::from_str::<FieldMap>(&body[start..=end]) {
                return Ok(map);
            }
        }
    }

    for m in RE_FLAT_OBJECT.find_iter(body) {
        if let Ok(map) = serde_json::from_str::<FieldMap>(m.as_str()) {
            return Ok(map);
        }
    }

    warn!("No JSON object in extraction reply");
    Err(ExtractionError::UnparseableResponse(preview(body)))
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
