//! Configuration for a row-processing run.
//!
//! Every knob lives in [`PipelineConfig`], built through
//! [`PipelineConfigBuilder`]. Setters clamp to sane ranges; `build()` rejects
//! combinations that cannot work.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Default local text model (Llama 3 8B Instruct, Q4_0 quantisation).
pub const DEFAULT_MODEL: &str = "llama3:8b-instruct-q4_0";

/// Default vision model used for text recognition.
pub const DEFAULT_OCR_MODEL: &str = "llama3.2-vision";

/// Default name of the row sheet.
pub const DEFAULT_SHEET: &str = "CN Database";

/// Configuration for [`crate::processor::RowProcessor`].
///
/// # Example
/// ```rust
/// use cn_extract::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(200)
///     .persist_every(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_text_chars, 4000);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rendering resolution for page rasterisation. Range: 72–600. Default: 300.
    ///
    /// Pages are scaled by `dpi / 72` from PDF user space. Confirmation notes
    /// carry small print (fees, equalisation) that OCR misreads below ~200 DPI.
    pub dpi: u32,

    /// Characters of recognised text sent to the field extractor. Default: 4000.
    pub max_text_chars: usize,

    /// Text model for field extraction. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Vision model for text recognition. Default: [`DEFAULT_OCR_MODEL`].
    pub ocr_model: String,

    /// LLM provider name (e.g. "ollama", "openai"). If None, auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed provider for field extraction. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed provider for text recognition.
    pub ocr_provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the extractor may generate. Default: 500.
    pub max_tokens: usize,

    /// Maximum tokens per recognised page. Default: 4096.
    pub ocr_max_tokens: usize,

    /// Retries per capability call on failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Time budget per external capability call in seconds; 0 disables. Default: 300.
    ///
    /// On expiry the row is marked failed and the run moves on.
    pub capability_timeout_secs: u64,

    /// Languages hinted to the text recogniser. Default: `["en"]`.
    pub ocr_languages: Vec<String>,

    /// Name of the row sheet in the store. Default: [`DEFAULT_SHEET`].
    pub sheet_name: String,

    /// Rows reaching a terminal state between durable saves; 0 saves only
    /// at the end of the pass. Default: 1.
    pub persist_every: usize,

    /// Re-run rows whose fields are already populated. Default: false.
    ///
    /// A successful re-run overwrites the fields; a failed one leaves them
    /// as they were and writes no marker.
    pub reprocess_completed: bool,

    /// Optional per-row progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_text_chars: 4000,
            model: DEFAULT_MODEL.to_string(),
            ocr_model: DEFAULT_OCR_MODEL.to_string(),
            provider_name: None,
            provider: None,
            ocr_provider: None,
            temperature: 0.1,
            max_tokens: 500,
            ocr_max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            capability_timeout_secs: 300,
            ocr_languages: vec!["en".to_string()],
            sheet_name: DEFAULT_SHEET.to_string(),
            persist_every: 1,
            reprocess_completed: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("max_text_chars", &self.max_text_chars)
            .field("model", &self.model)
            .field("ocr_model", &self.ocr_model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "ocr_provider",
                &self.ocr_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("capability_timeout_secs", &self.capability_timeout_secs)
            .field("sheet_name", &self.sheet_name)
            .field("persist_every", &self.persist_every)
            .field("reprocess_completed", &self.reprocess_completed)
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Scale factor from PDF user space (72 units per inch) to pixels.
    pub fn render_scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_text_chars(mut self, n: usize) -> Self {
        self.config.max_text_chars = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn ocr_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.ocr_provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn ocr_max_tokens(mut self, n: usize) -> Self {
        self.config.ocr_max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn capability_timeout_secs(mut self, secs: u64) -> Self {
        self.config.capability_timeout_secs = secs;
        self
    }

    pub fn ocr_languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ocr_languages = langs.into_iter().map(Into::into).collect();
        self
    }

    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.config.sheet_name = name.into();
        self
    }

    pub fn persist_every(mut self, n: usize) -> Self {
        self.config.persist_every = n;
        self
    }

    pub fn reprocess_completed(mut self, v: bool) -> Self {
        self.config.reprocess_completed = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.max_text_chars == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_text_chars must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() || c.ocr_model.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "model names must not be empty".into(),
            ));
        }
        if c.sheet_name.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "sheet name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
