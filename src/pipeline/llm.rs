//! Provider plumbing shared by the OCR and extraction stages.
//!
//! Both stages are one chat request per unit of work (a page, a document).
//! This module owns provider resolution and the retry loop so the stages
//! only build messages and interpret replies.
//!
//! ## Retry Strategy
//!
//! A local model server under load answers 503 or drops the connection;
//! hosted APIs answer 429. Exponential backoff (`backoff_ms * 2^attempt`)
//! gives 500 ms → 1 s → 2 s with the defaults, under 4 s per call.

use crate::error::PipelineError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Provider used when neither the config nor the environment names one.
pub const DEFAULT_PROVIDER: &str = "ollama";

/// How often and how patiently to retry a failed chat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Sampling options for one chat call.
pub fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Send `messages` and return the reply text, retrying per `policy`.
///
/// `label` identifies the unit of work in logs ("page 3", "field extraction").
/// On exhaustion returns the last provider error as text.
pub async fn chat_with_retry(
    provider: &Arc<dyn LLMProvider>,
    label: &str,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    policy: RetryPolicy,
) -> Result<String, String> {
    let start = Instant::now();
    let mut last_err: Option<String> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.delay(attempt);
            warn!(
                "{}: retry {}/{} after {:?}",
                label, attempt, policy.max_retries, backoff
            );
            sleep(backoff).await;
        }

        match provider.chat(messages, Some(options)).await {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(response.content);
            }
            Err(e) => {
                let err_msg = e.to_string();
                warn!("{}: attempt {} failed: {}", label, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| "Unknown error".to_string()))
}

/// Pick the provider for one capability.
///
/// Precedence:
/// 1. `explicit`, a pre-built provider injected by the caller
/// 2. `provider_name` from the configuration
/// 3. `EDGEQUAKE_LLM_PROVIDER` from the environment
/// 4. [`DEFAULT_PROVIDER`], a local model server
///
/// In cases 2–4 the provider is created for `model`.
pub fn resolve_provider(
    explicit: Option<&Arc<dyn LLMProvider>>,
    provider_name: Option<&str>,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(provider) = explicit {
        return Ok(Arc::clone(provider));
    }

    let from_env = std::env::var("EDGEQUAKE_LLM_PROVIDER")
        .ok()
        .filter(|p| !p.trim().is_empty());
    let name = provider_name
        .map(str::to_string)
        .or(from_env)
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

    debug!("Creating provider '{}' for model '{}'", name, model);
    ProviderFactory::create_llm_provider(&name, model).map_err(|e| {
        let hint = if name == DEFAULT_PROVIDER {
            format!("{e}\nStart the model server and pull the model: ollama pull {model}")
        } else {
            format!("{e}")
        };
        PipelineError::ProviderNotConfigured {
            provider: name.clone(),
            hint,
        }
    })
}
