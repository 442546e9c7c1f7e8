//! Extraction provider trait and the retrying extraction client
//!
//! [`ExtractionProvider`] makes exactly one call to the extraction service.
//! [`ExtractionClient`] wraps a provider with the [`BackoffPolicy`]: transient
//! failures (429, 5xx, unclassified) are retried with exponential backoff,
//! auth failures surface immediately, and when retrying stops the most recent
//! error is returned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::retry::{BackoffPolicy, RetryDecision, RetryState};
use crate::types::ExtractedContent;

/// Trait for a single extraction call
///
/// Implementations:
/// - `GeminiExtractor`: Google Gemini `generateContent`
///
/// Requests are stateless: the whole document travels inline with every call.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Send the document once and classify any failure
    async fn extract_once(
        &self,
        document: &[u8],
        media_type: &str,
    ) -> Result<ExtractedContent, ExtractionError>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}

/// Extraction client with retry/backoff
pub struct ExtractionClient {
    provider: Arc<dyn ExtractionProvider>,
    policy: BackoffPolicy,
    attempt_timeout: Duration,
}

impl ExtractionClient {
    pub fn new(
        provider: Arc<dyn ExtractionProvider>,
        policy: BackoffPolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            policy,
            attempt_timeout,
        }
    }

    /// Build a client using the configured retry policy and attempt deadline
    pub fn from_config(provider: Arc<dyn ExtractionProvider>, config: &ExtractionConfig) -> Self {
        Self::new(
            provider,
            BackoffPolicy::from_config(config),
            Duration::from_secs(config.attempt_timeout_secs),
        )
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Extract structured content, retrying transient failures
    pub async fn extract(
        &self,
        document: &[u8],
        media_type: &str,
    ) -> Result<ExtractedContent, ExtractionError> {
        let mut state = RetryState::start(&self.policy);

        loop {
            let attempt = state.attempt();
            let outcome = match tokio::time::timeout(
                self.attempt_timeout,
                self.provider.extract_once(document, media_type),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ExtractionError::Unclassified(format!(
                    "attempt timed out after {}s",
                    self.attempt_timeout.as_secs()
                ))),
            };

            let err = match outcome {
                Ok(content) => {
                    if attempt > 0 {
                        debug!(
                            provider = %self.provider.name(),
                            attempt,
                            "extraction succeeded after retry"
                        );
                    }
                    return Ok(content);
                }
                Err(err) => err,
            };

            match state.on_failure(err.kind()) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        provider = %self.provider.name(),
                        attempt,
                        kind = err.kind().as_str(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying extraction after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Stop(reason) => {
                    warn!(
                        provider = %self.provider.name(),
                        attempts = attempt + 1,
                        kind = err.kind().as_str(),
                        ?reason,
                        "extraction failed"
                    );
                    return Err(err);
                }
            }
        }
    }
}
