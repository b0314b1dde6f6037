//! Generation client — retry, backoff, concurrency capping, and local
//! token accounting around a [`GenerationBackend`].
//!
//! The backend is opaque and rate limited. The client owns the retry
//! policy: transient failures (throttling, server faults, network
//! errors, timeouts) are retried with exponential backoff up to a
//! configured attempt cap; non-transient failures surface immediately.
//!
//! Token accounting is local. Provider-reported usage is logged for
//! cross-validation but never used for billing.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tollgate_config::GenerationConfig;
use tollgate_context::estimate_tokens;
use tollgate_core::{BackendCompletion, BackendRequest, GenerationBackend, GenerationError};
use tracing::{debug, info, warn};

/// The outcome of a successful generation call.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// The generated text.
    pub text: String,
    /// Locally estimated output tokens. Billing source of truth.
    pub output_tokens: u64,
    /// Which model responded.
    pub model: String,
    /// How many attempts the call took.
    pub attempts: u32,
}

/// Client wrapping a backend with retry and concurrency discipline.
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    limiter: Arc<Semaphore>,
    max_attempts: u32,
    initial_backoff: Duration,
    attempt_timeout: Duration,
    max_output_tokens: u32,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: &GenerationConfig) -> Self {
        Self {
            backend,
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            attempt_timeout: Duration::from_millis(config.timeout_ms),
            max_output_tokens: config.max_output_tokens,
        }
    }

    /// Configured cap on generated tokens, used for cost estimation.
    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    /// Run one completion with the full retry policy.
    ///
    /// Holds a concurrency permit for the duration of the call including
    /// its retries, so a retry storm cannot multiply pressure on the
    /// backend.
    pub async fn complete(
        &self,
        system: Option<String>,
        prompt: String,
    ) -> Result<CompletionOutcome, GenerationError> {
        self.complete_capped(system, prompt, self.max_output_tokens)
            .await
    }

    /// Same policy with a per-request output cap. The cap is clamped to
    /// the configured maximum.
    pub async fn complete_capped(
        &self,
        system: Option<String>,
        prompt: String,
        max_output_tokens: u32,
    ) -> Result<CompletionOutcome, GenerationError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| GenerationError::Network("concurrency limiter closed".into()))?;

        let request = BackendRequest {
            prompt,
            system,
            max_output_tokens: max_output_tokens.min(self.max_output_tokens).max(1),
        };

        let mut last: Option<GenerationError> = None;

        for attempt in 1..=self.max_attempts {
            match self.attempt(&request, attempt).await {
                Ok(completion) => {
                    let output_tokens = estimate_tokens(&completion.text) as u64;
                    self.cross_validate(&completion, output_tokens);
                    if attempt > 1 {
                        info!(backend = self.backend.name(), attempt, "completion recovered");
                    }
                    return Ok(CompletionOutcome {
                        text: completion.text,
                        output_tokens,
                        model: completion.model,
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(&err, attempt);
                    warn!(
                        backend = self.backend.name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient backend failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    last = Some(err);
                }
                Err(err) if err.is_transient() => {
                    last = Some(err);
                }
                Err(err) => {
                    warn!(
                        backend = self.backend.name(),
                        attempt,
                        error = %err,
                        "non-transient backend failure, giving up"
                    );
                    return Err(err);
                }
            }
        }

        let last = last.map(|e| e.to_string()).unwrap_or_default();
        Err(GenerationError::AttemptsExhausted {
            attempts: self.max_attempts,
            last,
        })
    }

    /// Embed texts through the backend under the same retry policy.
    pub async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, GenerationError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| GenerationError::Network("concurrency limiter closed".into()))?;

        let mut last: Option<GenerationError> = None;

        for attempt in 1..=self.max_attempts {
            let result = tokio::time::timeout(self.attempt_timeout, self.backend.embed(inputs.clone()))
                .await
                .unwrap_or_else(|_| {
                    Err(GenerationError::Timeout(format!(
                        "embedding attempt exceeded {}ms",
                        self.attempt_timeout.as_millis()
                    )))
                });

            match result {
                Ok(vectors) => return Ok(vectors),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(&err, attempt);
                    warn!(
                        backend = self.backend.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient embedding failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    last = Some(err);
                }
                Err(err) if err.is_transient() => {
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let last = last.map(|e| e.to_string()).unwrap_or_default();
        Err(GenerationError::AttemptsExhausted {
            attempts: self.max_attempts,
            last,
        })
    }

    async fn attempt(
        &self,
        request: &BackendRequest,
        attempt: u32,
    ) -> Result<BackendCompletion, GenerationError> {
        debug!(backend = self.backend.name(), attempt, "sending completion request");
        tokio::time::timeout(self.attempt_timeout, self.backend.complete(request.clone()))
            .await
            .unwrap_or_else(|_| {
                Err(GenerationError::Timeout(format!(
                    "attempt exceeded {}ms",
                    self.attempt_timeout.as_millis()
                )))
            })
    }

    /// Exponential backoff: initial * 2^(attempt-1). A rate-limit reply
    /// that names a longer wait wins over the computed delay.
    fn backoff_for(&self, err: &GenerationError, attempt: u32) -> Duration {
        let exp = self.initial_backoff * 2u32.saturating_pow(attempt.saturating_sub(1));
        match err {
            GenerationError::RateLimited { retry_after_secs } => {
                exp.max(Duration::from_secs(*retry_after_secs))
            }
            _ => exp,
        }
    }

    /// Compare provider-reported usage with the local estimate. Large
    /// divergence is worth knowing about, but billing never changes.
    fn cross_validate(&self, completion: &BackendCompletion, local_output: u64) {
        if let Some(usage) = completion.usage {
            let reported = usage.completion_tokens as u64;
            let divergence = reported.abs_diff(local_output);
            if divergence > reported.max(local_output) / 4 {
                info!(
                    backend = self.backend.name(),
                    reported_output = reported,
                    local_output,
                    "provider usage diverges from local estimate"
                );
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
