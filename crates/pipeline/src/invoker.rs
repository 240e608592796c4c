//! One logical call to the text-generation service, with bounded retries.

use std::sync::Arc;

use notewise_llm::{ErrorClass, LlmProvider, Message};

use crate::cancel::CancellationToken;
use crate::error::InvokeError;
use crate::limiter::RequestLimiter;
use crate::payload::Payload;
use crate::retry::{BackoffKind, BackoffPolicy, Jitter, Sleeper};

/// Failure of a single attempt, already classified.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub class: ErrorClass,
    pub status: Option<u16>,
    pub detail: String,
}

/// Sends payloads and absorbs transient failures.
///
/// Every attempt yields a typed `Result<String, AttemptFailure>`; the loop in
/// [`invoke`](Self::invoke) decides from the [`ErrorClass`] alone whether to
/// back off and try again or to give up.
#[derive(Clone)]
pub struct ResilientInvoker {
    provider: Arc<dyn LlmProvider>,
    max_attempts: u32,
    policy: BackoffPolicy,
    temperature: f32,
    max_tokens: u32,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn Jitter>,
    limiter: Option<RequestLimiter>,
}

impl ResilientInvoker {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        max_attempts: u32,
        policy: BackoffPolicy,
        sleeper: Arc<dyn Sleeper>,
        jitter: Arc<dyn Jitter>,
    ) -> Self {
        Self {
            provider,
            max_attempts: max_attempts.max(1),
            policy,
            temperature: 0.7,
            max_tokens: 4096,
            sleeper,
            jitter,
            limiter: None,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_limiter(mut self, limiter: Option<RequestLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Send `payload`, retrying transient failures. `label` tags every log line
    /// and the returned error (e.g. `"chunk 3/7"`, `"final merge"`).
    ///
    /// Returns the trimmed, non-empty response text.
    pub async fn invoke(
        &self,
        payload: &Payload,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<String, InvokeError> {
        let messages = payload.to_messages();
        let mut last: Option<AttemptFailure> = None;

        for attempt in 0..self.max_attempts {
            if cancel.is_cancelled() {
                return Err(cancelled(label, attempt));
            }
            if let Some(limiter) = &self.limiter {
                tokio::select! {
                    _ = limiter.until_ready() => {}
                    _ = cancel.cancelled() => return Err(cancelled(label, attempt)),
                }
            }

            let made = attempt + 1;
            let result = tokio::select! {
                result = self.attempt(messages.clone()) => result,
                _ = cancel.cancelled() => return Err(cancelled(label, made)),
            };

            let failure = match result {
                Ok(text) => {
                    if attempt > 0 {
                        tracing::info!(label, attempts = made, "succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(failure) => failure,
            };

            let Some(kind) = BackoffKind::for_class(failure.class) else {
                tracing::error!(
                    label,
                    attempt = made,
                    class = %failure.class,
                    status = ?failure.status,
                    error = %failure.detail,
                    "non-retryable failure, aborting"
                );
                return Err(InvokeError::Fatal {
                    label: label.to_string(),
                    class: failure.class,
                    status: failure.status,
                    attempts: made,
                    detail: failure.detail,
                });
            };

            tracing::warn!(
                label,
                attempt = made,
                max_attempts = self.max_attempts,
                class = %failure.class,
                error = %failure.detail,
                "attempt failed"
            );

            if made < self.max_attempts {
                let delay = self.policy.delay(kind, attempt, self.jitter.as_ref());
                tracing::info!(
                    label,
                    attempt = made,
                    class = %failure.class,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::select! {
                    _ = self.sleeper.sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(cancelled(label, made)),
                }
            }
            last = Some(failure);
        }

        let failure = last.unwrap_or(AttemptFailure {
            class: ErrorClass::Unknown,
            status: None,
            detail: "no attempt was made".to_string(),
        });
        tracing::error!(
            label,
            attempts = self.max_attempts,
            class = %failure.class,
            error = %failure.detail,
            "retries exhausted"
        );
        Err(InvokeError::Exhausted {
            label: label.to_string(),
            class: failure.class,
            status: failure.status,
            attempts: self.max_attempts,
            detail: failure.detail,
        })
    }

    async fn attempt(&self, messages: Vec<Message>) -> Result<String, AttemptFailure> {
        match self
            .provider
            .complete(messages, self.temperature, self.max_tokens)
            .await
        {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    Err(AttemptFailure {
                        class: ErrorClass::EmptyResponse,
                        status: None,
                        detail: "service returned empty content".to_string(),
                    })
                } else {
                    Ok(text.to_string())
                }
            }
            Err(e) => Err(AttemptFailure {
                class: self.provider.classify(&e),
                status: e.status(),
                detail: e.to_string(),
            }),
        }
    }
}

fn cancelled(label: &str, attempts: u32) -> InvokeError {
    tracing::warn!(label, attempts, "cancelled");
    InvokeError::Cancelled {
        label: label.to_string(),
        attempts,
    }
}

impl std::fmt::Debug for ResilientInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientInvoker")
            .field("provider", &self.provider.provider_name())
            .field("max_attempts", &self.max_attempts)
            .field("policy", &self.policy)
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}
