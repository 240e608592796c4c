//! Top-level pipeline: plan, then either one request or chunk + merge.
//!
//! [`SummarizerBuilder`] wires the stages from a [`PipelineConfig`] and an
//! [`LlmProvider`]; [`Summarizer`] runs the per-request state machine
//! `Planning -> (SingleShot | ChunkProcessing -> Merging) -> outcome`.

use std::sync::Arc;

use notewise_core::{PipelineConfig, SourceRequest};
use notewise_llm::LlmProvider;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::error::PipelineError;
use crate::invoker::ResilientInvoker;
use crate::limiter::RequestLimiter;
use crate::merge::MergeStage;
use crate::orchestrator::ChunkOrchestrator;
use crate::outcome::PipelineOutcome;
use crate::payload::PayloadBuilder;
use crate::planner::{ChunkPlan, ChunkPlanner, ChunkReason, Route};
use crate::prompt::{PromptBuilder, TemplatePromptBuilder};
use crate::report::{ErrorReporter, FailureReason};
use crate::retry::{BackoffPolicy, Jitter, RandomJitter, Sleeper, TokioSleeper};

pub const SINGLE_LABEL: &str = "single request";

// ── SummarizerBuilder ────────────────────────────────────────────────

/// Fluent builder for a [`Summarizer`].
///
/// # Example
/// ```ignore
/// let summarizer = SummarizerBuilder::new(provider)
///     .config(config.pipeline.clone())
///     .sampling(config.llm.temperature, config.llm.max_tokens)
///     .build()?;
/// let outcome = summarizer.summarize(&request).await;
/// ```
pub struct SummarizerBuilder {
    provider: Arc<dyn LlmProvider>,
    config: PipelineConfig,
    prompt: Arc<dyn PromptBuilder>,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn Jitter>,
    temperature: f32,
    max_tokens: u32,
}

impl SummarizerBuilder {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            config: PipelineConfig::default(),
            prompt: Arc::new(TemplatePromptBuilder),
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(RandomJitter),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default note-taking prompt.
    pub fn prompt_builder(mut self, prompt: Arc<dyn PromptBuilder>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Temperature and output token budget passed on every call.
    pub fn sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Validate the configuration and assemble the stages.
    pub fn build(self) -> Result<Summarizer, PipelineError> {
        self.config.validate()?;
        let config = self.config;

        let limiter = config.requests_per_minute.and_then(RequestLimiter::per_minute);
        let invoker = ResilientInvoker::new(
            self.provider,
            config.max_retries,
            BackoffPolicy::new(config.base_delay(), config.max_delay()),
            self.sleeper,
            self.jitter,
        )
        .with_sampling(self.temperature, self.max_tokens)
        .with_limiter(limiter);

        let payloads =
            PayloadBuilder::new(self.prompt, config.max_content_length, config.max_images);
        let planner = ChunkPlanner::new(config.max_segments_per_chunk, config.max_payload_bytes);
        let orchestrator = ChunkOrchestrator::new(
            invoker.clone(),
            payloads.clone(),
            config.max_failed_chunks_ratio,
            config.concurrency,
        );
        let merge = MergeStage::new(invoker.clone(), payloads.clone());

        Ok(Summarizer {
            config,
            planner,
            payloads,
            invoker,
            orchestrator,
            merge,
            reporter: ErrorReporter,
        })
    }
}

// ── Summarizer ───────────────────────────────────────────────────────

/// Resilient chunked summarization of one [`SourceRequest`] at a time.
///
/// Holds no per-request state; one instance can serve concurrent calls.
#[derive(Debug, Clone)]
pub struct Summarizer {
    config: PipelineConfig,
    planner: ChunkPlanner,
    payloads: PayloadBuilder,
    invoker: ResilientInvoker,
    orchestrator: ChunkOrchestrator,
    merge: MergeStage,
    reporter: ErrorReporter,
}

impl Summarizer {
    pub fn builder(provider: Arc<dyn LlmProvider>) -> SummarizerBuilder {
        SummarizerBuilder::new(provider)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Routing decision for `request` without calling the service.
    pub fn plan(&self, request: &SourceRequest) -> (Route, Option<ChunkReason>) {
        self.planner.route(request, &self.payloads)
    }

    /// Run with a fresh token bounded by the configured deadline, if any.
    pub async fn summarize(&self, request: &SourceRequest) -> PipelineOutcome {
        let cancel = match self.config.deadline() {
            Some(deadline) => CancellationToken::with_deadline(deadline),
            None => CancellationToken::new(),
        };
        self.summarize_with_cancel(request, &cancel).await
    }

    pub async fn summarize_with_cancel(
        &self,
        request: &SourceRequest,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        info!(
            title = %request.title,
            segments = request.segments.len(),
            images = request.image_urls.len(),
            provider = self.invoker.provider_name(),
            "planning"
        );

        let outcome = match self.plan(request) {
            (Route::SingleShot(payload), _) => {
                info!(bytes = payload.serialized_len(), "single request");
                match self.invoker.invoke(&payload, SINGLE_LABEL, cancel).await {
                    Ok(text) => PipelineOutcome::MergedDocument {
                        text,
                        chunk_count: 1,
                        failed_chunks: Vec::new(),
                    },
                    Err(error)
                        if error.is_transient()
                            && self.config.fallback_to_chunks
                            && !request.segments.is_empty() =>
                    {
                        warn!(
                            error = %error,
                            "single request failed, retrying in chunked mode"
                        );
                        let plan = self.planner.plan(request.segments.len());
                        match self.run_chunked(request, &plan, cancel).await {
                            PipelineOutcome::TotalFailure(report) => PipelineOutcome::TotalFailure(
                                self.reporter.with_prior_failure(error, report),
                            ),
                            recovered => recovered,
                        }
                    }
                    Err(error) => {
                        let reason = if error.is_cancelled() {
                            FailureReason::Cancelled
                        } else {
                            FailureReason::SingleShotFailed
                        };
                        PipelineOutcome::TotalFailure(self.reporter.report(
                            reason,
                            1,
                            vec![0],
                            vec![error],
                        ))
                    }
                }
            }
            (Route::Chunked(plan), _) => self.run_chunked(request, &plan, cancel).await,
        };

        match &outcome {
            PipelineOutcome::MergedDocument {
                chunk_count,
                failed_chunks,
                text,
            } => info!(
                chunks = chunk_count,
                failed = failed_chunks.len(),
                chars = text.len(),
                "summary complete"
            ),
            PipelineOutcome::DegradedConcatenation {
                chunk_count,
                missing_chunks,
                ..
            } => warn!(
                chunks = chunk_count,
                missing = missing_chunks.len(),
                "summary degraded to concatenation"
            ),
            PipelineOutcome::TotalFailure(report) => tracing::error!(
                reason = %report.reason,
                failed = report.failed_chunks.len(),
                dominant = ?report.dominant_class,
                "summary failed"
            ),
        }
        outcome
    }

    async fn run_chunked(
        &self,
        request: &SourceRequest,
        plan: &ChunkPlan,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        match self.orchestrator.run(request, plan, cancel).await {
            Ok(batch) => self.merge.run(request, batch, cancel).await,
            Err(report) => PipelineOutcome::TotalFailure(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use notewise_llm::mock::MockLlmProvider;

    use super::*;

    #[test]
    fn build_rejects_invalid_config() {
        let config = PipelineConfig {
            concurrency: 0,
            ..PipelineConfig::default()
        };
        let err = Summarizer::builder(Arc::new(MockLlmProvider::new()))
            .config(config)
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn build_rejects_unbounded_deadline() {
        let config = PipelineConfig {
            deadline_secs: Some(u64::MAX),
            ..PipelineConfig::default()
        };
        let err = Summarizer::builder(Arc::new(MockLlmProvider::new()))
            .config(config)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("deadline_secs"));
    }

    #[test]
    fn plan_does_not_call_the_service() {
        let mock = Arc::new(MockLlmProvider::new());
        let summarizer = Summarizer::builder(mock.clone()).build().unwrap();
        let request = SourceRequest::new(
            "t",
            (0..620)
                .map(|i| notewise_core::Segment::new(i as f64, i as f64, "x"))
                .collect(),
        );
        match summarizer.plan(&request) {
            (Route::Chunked(plan), Some(ChunkReason::TooManySegments)) => {
                assert_eq!(plan.chunk_count, 3)
            }
            other => panic!("unexpected route {other:?}"),
        }
        assert_eq!(mock.call_count(), 0);
    }
}
