//! Per-chunk processing with the failure-ratio guard.

use std::ops::Range;

use futures::stream::{FuturesUnordered, StreamExt};
use notewise_core::SourceRequest;
use notewise_llm::ErrorClass;

use crate::cancel::CancellationToken;
use crate::error::InvokeError;
use crate::invoker::ResilientInvoker;
use crate::payload::PayloadBuilder;
use crate::planner::ChunkPlan;
use crate::report::{format_parts, ErrorReporter, FailureReason, FailureReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Success,
    Failure,
}

/// Outcome of one chunk. Written once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    pub index: usize,
    pub status: ChunkStatus,
    pub summary_text: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub error: Option<InvokeError>,
}

impl ChunkResult {
    pub fn success(index: usize, text: String) -> Self {
        Self {
            index,
            status: ChunkStatus::Success,
            summary_text: Some(text),
            error_class: None,
            error: None,
        }
    }

    pub fn failure(index: usize, error: InvokeError) -> Self {
        Self {
            index,
            status: ChunkStatus::Failure,
            summary_text: None,
            error_class: error.class(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ChunkStatus::Success
    }

    /// `### Part i` section: the summary, or a placeholder naming the failure.
    pub fn section(&self, reporter: &ErrorReporter) -> String {
        let part = self.index + 1;
        match (&self.summary_text, &self.error) {
            (Some(text), _) => format!("### Part {part}\n\n{text}"),
            (None, Some(error)) => format!(
                "### Part {part}\n\n*[part {part} failed: {}]*",
                reporter.describe(error)
            ),
            (None, None) => format!("### Part {part}\n\n*[part {part} failed]*"),
        }
    }
}

/// Every chunk result of a run that was not aborted, ordered by index.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkBatch {
    pub chunk_count: usize,
    pub results: Vec<ChunkResult>,
}

impl ChunkBatch {
    pub fn successes(&self) -> impl Iterator<Item = &ChunkResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.index)
            .collect()
    }

    pub fn errors(&self) -> Vec<InvokeError> {
        self.results.iter().filter_map(|r| r.error.clone()).collect()
    }

    /// Merge input: one section per chunk, placeholders included.
    pub fn merge_input(&self, reporter: &ErrorReporter) -> String {
        self.results
            .iter()
            .map(|r| r.section(reporter))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Successful sections only, in order.
    pub fn concatenate_successes(&self, reporter: &ErrorReporter) -> String {
        self.successes()
            .map(|r| r.section(reporter))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Drives one invoker call per chunk.
///
/// At most `concurrency` chunks are in flight; with a concurrency of one the
/// chunks run strictly in order. The ratio guard runs on every completed
/// failure and, once breached, stops the run and drops in-flight chunks.
#[derive(Debug, Clone)]
pub struct ChunkOrchestrator {
    invoker: ResilientInvoker,
    payloads: PayloadBuilder,
    reporter: ErrorReporter,
    max_failed_ratio: f64,
    concurrency: usize,
}

impl ChunkOrchestrator {
    pub fn new(
        invoker: ResilientInvoker,
        payloads: PayloadBuilder,
        max_failed_ratio: f64,
        concurrency: usize,
    ) -> Self {
        Self {
            invoker,
            payloads,
            reporter: ErrorReporter,
            max_failed_ratio,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(
        &self,
        request: &SourceRequest,
        plan: &ChunkPlan,
        cancel: &CancellationToken,
    ) -> Result<ChunkBatch, FailureReport> {
        let ranges = plan.ranges();
        let total = ranges.len();
        if total == 0 {
            return Err(self.reporter.report(FailureReason::NoContent, 0, vec![], vec![]));
        }
        tracing::info!(
            chunks = total,
            chunk_size = plan.chunk_size,
            concurrency = self.concurrency,
            "processing chunks"
        );

        let mut slots: Vec<Option<ChunkResult>> = (0..total).map(|_| None).collect();
        let mut failed: Vec<usize> = Vec::new();
        let mut errors: Vec<InvokeError> = Vec::new();
        let mut pending = ranges.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.concurrency && !cancel.is_cancelled() {
                match pending.next() {
                    Some((index, range)) => {
                        in_flight.push(self.process(request, index, range, total, cancel))
                    }
                    None => break,
                }
            }

            let Some(result) = in_flight.next().await else {
                break;
            };

            if let Some(error) = &result.error {
                if error.is_cancelled() {
                    return Err(self.abort(FailureReason::Cancelled, total, failed, errors));
                }
                failed.push(result.index);
                errors.push(error.clone());

                let ratio = failed.len() as f64 / total as f64;
                if ratio > self.max_failed_ratio {
                    tracing::error!(
                        chunk = result.index + 1,
                        failed = failed.len(),
                        chunks = total,
                        ratio,
                        threshold = self.max_failed_ratio,
                        "failure ratio exceeded, aborting remaining chunks"
                    );
                    let reason = if failed.len() == total {
                        FailureReason::AllChunksFailed
                    } else {
                        FailureReason::FailureRatioExceeded {
                            ratio,
                            threshold: self.max_failed_ratio,
                        }
                    };
                    return Err(self.abort(reason, total, failed, errors));
                }
                tracing::warn!(
                    chunk = result.index + 1,
                    failed = failed.len(),
                    chunks = total,
                    ratio,
                    "chunk failed, continuing with placeholder"
                );
            }

            let index = result.index;
            slots[index] = Some(result);
        }

        let results: Vec<ChunkResult> = slots.into_iter().flatten().collect();
        if results.len() < total {
            return Err(self.abort(FailureReason::Cancelled, total, failed, errors));
        }

        let batch = ChunkBatch {
            chunk_count: total,
            results,
        };
        let succeeded = batch.success_count();
        if succeeded == 0 {
            return Err(self.abort(FailureReason::AllChunksFailed, total, failed, errors));
        }
        if !failed.is_empty() {
            tracing::warn!(
                failed = failed.len(),
                chunks = total,
                missing = %format_parts(&batch.failed_indices()),
                "some chunks failed"
            );
        }
        if succeeded * 2 < total {
            tracing::warn!(
                succeeded,
                chunks = total,
                "fewer than half of the chunks succeeded, summary quality may suffer"
            );
        }
        Ok(batch)
    }

    async fn process(
        &self,
        request: &SourceRequest,
        index: usize,
        range: Range<usize>,
        total: usize,
        cancel: &CancellationToken,
    ) -> ChunkResult {
        let label = format!("chunk {}/{}", index + 1, total);
        tracing::debug!(label = %label, segments = range.len(), "chunk started");

        let sub_request = request.chunk(range, index + 1, total);
        let payload = self.payloads.build(&sub_request);
        match self.invoker.invoke(&payload, &label, cancel).await {
            Ok(text) => {
                tracing::info!(label = %label, chars = text.len(), "chunk summarized");
                ChunkResult::success(index, text)
            }
            Err(error) => ChunkResult::failure(index, error),
        }
    }

    fn abort(
        &self,
        reason: FailureReason,
        total: usize,
        mut failed: Vec<usize>,
        errors: Vec<InvokeError>,
    ) -> FailureReport {
        failed.sort_unstable();
        self.reporter.report(reason, total, failed, errors)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use notewise_core::Segment;
    use notewise_llm::mock::MockLlmProvider;
    use notewise_llm::{LlmError, Message};

    use super::*;
    use crate::prompt::TemplatePromptBuilder;
    use crate::retry::{BackoffPolicy, FixedJitter, RecordingSleeper};

    fn part_of(messages: &[Message]) -> usize {
        let text = messages[0].text();
        let start = text.find("part ").expect("part marker") + 5;
        let end = start + text[start..].find('/').expect("slash");
        text[start..end].parse().expect("part number")
    }

    fn orchestrator(mock: Arc<MockLlmProvider>, concurrency: usize) -> ChunkOrchestrator {
        let invoker = ResilientInvoker::new(
            mock,
            2,
            BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(5)),
            Arc::new(RecordingSleeper::new()),
            Arc::new(FixedJitter(0.0)),
        );
        let payloads = PayloadBuilder::new(Arc::new(TemplatePromptBuilder), 30_000, 5);
        ChunkOrchestrator::new(invoker, payloads, 0.3, concurrency)
    }

    fn request(segments: usize) -> SourceRequest {
        SourceRequest::new(
            "Lecture",
            (0..segments)
                .map(|i| Segment::new(i as f64, i as f64 + 1.0, format!("s{i}")))
                .collect(),
        )
    }

    fn failing_parts(parts: &'static [usize]) -> Arc<MockLlmProvider> {
        Arc::new(MockLlmProvider::with_handler(move |messages| {
            let part = part_of(messages);
            if parts.contains(&part) {
                Err(LlmError::Connection("reset".into()))
            } else {
                Ok(format!("summary {part}"))
            }
        }))
    }

    #[tokio::test]
    async fn ratio_breach_aborts_before_remaining_chunks() {
        let mock = failing_parts(&[1, 2, 3, 4]);
        let plan = ChunkPlan::new(10, 1);

        let report = orchestrator(mock.clone(), 1)
            .run(&request(10), &plan, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(report.failed_chunks, vec![0, 1, 2, 3]);
        assert!(matches!(
            report.reason,
            FailureReason::FailureRatioExceeded { .. }
        ));
        // Four chunks, two attempts each; parts 5..10 never sent.
        assert_eq!(mock.call_count(), 8);
        assert!(mock.prompts().iter().all(|p| !p.contains("part 5/10")));
    }

    #[tokio::test]
    async fn tolerated_failures_leave_placeholders() {
        let mock = failing_parts(&[3, 7]);
        let plan = ChunkPlan::new(10, 1);

        let batch = orchestrator(mock.clone(), 1)
            .run(&request(10), &plan, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(batch.results.len(), 10);
        assert_eq!(batch.failed_indices(), vec![2, 6]);
        assert_eq!(batch.success_count(), 8);
        let merge_input = batch.merge_input(&ErrorReporter);
        assert!(merge_input.contains("### Part 1\n\nsummary 1"));
        assert!(merge_input
            .contains("*[part 3 failed: network connection to the AI service failed]*"));
        assert!(!batch.concatenate_successes(&ErrorReporter).contains("part 3 failed"));
    }

    #[tokio::test]
    async fn single_failing_chunk_is_all_failed() {
        let mock = failing_parts(&[1]);
        let plan = ChunkPlan::new(5, 250);

        let report = orchestrator(mock, 1)
            .run(&request(5), &plan, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(report.reason, FailureReason::AllChunksFailed);
        assert_eq!(report.failed_chunks, vec![0]);
    }

    #[tokio::test]
    async fn concurrent_results_stay_in_chunk_order() {
        let mock = failing_parts(&[]);
        let plan = ChunkPlan::new(12, 2);

        let batch = orchestrator(mock.clone(), 4)
            .run(&request(12), &plan, &CancellationToken::new())
            .await
            .unwrap();

        let indices: Vec<usize> = batch.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, (0..6).collect::<Vec<_>>());
        assert_eq!(batch.results[5].summary_text.as_deref(), Some("summary 6"));
        assert_eq!(mock.call_count(), 6);
    }

    #[tokio::test]
    async fn cancelled_before_start_reports_cancellation() {
        let mock = failing_parts(&[]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator(mock.clone(), 1)
            .run(&request(4), &ChunkPlan::new(4, 2), &cancel)
            .await
            .unwrap_err();

        assert_eq!(report.reason, FailureReason::Cancelled);
        assert_eq!(mock.call_count(), 0);
    }
}
