//! Final synthesis over the part summaries, with degraded fallback.

use notewise_core::SourceRequest;

use crate::cancel::CancellationToken;
use crate::invoker::ResilientInvoker;
use crate::orchestrator::ChunkBatch;
use crate::outcome::PipelineOutcome;
use crate::payload::PayloadBuilder;
use crate::report::{format_parts, ErrorReporter, FailureReason};

pub const MERGE_LABEL: &str = "final merge";

#[derive(Debug, Clone)]
pub struct MergeStage {
    invoker: ResilientInvoker,
    payloads: PayloadBuilder,
    reporter: ErrorReporter,
}

impl MergeStage {
    pub fn new(invoker: ResilientInvoker, payloads: PayloadBuilder) -> Self {
        Self {
            invoker,
            payloads,
            reporter: ErrorReporter,
        }
    }

    pub async fn run(
        &self,
        request: &SourceRequest,
        batch: ChunkBatch,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let failed = batch.failed_indices();
        if batch.success_count() == 0 {
            return PipelineOutcome::TotalFailure(self.reporter.report(
                FailureReason::NoSuccessfulChunks,
                batch.chunk_count,
                failed,
                batch.errors(),
            ));
        }

        let merge_request = request.merge(batch.merge_input(&self.reporter));
        let payload = self.payloads.build(&merge_request);
        tracing::info!(
            parts = batch.chunk_count,
            failed = failed.len(),
            "merging part summaries"
        );

        match self.invoker.invoke(&payload, MERGE_LABEL, cancel).await {
            Ok(mut text) => {
                if !failed.is_empty() {
                    text.push_str(&format!(
                        "\n\n---\n\n> Note: {} of {} could not be processed and {} missing from this summary.",
                        format_parts(&failed),
                        batch.chunk_count,
                        if failed.len() == 1 { "is" } else { "are" }
                    ));
                }
                PipelineOutcome::MergedDocument {
                    text,
                    chunk_count: batch.chunk_count,
                    failed_chunks: failed,
                }
            }
            Err(error) if error.is_cancelled() => {
                let mut errors = batch.errors();
                errors.push(error);
                PipelineOutcome::TotalFailure(self.reporter.report(
                    FailureReason::Cancelled,
                    batch.chunk_count,
                    failed,
                    errors,
                ))
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    parts = batch.success_count(),
                    "merge failed, falling back to concatenated part summaries"
                );
                let mut text = batch.concatenate_successes(&self.reporter);
                text.push_str(&format!(
                    "\n\n---\n\n> Note: the final merge step failed ({}), so the part summaries are shown as-is.",
                    self.reporter.describe(&error)
                ));
                if !failed.is_empty() {
                    text.push_str(&format!(
                        " {} of {} could not be processed and {} missing.",
                        capitalize(&format_parts(&failed)),
                        batch.chunk_count,
                        if failed.len() == 1 { "is" } else { "are" }
                    ));
                }
                PipelineOutcome::DegradedConcatenation {
                    text,
                    chunk_count: batch.chunk_count,
                    missing_chunks: failed,
                    merge_error: error,
                }
            }
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
