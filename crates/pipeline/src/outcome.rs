use crate::error::{InvokeError, PipelineError};
use crate::report::FailureReport;

/// Final state of one summarization run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// One coherent document, either from a single request or from a successful merge.
    MergedDocument {
        text: String,
        chunk_count: usize,
        /// Zero-based parts missing from the merge input.
        failed_chunks: Vec<usize>,
    },
    /// The merge failed; the successful part summaries are joined in order.
    DegradedConcatenation {
        text: String,
        chunk_count: usize,
        missing_chunks: Vec<usize>,
        merge_error: InvokeError,
    },
    TotalFailure(FailureReport),
}

impl PipelineOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            PipelineOutcome::MergedDocument { text, .. }
            | PipelineOutcome::DegradedConcatenation { text, .. } => Some(text),
            PipelineOutcome::TotalFailure(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PipelineOutcome::TotalFailure(_))
    }

    pub fn chunk_count(&self) -> usize {
        match self {
            PipelineOutcome::MergedDocument { chunk_count, .. }
            | PipelineOutcome::DegradedConcatenation { chunk_count, .. } => *chunk_count,
            PipelineOutcome::TotalFailure(report) => report.chunk_count,
        }
    }

    /// Zero-based indices of failed parts, whatever the outcome.
    pub fn failed_chunks(&self) -> &[usize] {
        match self {
            PipelineOutcome::MergedDocument { failed_chunks, .. } => failed_chunks,
            PipelineOutcome::DegradedConcatenation { missing_chunks, .. } => missing_chunks,
            PipelineOutcome::TotalFailure(report) => &report.failed_chunks,
        }
    }

    pub fn into_result(self) -> Result<String, PipelineError> {
        match self {
            PipelineOutcome::MergedDocument { text, .. }
            | PipelineOutcome::DegradedConcatenation { text, .. } => Ok(text),
            PipelineOutcome::TotalFailure(report) => {
                Err(PipelineError::TotalFailure(Box::new(report)))
            }
        }
    }
}
