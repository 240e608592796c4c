//! User-facing failure explanations.

use std::collections::BTreeMap;
use std::fmt;

use notewise_llm::ErrorClass;

use crate::error::InvokeError;

/// Why the pipeline ended in total failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureReason {
    /// The single request failed and no recovery path applied.
    SingleShotFailed,
    /// Too many parts failed; remaining parts were not processed.
    FailureRatioExceeded { ratio: f64, threshold: f64 },
    /// Every part failed.
    AllChunksFailed,
    /// Nothing was left to merge.
    NoSuccessfulChunks,
    /// The request has no transcript segments to split.
    NoContent,
    /// The caller cancelled or the deadline passed.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::SingleShotFailed => f.write_str("the request failed"),
            FailureReason::FailureRatioExceeded { ratio, threshold } => write!(
                f,
                "{:.0}% of parts failed, above the {:.0}% limit",
                ratio * 100.0,
                threshold * 100.0
            ),
            FailureReason::AllChunksFailed => f.write_str("every part failed"),
            FailureReason::NoSuccessfulChunks => f.write_str("no part produced a summary"),
            FailureReason::NoContent => f.write_str("the request contains no transcript segments"),
            FailureReason::Cancelled => {
                f.write_str("the operation was cancelled or ran past its deadline")
            }
        }
    }
}

/// Everything a caller needs to explain a total failure.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub reason: FailureReason,
    pub chunk_count: usize,
    /// Zero-based indices of the parts that failed.
    pub failed_chunks: Vec<usize>,
    /// Terminal errors observed, in completion order.
    pub errors: Vec<InvokeError>,
    pub dominant_class: Option<ErrorClass>,
    pub explanation: String,
    pub suggestions: Vec<String>,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explanation)?;
        if !self.suggestions.is_empty() {
            f.write_str("\n\nSuggestions:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n- {suggestion}")?;
            }
        }
        Ok(())
    }
}

/// Maps the error taxonomy onto explanations and suggestions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorReporter;

impl ErrorReporter {
    /// Short description of one terminal error, used in placeholders and logs.
    pub fn describe(&self, error: &InvokeError) -> String {
        match error.class() {
            None => "the operation was cancelled".to_string(),
            Some(class) => describe_class(class, error.status(), error.detail()),
        }
    }

    pub fn suggestions(&self, class: ErrorClass) -> &'static [&'static str] {
        match class {
            ErrorClass::Network => &[
                "Check the network connection and proxy settings",
                "Verify that the service base URL is reachable",
            ],
            ErrorClass::Timeout => &[
                "Retry later, the service may be overloaded",
                "Shorten the input or raise LLM_REQUEST_TIMEOUT_SECS",
            ],
            ErrorClass::RateLimit => &[
                "Wait a few minutes and retry",
                "Lower SUMMARY_CONCURRENCY or set SUMMARY_REQUESTS_PER_MINUTE",
            ],
            ErrorClass::ServerFault => &[
                "The service is having problems; wait and retry",
                "Try another model or provider",
            ],
            ErrorClass::ClientFault => &[
                "Verify the API key and model name",
                "Check the account's quota and permissions",
                "Reduce the input length if the request was too large",
            ],
            ErrorClass::EmptyResponse => &[
                "Retry; if this persists, try another model",
                "Reduce the input length",
            ],
            ErrorClass::Unknown => &[
                "Retry later",
                "Run with RUST_LOG=debug for details",
            ],
        }
    }

    /// Build the report for a total failure.
    pub fn report(
        &self,
        reason: FailureReason,
        chunk_count: usize,
        failed_chunks: Vec<usize>,
        errors: Vec<InvokeError>,
    ) -> FailureReport {
        let ranked = rank_classes(&errors);
        let dominant_class = ranked.first().copied();

        let mut explanation = format!("Summarization failed: {reason}.");
        if chunk_count > 1 && !failed_chunks.is_empty() {
            explanation.push_str(&format!(
                " Failed: {} of {chunk_count}.",
                format_parts(&failed_chunks)
            ));
        }
        if let Some(class) = dominant_class {
            if let Some(sample) = errors.iter().find(|e| e.class() == Some(class)) {
                explanation.push_str(&format!(" Main cause: {}.", self.describe(sample)));
            }
        }
        for error in &errors {
            explanation.push_str(&format!(
                "\n- {}: {} ({} attempt(s))",
                error.label(),
                self.describe(error),
                error.attempts()
            ));
        }

        let mut suggestions: Vec<String> = Vec::new();
        let mut push = |s: &str| {
            if !suggestions.iter().any(|existing| existing == s) {
                suggestions.push(s.to_string());
            }
        };
        for class in &ranked {
            self.suggestions(*class).iter().for_each(|s| push(*s));
        }
        match reason {
            FailureReason::Cancelled => {
                push("Raise SUMMARY_DEADLINE_SECS if the deadline was too short")
            }
            FailureReason::NoContent => push("Check that transcription produced segments"),
            _ => {}
        }

        FailureReport {
            reason,
            chunk_count,
            failed_chunks,
            errors,
            dominant_class,
            explanation,
            suggestions,
        }
    }

    /// Fold the error of a failed single request into the report of the chunked
    /// retry that followed it.
    pub fn with_prior_failure(&self, prior: InvokeError, report: FailureReport) -> FailureReport {
        let FailureReport {
            reason,
            chunk_count,
            failed_chunks,
            errors,
            ..
        } = report;
        let mut combined = Vec::with_capacity(errors.len() + 1);
        combined.push(prior);
        combined.extend(errors);

        let mut merged = self.report(reason, chunk_count, failed_chunks, combined);
        merged.explanation = format!(
            "The single request failed and splitting into parts did not recover. {}",
            merged.explanation
        );
        merged
    }
}

/// `"part 3"` / `"parts 2, 5, 9"` from zero-based indices.
pub fn format_parts(indices: &[usize]) -> String {
    let numbers = indices
        .iter()
        .map(|i| (i + 1).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if indices.len() == 1 {
        format!("part {numbers}")
    } else {
        format!("parts {numbers}")
    }
}

/// Classes by descending frequency; ties keep taxonomy order.
fn rank_classes(errors: &[InvokeError]) -> Vec<ErrorClass> {
    let mut counts: BTreeMap<ErrorClass, usize> = BTreeMap::new();
    for class in errors.iter().filter_map(InvokeError::class) {
        *counts.entry(class).or_default() += 1;
    }
    let mut ranked: Vec<(ErrorClass, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().map(|(class, _)| class).collect()
}

fn describe_class(class: ErrorClass, status: Option<u16>, detail: &str) -> String {
    match class {
        ErrorClass::Network => "network connection to the AI service failed".to_string(),
        ErrorClass::Timeout => "the AI service did not respond in time".to_string(),
        ErrorClass::RateLimit => "the AI service rate limit was reached".to_string(),
        ErrorClass::ServerFault => match status {
            Some(code) => format!("the AI service had a temporary server error (HTTP {code})"),
            None => "the AI service had a temporary server error".to_string(),
        },
        ErrorClass::ClientFault => match status {
            Some(401) => "the API key was rejected".to_string(),
            Some(403) => "access was denied; check permissions or quota".to_string(),
            Some(404) => "the model or endpoint was not found".to_string(),
            Some(413) => "the request was too large".to_string(),
            Some(code) => format!("the request was rejected (HTTP {code})"),
            None => format!("the request was rejected: {}", clip(detail, 120)),
        },
        ErrorClass::EmptyResponse => "the AI service returned an empty response".to_string(),
        ErrorClass::Unknown => format!("unexpected error: {}", clip(detail, 120)),
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut clipped: String = text.chars().take(max_chars).collect();
        clipped.push_str("...");
        clipped
    }
}
