use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, Write};

use notewise_core::SourceRequest;
use notewise_pipeline::render::format_timestamp;
use notewise_pipeline::report::format_parts;
use notewise_pipeline::{ChunkPlan, FailureReport, PipelineOutcome};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const OK: Color = Color::Green;
    const WARN: Color = Color::Yellow;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// Status output on stderr; stdout is reserved for the generated document.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print the startup banner.
    pub fn print_banner(&self, provider: &str, model: &str, profile: &str) -> Result<()> {
        let mut stderr = io::stderr();
        execute!(
            stderr,
            SetForegroundColor(Colors::HEADER),
            Print("notewise"),
            ResetColor,
            SetForegroundColor(Colors::DIM),
            Print(format!(" | Provider: {} | Model: {} | Profile: {}\n", provider, model, profile)),
            ResetColor,
        )?;
        stderr.flush()?;
        Ok(())
    }

    /// One line describing how the run ended.
    pub fn print_outcome(&self, outcome: &PipelineOutcome) -> Result<()> {
        let (color, line) = outcome_line(outcome);
        let mut stderr = io::stderr();
        execute!(
            stderr,
            SetForegroundColor(color),
            Print(format!("{}\n", line)),
            ResetColor,
        )?;
        stderr.flush()?;
        Ok(())
    }

    /// Explanation and suggestions of a total failure.
    pub fn print_report(&self, report: &FailureReport) -> Result<()> {
        let mut stderr = io::stderr();
        execute!(
            stderr,
            SetForegroundColor(Colors::ERROR),
            Print(format!("{}\n", report.explanation)),
            ResetColor,
        )?;
        if !report.suggestions.is_empty() {
            execute!(
                stderr,
                SetForegroundColor(Colors::HEADER),
                Print("\nSuggestions:\n"),
                ResetColor,
            )?;
            for suggestion in &report.suggestions {
                execute!(stderr, Print(format!("  - {}\n", suggestion)))?;
            }
        }
        stderr.flush()?;
        Ok(())
    }

    /// Chunk table for `plan`.
    pub fn print_plan(
        &self,
        request: &SourceRequest,
        plan: &ChunkPlan,
        reason: &str,
    ) -> Result<()> {
        let mut stderr = io::stderr();
        execute!(
            stderr,
            SetForegroundColor(Colors::WARN),
            Print(format!(
                "Chunked: {} chunk(s) of up to {} segments ({})\n",
                plan.chunk_count, plan.chunk_size, reason
            )),
            SetForegroundColor(Colors::DIM),
            Print(format!("{:<8} {:<14} {}\n", "PART", "SEGMENTS", "SPAN")),
            Print(format!("{}\n", "-".repeat(40))),
            ResetColor,
        )?;
        for row in plan_rows(request, plan) {
            execute!(stderr, Print(format!("{}\n", row)))?;
        }
        stderr.flush()?;
        Ok(())
    }

    /// Print a success message.
    pub fn print_ok(&self, msg: &str) -> Result<()> {
        let mut stderr = io::stderr();
        execute!(
            stderr,
            SetForegroundColor(Colors::OK),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stderr.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stderr = io::stderr();
        execute!(
            stderr,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stderr.flush()?;
        Ok(())
    }
}

fn outcome_line(outcome: &PipelineOutcome) -> (Color, String) {
    match outcome {
        PipelineOutcome::MergedDocument {
            chunk_count,
            failed_chunks,
            ..
        } if failed_chunks.is_empty() => (
            Colors::OK,
            format!("Done: {} part(s) summarized.", chunk_count),
        ),
        PipelineOutcome::MergedDocument {
            chunk_count,
            failed_chunks,
            ..
        } => (
            Colors::WARN,
            format!(
                "Done with gaps: {} of {} missing.",
                format_parts(failed_chunks),
                chunk_count
            ),
        ),
        PipelineOutcome::DegradedConcatenation {
            chunk_count,
            merge_error,
            ..
        } => (
            Colors::WARN,
            format!(
                "Merge failed ({}); wrote {} part summaries without synthesis.",
                merge_error.class().map(|c| c.as_str()).unwrap_or("cancelled"),
                chunk_count
            ),
        ),
        PipelineOutcome::TotalFailure(report) => {
            (Colors::ERROR, format!("Failed: {}.", report.reason))
        }
    }
}

/// `PART  SEGMENTS  SPAN` rows; spans use the segment timestamps.
fn plan_rows(request: &SourceRequest, plan: &ChunkPlan) -> Vec<String> {
    plan.ranges()
        .into_iter()
        .enumerate()
        .map(|(i, range)| {
            let first = request.segments.get(range.start);
            let last = request.segments.get(range.end - 1);
            let span = match (first, last) {
                (Some(first), Some(last)) => format!(
                    "{}-{}",
                    format_timestamp(first.start),
                    format_timestamp(last.end)
                ),
                _ => String::from("-"),
            };
            format!(
                "{:<8} {:<14} {}",
                i + 1,
                format!("{}..{}", range.start, range.end),
                span
            )
        })
        .collect()
}
