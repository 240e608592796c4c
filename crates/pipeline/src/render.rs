//! Canonical text rendering of transcript segments.

use notewise_core::Segment;

/// Format an offset as `mm:ss`. Minutes keep counting past the hour (`75:02`).
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// One `mm:ss - text` line per segment, in input order.
pub fn render_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|seg| format!("{} - {}", format_timestamp(seg.start), seg.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
