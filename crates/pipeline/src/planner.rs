//! Single-shot vs chunked routing and chunk boundary computation.

use std::ops::Range;

use notewise_core::SourceRequest;

use crate::payload::{Payload, PayloadBuilder};

/// Partition of `total_segments` into `chunk_count` contiguous ranges of at most `chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_segments: usize,
    pub chunk_count: usize,
    pub chunk_size: usize,
}

impl ChunkPlan {
    /// `chunk_count = ceil(total / max)`, `chunk_size = ceil(total / chunk_count)`.
    ///
    /// An empty input yields an empty plan. `max_segments_per_chunk` of zero is
    /// treated as one.
    pub fn new(total_segments: usize, max_segments_per_chunk: usize) -> Self {
        let max = max_segments_per_chunk.max(1);
        if total_segments == 0 {
            return Self {
                total_segments,
                chunk_count: 0,
                chunk_size: 0,
            };
        }
        let chunk_count = total_segments.div_ceil(max);
        let chunk_size = total_segments.div_ceil(chunk_count);
        Self {
            total_segments,
            chunk_count,
            chunk_size,
        }
    }

    /// Ordered, non-overlapping ranges covering `[0, total_segments)`; the last may be shorter.
    pub fn ranges(&self) -> Vec<Range<usize>> {
        (0..self.chunk_count)
            .map(|i| {
                let start = i * self.chunk_size;
                let end = (start + self.chunk_size).min(self.total_segments);
                start..end
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }
}

/// Routing decision for one request.
#[derive(Debug, Clone)]
pub enum Route {
    SingleShot(Payload),
    Chunked(ChunkPlan),
}

/// Why a request was routed to chunked mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkReason {
    TooManySegments,
    PayloadTooLarge { bytes: usize },
}

#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    max_segments_per_chunk: usize,
    max_payload_bytes: usize,
}

impl ChunkPlanner {
    pub fn new(max_segments_per_chunk: usize, max_payload_bytes: usize) -> Self {
        Self {
            max_segments_per_chunk,
            max_payload_bytes,
        }
    }

    pub fn plan(&self, total_segments: usize) -> ChunkPlan {
        ChunkPlan::new(total_segments, self.max_segments_per_chunk)
    }

    /// Decide the route. The single-shot payload is built first and measured;
    /// an oversized payload re-routes to chunked mode instead of failing.
    pub fn route(
        &self,
        request: &SourceRequest,
        payloads: &PayloadBuilder,
    ) -> (Route, Option<ChunkReason>) {
        let total = request.segments.len();
        if total > self.max_segments_per_chunk {
            tracing::info!(
                segments = total,
                max = self.max_segments_per_chunk,
                "segment count over limit, chunking"
            );
            return (
                Route::Chunked(self.plan(total)),
                Some(ChunkReason::TooManySegments),
            );
        }

        let payload = payloads.build(request);
        let bytes = payload.serialized_len();
        if bytes > self.max_payload_bytes {
            tracing::info!(
                bytes,
                max = self.max_payload_bytes,
                "payload over byte limit, chunking"
            );
            return (
                Route::Chunked(self.plan(total)),
                Some(ChunkReason::PayloadTooLarge { bytes }),
            );
        }

        (Route::SingleShot(payload), None)
    }
}
