pub mod cancel;
pub mod error;
pub mod invoker;
pub mod limiter;
pub mod merge;
pub mod orchestrator;
pub mod outcome;
pub mod payload;
pub mod planner;
pub mod prompt;
pub mod render;
pub mod report;
pub mod retry;
pub mod summarizer;

pub use cancel::CancellationToken;
pub use error::{InvokeError, PipelineError};
pub use invoker::{AttemptFailure, ResilientInvoker};
pub use limiter::RequestLimiter;
pub use merge::MergeStage;
pub use orchestrator::{ChunkBatch, ChunkOrchestrator, ChunkResult, ChunkStatus};
pub use outcome::PipelineOutcome;
pub use payload::{truncate_middle, Payload, PayloadBuilder, ELISION_MARKER};
pub use planner::{ChunkPlan, ChunkPlanner, ChunkReason, Route};
pub use prompt::{PromptBuilder, PromptInput, TemplatePromptBuilder};
pub use render::{format_timestamp, render_segments};
pub use report::{ErrorReporter, FailureReason, FailureReport};
pub use retry::{
    BackoffKind, BackoffPolicy, FixedJitter, Jitter, RandomJitter, RecordingSleeper, Sleeper,
    TokioSleeper,
};
pub use summarizer::{Summarizer, SummarizerBuilder};
