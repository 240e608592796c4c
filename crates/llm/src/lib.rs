pub mod classify;
pub mod provider;
pub mod providers;

pub use classify::{classify_error, classify_status, ErrorClass};
pub use provider::{ContentPart, ImageUrl, LlmError, LlmProvider, Message, Role};
pub use providers::create_provider;

/// Scripted provider for exercising retry and orchestration logic without a network.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
