pub mod config;
pub mod error;
pub mod segment;

pub use config::{Config, LlmConfig, PipelineConfig};
pub use error::*;
pub use segment::*;
