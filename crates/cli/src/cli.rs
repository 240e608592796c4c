use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Resilient chunked summarization of timestamped transcripts.
///
/// Provider credentials and pipeline thresholds come from the environment
/// (`.env` is loaded if present); a TOML file can override pipeline settings.
#[derive(Parser, Debug)]
#[command(name = "notewise", version, about = "Turn long transcripts into one coherent note")]
pub struct CliArgs {
    /// Config profile; keys resolve as {PROFILE}_{KEY} before {KEY}
    #[arg(long, env = "NOTEWISE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Pipeline config overlay (default: ~/.config/notewise/pipeline.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// LLM provider override: openai, anthropic, or ollama
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model name override for the selected provider
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Summarize a JSON source request into a Markdown document
    Summarize(SummarizeArgs),
    /// Send a minimal request to verify provider connectivity and credentials
    Check,
    /// Show how a request would be split, without calling the provider
    Plan(PlanArgs),
}

#[derive(Args, Debug)]
pub struct SummarizeArgs {
    /// Source request JSON file, or `-` for stdin
    pub input: PathBuf,

    /// Write the document here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum chunks in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Shared request budget per minute across all chunks
    #[arg(long)]
    pub requests_per_minute: Option<u32>,

    /// Abort the whole run after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Do not retry a failed single request in chunked mode
    #[arg(long)]
    pub no_fallback: bool,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Source request JSON file, or `-` for stdin
    pub input: PathBuf,
}
