mod cli;
mod config;
mod terminal;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use notewise_core::Config;
use notewise_llm::create_provider;
use notewise_pipeline::{
    BackoffPolicy, CancellationToken, ChunkPlanner, ChunkReason, ErrorReporter, FailureReason,
    Payload, PayloadBuilder, PipelineOutcome, RandomJitter, ResilientInvoker, Route, Summarizer,
    TemplatePromptBuilder, TokioSleeper,
};

use crate::cli::{CliArgs, Command, PlanArgs, SummarizeArgs};
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the document.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let terminal = Terminal::new();

    let config = config::load(&args).context("failed to load configuration")?;
    config.log_summary();

    match args.command {
        Command::Summarize(cmd) => summarize(&config, &cmd, &terminal).await,
        Command::Check => check(&config, &terminal).await,
        Command::Plan(cmd) => plan(&config, &cmd, &terminal),
    }
}

async fn summarize(config: &Config, cmd: &SummarizeArgs, terminal: &Terminal) -> Result<()> {
    let request = config::read_request(&cmd.input)?;
    let pipeline = config::apply_summarize_flags(config.pipeline.clone(), cmd)?;

    let provider = create_provider(&config.llm).context("failed to create LLM provider")?;
    terminal.print_banner(provider.provider_name(), config.llm.model(), config.profile_label())?;

    let summarizer = Summarizer::builder(provider)
        .config(pipeline.clone())
        .sampling(config.llm.temperature, config.llm.max_tokens)
        .build()?;

    let cancel = match pipeline.deadline() {
        Some(deadline) => CancellationToken::with_deadline(deadline),
        None => CancellationToken::new(),
    };
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    let outcome = summarizer.summarize_with_cancel(&request, &cancel).await;
    terminal.print_outcome(&outcome)?;

    let text = match outcome {
        PipelineOutcome::TotalFailure(report) => {
            terminal.print_report(&report)?;
            bail!("summarization failed: {}", report.reason);
        }
        other => other.into_result()?,
    };

    match &cmd.output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("failed to write output: {}", path.display()))?;
            info!(path = %path.display(), chars = text.len(), "Document written");
        }
        None => println!("{}", text),
    }
    Ok(())
}

async fn check(config: &Config, terminal: &Terminal) -> Result<()> {
    let provider = create_provider(&config.llm).context("failed to create LLM provider")?;
    terminal.print_banner(provider.provider_name(), config.llm.model(), config.profile_label())?;

    let invoker = ResilientInvoker::new(
        provider,
        1,
        BackoffPolicy::new(config.pipeline.base_delay(), config.pipeline.max_delay()),
        Arc::new(TokioSleeper),
        Arc::new(RandomJitter),
    )
    .with_sampling(0.0, 8);
    let payload = Payload {
        text_block: "Reply with the single word OK.".to_string(),
        images: Vec::new(),
    };

    match invoker
        .invoke(&payload, "connectivity check", &CancellationToken::new())
        .await
    {
        Ok(reply) => {
            terminal.print_ok(&format!("Provider reachable, replied: {}", reply))?;
            Ok(())
        }
        Err(error) => {
            let report =
                ErrorReporter.report(FailureReason::SingleShotFailed, 1, vec![], vec![error]);
            terminal.print_report(&report)?;
            bail!("connectivity check failed");
        }
    }
}

fn plan(config: &Config, cmd: &PlanArgs, terminal: &Terminal) -> Result<()> {
    let request = config::read_request(&cmd.input)?;
    let pipeline = &config.pipeline;
    let payloads = PayloadBuilder::new(
        Arc::new(TemplatePromptBuilder),
        pipeline.max_content_length,
        pipeline.max_images,
    );
    let planner = ChunkPlanner::new(pipeline.max_segments_per_chunk, pipeline.max_payload_bytes);

    terminal.print_info(&format!(
        "{}: {} segments, {} image(s)",
        request.title,
        request.segments.len(),
        request.image_urls.len()
    ))?;
    match planner.route(&request, &payloads) {
        (Route::SingleShot(payload), _) => terminal.print_ok(&format!(
            "Single request: {} bytes, {} image(s) attached",
            payload.serialized_len(),
            payload.images.len()
        ))?,
        (Route::Chunked(plan), reason) => {
            let reason = match reason {
                Some(ChunkReason::PayloadTooLarge { bytes }) => {
                    format!("payload {} bytes > {}", bytes, pipeline.max_payload_bytes)
                }
                _ => format!(
                    "{} segments > {}",
                    request.segments.len(),
                    pipeline.max_segments_per_chunk
                ),
            };
            terminal.print_plan(&request, &plan, &reason)?
        }
    }
    Ok(())
}
