use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notewise_core::config::load_dotenv;
use notewise_core::{Config, PipelineConfig, SourceRequest};
use tracing::debug;

use crate::cli::{CliArgs, SummarizeArgs};

/// Return the default config directory path: ~/.config/notewise/
pub fn default_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("could not determine user config directory")?
        .join("notewise");
    Ok(config_dir)
}

/// Environment config with profile, provider/model flags and the TOML overlay applied.
pub fn load(args: &CliArgs) -> Result<Config> {
    load_dotenv();
    let mut config = match &args.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };

    if let Some(provider) = &args.provider {
        config.llm.provider = provider.to_lowercase();
    }
    if let Some(model) = &args.model {
        set_model(&mut config, model);
    }

    let overlay_path = match &args.config {
        Some(path) => Some(path.clone()),
        None => default_config_dir()
            .ok()
            .map(|dir| dir.join("pipeline.toml"))
            .filter(|path| path.exists()),
    };
    if let Some(path) = overlay_path {
        config.pipeline = overlay_file(&config.pipeline, &path)?;
    }

    config
        .pipeline
        .validate()
        .context("invalid pipeline configuration")?;
    Ok(config)
}

/// Apply a TOML file on top of `base`.
pub fn overlay_file(base: &PipelineConfig, path: &Path) -> Result<PipelineConfig> {
    debug!(config_path = %path.display(), "Loading pipeline overlay");
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    base.overlay_toml(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

/// Per-run flags of `summarize` override everything else.
pub fn apply_summarize_flags(
    mut pipeline: PipelineConfig,
    cmd: &SummarizeArgs,
) -> Result<PipelineConfig> {
    if let Some(concurrency) = cmd.concurrency {
        pipeline.concurrency = concurrency;
    }
    if let Some(rpm) = cmd.requests_per_minute {
        pipeline.requests_per_minute = Some(rpm);
    }
    if let Some(deadline) = cmd.deadline_secs {
        pipeline.deadline_secs = Some(deadline);
    }
    if cmd.no_fallback {
        pipeline.fallback_to_chunks = false;
    }
    pipeline
        .validate()
        .context("invalid pipeline configuration")?;
    Ok(pipeline)
}

fn set_model(config: &mut Config, model: &str) {
    let llm = &mut config.llm;
    match llm.provider.as_str() {
        "anthropic" | "claude" => llm.anthropic_model = model.to_string(),
        "ollama" => llm.ollama_model = model.to_string(),
        _ => llm.openai_model = model.to_string(),
    }
}

/// Read a [`SourceRequest`] from a JSON file, or stdin for `-`.
pub fn read_request(path: &Path) -> Result<SourceRequest> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request: {}", path.display()))?
    };
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse request: {}", path.display()))
}
