use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.as_str(), "true" | "1"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `NOTEWISE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("NOTEWISE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            llm: LlmConfig::from_env_profiled(p),
            pipeline: PipelineConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  llm:       provider={}, model={}, configured={}",
            self.llm.provider,
            self.llm.model(),
            self.llm.is_configured()
        );
        tracing::info!(
            "  pipeline:  chunk={} segs, content={} chars, payload={} bytes, retries={}, concurrency={}",
            self.pipeline.max_segments_per_chunk,
            self.pipeline.max_content_length,
            self.pipeline.max_payload_bytes,
            self.pipeline.max_retries,
            self.pipeline.concurrency
        );
    }
}

// ── LLM (OpenAI-compatible / Anthropic / Ollama) ──────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai", "anthropic", "ollama"
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-call timeout; expiry is reported as a timeout-class failure.
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "openai"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            ollama_url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            ollama_model: profiled_env_or(p, "OLLAMA_MODEL", "llama3.2"),
            temperature: profiled_env_parse(p, "LLM_TEMPERATURE", 0.7),
            max_tokens: profiled_env_parse(p, "LLM_MAX_TOKENS", 4096),
            request_timeout_secs: profiled_env_parse(p, "LLM_REQUEST_TIMEOUT_SECS", 120),
        }
    }

    /// Model id of the active provider.
    pub fn model(&self) -> &str {
        match self.provider.as_str() {
            "anthropic" | "claude" => &self.anthropic_model,
            "ollama" => &self.ollama_model,
            _ => &self.openai_model,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.is_some(),
            "anthropic" | "claude" => self.anthropic_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }
}

// ── Summarization pipeline ────────────────────────────────────

/// Thresholds and retry policy of the chunked summarization pipeline.
///
/// Every field has a default, so a partial TOML overlay only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Segments above this count force chunked mode.
    pub max_segments_per_chunk: usize,
    /// Prompt text cap in characters; longer text is elided in the middle.
    pub max_content_length: usize,
    /// Serialized single-shot payload above this size re-routes to chunked mode.
    pub max_payload_bytes: usize,
    /// Images past this count are dropped.
    pub max_images: usize,
    /// Attempts per external call, including the first.
    pub max_retries: u32,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
    /// Abort chunk processing once `failed / chunk_count` exceeds this.
    pub max_failed_chunks_ratio: f64,
    /// In-flight chunk requests; 1 processes chunks strictly in order.
    pub concurrency: usize,
    /// Shared request budget across all calls of one pipeline.
    pub requests_per_minute: Option<u32>,
    /// Retry a failed single-shot call through the chunked path.
    pub fallback_to_chunks: bool,
    /// Overall wall-clock budget for one summarization.
    pub deadline_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_segments_per_chunk: 250,
            max_content_length: 30_000,
            max_payload_bytes: 100_000,
            max_images: 5,
            max_retries: 5,
            base_delay_secs: 2.0,
            max_delay_secs: 60.0,
            max_failed_chunks_ratio: 0.3,
            concurrency: 1,
            requests_per_minute: None,
            fallback_to_chunks: true,
            deadline_secs: None,
        }
    }
}

impl PipelineConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            max_segments_per_chunk: profiled_env_parse(
                p,
                "SUMMARY_MAX_SEGMENTS_PER_CHUNK",
                d.max_segments_per_chunk,
            ),
            max_content_length: profiled_env_parse(
                p,
                "SUMMARY_MAX_CONTENT_LENGTH",
                d.max_content_length,
            ),
            max_payload_bytes: profiled_env_parse(
                p,
                "SUMMARY_MAX_PAYLOAD_BYTES",
                d.max_payload_bytes,
            ),
            max_images: profiled_env_parse(p, "SUMMARY_MAX_IMAGES", d.max_images),
            max_retries: profiled_env_parse(p, "SUMMARY_MAX_RETRIES", d.max_retries),
            base_delay_secs: profiled_env_parse(p, "SUMMARY_BASE_DELAY_SECS", d.base_delay_secs),
            max_delay_secs: profiled_env_parse(p, "SUMMARY_MAX_DELAY_SECS", d.max_delay_secs),
            max_failed_chunks_ratio: profiled_env_parse(
                p,
                "SUMMARY_MAX_FAILED_CHUNKS_RATIO",
                d.max_failed_chunks_ratio,
            ),
            concurrency: profiled_env_parse(p, "SUMMARY_CONCURRENCY", d.concurrency),
            requests_per_minute: profiled_env_opt(p, "SUMMARY_REQUESTS_PER_MINUTE")
                .and_then(|v| v.parse().ok()),
            fallback_to_chunks: profiled_env_bool(
                p,
                "SUMMARY_FALLBACK_TO_CHUNKS",
                d.fallback_to_chunks,
            ),
            deadline_secs: profiled_env_opt(p, "SUMMARY_DEADLINE_SECS")
                .and_then(|v| v.parse().ok()),
        }
    }

    pub fn base_delay(&self) -> Duration {
        secs_to_duration(self.base_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        secs_to_duration(self.max_delay_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Apply the keys present in a TOML document on top of `self`.
    pub fn overlay_toml(&self, text: &str) -> Result<Self, ConfigError> {
        let overlay: toml::Table = text.parse()?;
        let mut base = match toml::Value::try_from(self) {
            Ok(toml::Value::Table(table)) => table,
            Ok(_) => return Err(ConfigError::Invalid("pipeline config is not a table".into())),
            Err(e) => {
                return Err(ConfigError::Invalid(format!(
                    "cannot serialize pipeline config: {e}"
                )))
            }
        };
        base.extend(overlay);
        let merged: Self = toml::Value::Table(base).try_into()?;
        Ok(merged)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_segments_per_chunk == 0 {
            return Err(ConfigError::Invalid("max_segments_per_chunk must be positive".into()));
        }
        if self.max_content_length == 0 {
            return Err(ConfigError::Invalid("max_content_length must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.max_failed_chunks_ratio) {
            return Err(ConfigError::Invalid(format!(
                "max_failed_chunks_ratio must be within [0, 1], got {}",
                self.max_failed_chunks_ratio
            )));
        }
        if !self.base_delay_secs.is_finite()
            || !self.max_delay_secs.is_finite()
            || self.base_delay_secs < 0.0
            || self.base_delay_secs > self.max_delay_secs
        {
            return Err(ConfigError::Invalid(format!(
                "base_delay_secs ({}) must be non-negative and not exceed max_delay_secs ({})",
                self.base_delay_secs, self.max_delay_secs
            )));
        }
        if self.max_delay_secs > MAX_BACKOFF_SECS {
            return Err(ConfigError::Invalid(format!(
                "max_delay_secs must not exceed {}, got {}",
                MAX_BACKOFF_SECS, self.max_delay_secs
            )));
        }
        if let Some(deadline) = self.deadline_secs.filter(|d| *d > MAX_DEADLINE_SECS) {
            return Err(ConfigError::Invalid(format!(
                "deadline_secs must not exceed {}, got {}",
                MAX_DEADLINE_SECS, deadline
            )));
        }
        if self.requests_per_minute == Some(0) {
            return Err(ConfigError::Invalid(
                "requests_per_minute must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

/// Upper bound for a single backoff sleep: one day.
pub const MAX_BACKOFF_SECS: f64 = 86_400.0;
/// Upper bound for a run deadline: thirty days.
pub const MAX_DEADLINE_SECS: u64 = 30 * 86_400;

/// Out-of-range values saturate instead of panicking.
fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}
