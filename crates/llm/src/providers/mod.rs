pub mod claude;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

use notewise_core::config::LlmConfig;

use crate::provider::{LlmError, LlmProvider};

/// Create the appropriate LLM provider based on config.
pub fn create_provider(llm_config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let timeout = llm_config.request_timeout();
    match llm_config.provider.as_str() {
        "openai" => {
            let api_key = llm_config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY not set".into()))?;
            let base_url = llm_config
                .openai_base_url
                .as_deref()
                .unwrap_or("https://api.openai.com");
            Ok(Arc::new(
                openai::OpenAiProvider::new(
                    api_key.clone(),
                    llm_config.openai_model.clone(),
                    base_url.to_string(),
                )
                .with_timeout(timeout)?,
            ))
        }
        "anthropic" | "claude" => {
            let api_key = llm_config
                .anthropic_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;
            Ok(Arc::new(
                claude::ClaudeProvider::new(api_key.clone(), llm_config.anthropic_model.clone())
                    .with_timeout(timeout)?,
            ))
        }
        "ollama" => Ok(Arc::new(
            ollama::OllamaProvider::new(
                llm_config.ollama_url.clone(),
                llm_config.ollama_model.clone(),
            )
            .with_timeout(timeout)?,
        )),
        other => Err(LlmError::NotConfigured(format!(
            "unknown LLM provider: '{}'",
            other
        ))),
    }
}
