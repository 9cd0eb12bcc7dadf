//! LLM integration for the intake assistant.
//!
//! The intake core only talks to the `LlmProvider` trait. The bundled
//! backend speaks the OpenAI chat-completions protocol, which also covers
//! compatible self-hosted servers via a custom API base.

mod costs;
pub mod openai;
pub mod provider;

pub use openai::OpenAiProvider;
pub use provider::*;

use std::sync::Arc;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.model.trim().is_empty() {
        return Err(LlmError::RequestFailed {
            provider: "openai".to_string(),
            reason: "model name is empty".to_string(),
        });
    }
    tracing::info!("Using OpenAI-compatible API (model: {})", config.model);
    Ok(Arc::new(OpenAiProvider::new(
        &config.api_base,
        config.api_key.clone(),
        &config.model,
    )))
}
