//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmConfig;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default model for stage replies and summaries.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Process-wide intake configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Model identifier sent to the provider.
    pub model: String,
    /// Base URL of the chat-completions API.
    pub api_base: String,
    /// Provider API key.
    pub api_key: SecretString,
    /// Upper bound for a single collaborator call.
    pub turn_timeout: Duration,
    /// Sampling temperature for stage replies.
    pub temperature: f32,
    /// Max tokens per collaborator reply.
    pub max_tokens: u32,
    /// Tool-acknowledgment detours allowed within one user turn.
    pub max_tool_round_trips: u32,
    /// Directory of `Prompt_NNNN_<Name>.md` stage instructions, if any.
    pub prompts_dir: Option<PathBuf>,
}

impl IntakeConfig {
    /// Build config from environment variables.
    ///
    /// The API key comes from `OPENAI_API_KEY`, falling back to the file
    /// named by `INTAKE_API_KEY_FILE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key.trim().to_string(),
            _ => match std::env::var("INTAKE_API_KEY_FILE") {
                Ok(path) => read_key_file(&path)?,
                Err(_) => {
                    return Err(ConfigError::MissingRequired {
                        key: "OPENAI_API_KEY".into(),
                        hint: "Set OPENAI_API_KEY or point INTAKE_API_KEY_FILE at a key file."
                            .into(),
                    });
                }
            },
        };

        let model = std::env::var("INTAKE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let api_base =
            std::env::var("INTAKE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        let defaults = Self::with_api_key(SecretString::from(api_key));

        Ok(Self {
            model,
            api_base,
            turn_timeout: Duration::from_secs(env_parse(
                "INTAKE_TURN_TIMEOUT_SECS",
                defaults.turn_timeout.as_secs(),
            )?),
            temperature: env_parse("INTAKE_TEMPERATURE", defaults.temperature)?,
            max_tokens: env_parse("INTAKE_MAX_TOKENS", defaults.max_tokens)?,
            max_tool_round_trips: env_parse(
                "INTAKE_MAX_TOOL_ROUND_TRIPS",
                defaults.max_tool_round_trips,
            )?,
            prompts_dir: std::env::var("INTAKE_PROMPTS_DIR").ok().map(PathBuf::from),
            ..defaults
        })
    }

    /// Defaults for everything but the key.
    pub fn with_api_key(api_key: SecretString) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key,
            turn_timeout: Duration::from_secs(60),
            temperature: 0.0,
            max_tokens: 1024,
            max_tool_round_trips: 2,
            prompts_dir: None,
        }
    }

    /// Provider settings derived from this config.
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
        }
    }
}

fn read_key_file(path: &str) -> Result<String, ConfigError> {
    let key = std::fs::read_to_string(path)?.trim().to_string();
    if key.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "INTAKE_API_KEY_FILE".into(),
            message: format!("{path} is empty"),
        });
    }
    Ok(key)
}

/// Parse an optional env var, keeping `default` when it is unset.
fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
        Err(_) => Ok(default),
    }
}
