//! Error types for the intake assistant.

use std::time::Duration;

use uuid::Uuid;

use crate::intake::stage::StageId;

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Stage registry is empty")]
    EmptyRegistry,

    #[error("Duplicate stage identifier {id}")]
    DuplicateStage { id: StageId },

    #[error("Stage {from} names unknown successor {to}")]
    UnknownSuccessor { from: StageId, to: StageId },

    #[error("Stage chain is not linear: {reason}")]
    NonLinearChain { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the text-generation collaborator.
///
/// Transient and per-call: the session is never mutated when one of these
/// is returned, so the same call can be retried.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session and stage errors surfaced by the intake API.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Session {id} not found")]
    SessionNotFound { id: Uuid },

    #[error("Stage {id} not found")]
    StageNotFound { id: StageId },

    #[error("Session {id} already has a turn in flight")]
    Busy { id: Uuid },

    #[error("Session {id} has already finished")]
    Finished { id: Uuid },

    #[error("Session {id} already has messages")]
    AlreadyStarted { id: Uuid },

    #[error(transparent)]
    Service(#[from] LlmError),
}
