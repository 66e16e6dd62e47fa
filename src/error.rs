//! Error types for the approval service.

use std::time::Duration;

/// Top-level error type for process startup and wiring.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("LLM capability unavailable: {reason}")]
    NotConfigured { reason: String },
}

/// Errors surfaced by the request gateway to its callers.
///
/// Each variant maps to one HTTP status in `gateway::routes`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The caller sent something the workflow cannot accept.
    #[error("{0}")]
    InvalidInput(String),

    /// The workflow finished in the `Error` status.
    #[error("{0}")]
    Processing(String),

    #[error("Approval workflow did not finish within {0:?}")]
    Timeout(Duration),

    /// Unexpected fault (e.g. a panicked workflow task). Detail stays server-side.
    #[error("An unexpected error occurred.")]
    Internal,
}
