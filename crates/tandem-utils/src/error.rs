//! Error taxonomy shared across the tandem crates.
//!
//! Three layers, matching the pipeline's failure semantics:
//!
//! | Type | Scope | Visibility |
//! |------|-------|------------|
//! | `ConfigError` | startup configuration | rejected before any request |
//! | `ProviderError` | one backend invocation | absorbed at the adapter boundary |
//! | `EngineError` | whole-request pipeline | surfaces to the caller |
//!
//! A `ProviderError` never crosses into the pipeline as a request-fatal
//! error: the adapter converts it into a sealed failed result and the
//! orchestrator degrades. Only an empty prompt, a classifier failure, or
//! an internal invariant violation becomes an `EngineError`.

use thiserror::Error;

/// Configuration file or value errors, reported at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },
}

/// Failures from a single provider invocation.
///
/// Constructed only inside `tandem-llm`; downstream code branches on the
/// sealed result flag, never on error text.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Network-level failure: connect, TLS, body read, JSON decode.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success HTTP status.
    #[error("Provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// Missing API key, bad endpoint, unusable defaults.
    #[error("Provider misconfiguration: {0}")]
    Misconfiguration(String),

    /// The backend answered 2xx but the body did not carry any text.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Request-level pipeline errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// User error: rejected before any provider call.
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    /// Request-fatal: without an intent no pipeline can be selected.
    #[error("Intent classification failed: {0}")]
    Classifier(#[source] ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Map to a CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> crate::ExitCode {
        match self {
            Self::EmptyPrompt | Self::Config(_) => crate::ExitCode::CLI_ARGS,
            Self::Classifier(_) | Self::Internal(_) => crate::ExitCode::INTERNAL,
        }
    }
}
