//! Core types for the provider backend abstraction

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use tandem_utils::error::ProviderError;

/// Role of a message in a provider conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
}

/// A single message in a provider conversation
///
/// This is the neutral form; each backend converts it to its own wire
/// schema (role/content pairs or role/parts pairs) with a pure mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message (plain UTF-8 text)
    pub content: String,
}

impl Message {
    /// Create a new message
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Input to a provider backend invocation
#[derive(Debug, Clone)]
pub struct ProviderInvocation {
    /// Model to use for this invocation; empty selects the backend default
    pub model: String,
    /// Timeout for this invocation
    pub timeout: Duration,
    /// Ordered list of messages in the conversation
    pub messages: Vec<Message>,
    /// Override for the configured max output tokens
    pub max_tokens: Option<u32>,
    /// Override for the configured sampling temperature
    pub temperature: Option<f32>,
}

impl ProviderInvocation {
    /// Create a new provider invocation
    #[must_use]
    pub fn new(model: impl Into<String>, timeout: Duration, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            timeout,
            messages,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Override max output tokens for this invocation
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Override sampling temperature for this invocation
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Result from a successful provider backend invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReply {
    /// Full response text from the model
    pub text: String,
    /// Provider name (e.g., "openai", "gemini")
    pub provider: String,
    /// Model that was actually used
    pub model_used: String,
    /// Input tokens consumed (if reported)
    pub tokens_input: Option<u64>,
    /// Output tokens generated (if reported)
    pub tokens_output: Option<u64>,
}

impl ProviderReply {
    /// Create a new provider reply
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }

    /// Set token counts
    #[must_use]
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }
}

/// A finite, ordered, non-restartable sequence of text fragments.
///
/// Concatenating every `Ok` fragment in order yields exactly the text the
/// backend produced; an `Err` item terminates the sequence.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

/// Trait for provider backend implementations
///
/// Both HTTP backends implement this trait, allowing the orchestrator to
/// work with any provider without knowing wire-format details.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Invoke the model once and return the full response.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` for transport failures, non-success API
    /// statuses, timeouts, and malformed response bodies.
    async fn invoke(&self, inv: ProviderInvocation) -> Result<ProviderReply, ProviderError>;

    /// Invoke the model in streaming mode.
    ///
    /// The returned stream yields text fragments as the backend produces
    /// them and terminates when the backend signals completion.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the streaming request cannot be
    /// established; mid-stream failures arrive as `Err` items.
    async fn invoke_streaming(&self, inv: ProviderInvocation) -> Result<TextStream, ProviderError>;
}
