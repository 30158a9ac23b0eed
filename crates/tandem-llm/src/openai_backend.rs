//! OpenAI-compatible HTTP backend implementation
//!
//! Speaks the chat-completions wire schema: conversation turns are
//! role/content pairs, streaming responses arrive as SSE deltas
//! terminated by a `[DONE]` sentinel.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use tandem_utils::error::ProviderError;

use crate::http_client::HttpClient;
use crate::sse::SseParser;
use crate::types::{Message, ProviderBackend, ProviderInvocation, ProviderReply, Role, TextStream};

/// Default OpenAI API endpoint
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Streaming sentinel closing an SSE response
const DONE_SENTINEL: &str = "[DONE]";

/// OpenAI backend configuration
#[derive(Clone)]
pub(crate) struct OpenAiBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

/// HTTP request parameters
#[derive(Debug, Clone)]
pub(crate) struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

impl OpenAiBackend {
    /// Create a new OpenAI backend
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Misconfiguration` if the HTTP client cannot
    /// be constructed
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        default_model: String,
        default_params: HttpParams,
    ) -> Result<Self, ProviderError> {
        let client = HttpClient::new()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model,
            default_params,
        })
    }

    /// Create a new OpenAI backend from configuration
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Misconfiguration` if the API key environment
    /// variable is not set or the HTTP client cannot be constructed
    pub fn new_from_config(config: &tandem_config::Config) -> Result<Self, ProviderError> {
        let section = config.llm.openai.as_ref();

        let api_key_env = section
            .and_then(|s| s.api_key_env.as_deref())
            .unwrap_or("OPENAI_API_KEY");

        let api_key = std::env::var(api_key_env).map_err(|_| {
            ProviderError::Misconfiguration(format!(
                "OpenAI API key not found in environment variable '{api_key_env}'. \
                 Please set this variable or configure a different api_key_env in [llm.openai]."
            ))
        })?;

        let base_url = section.and_then(|s| s.base_url.clone());

        let defaults = HttpParams::default();
        let default_params = HttpParams {
            max_tokens: section
                .and_then(|s| s.max_tokens)
                .unwrap_or(defaults.max_tokens),
            temperature: section
                .and_then(|s| s.temperature)
                .unwrap_or(defaults.temperature),
        };

        // The model per call comes from the pipeline table; the backend
        // default only covers invocations that leave it empty.
        Self::new(api_key, base_url, "gpt-4o".to_string(), default_params)
    }

    /// Resolve parameters for this invocation
    ///
    /// `inv.model`, `inv.max_tokens` and `inv.temperature` override the
    /// backend defaults; unspecified values fall back.
    fn resolve_params(&self, inv: &ProviderInvocation) -> (String, HttpParams) {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };

        let params = HttpParams {
            max_tokens: inv.max_tokens.unwrap_or(self.default_params.max_tokens),
            temperature: inv.temperature.unwrap_or(self.default_params.temperature),
        };

        (model, params)
    }

    /// Convert neutral messages to the chat-completions format
    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|msg| OpenAiMessage {
                role: match msg.role {
                    Role::System => "system".to_string(),
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: msg.content.clone(),
            })
            .collect()
    }

    fn build_request(&self, inv: &ProviderInvocation, stream: bool) -> (String, OpenAiRequest) {
        let (model, params) = self.resolve_params(inv);

        let body = OpenAiRequest {
            model: model.clone(),
            messages: Self::convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream,
        };

        (model, body)
    }
}

#[async_trait]
impl ProviderBackend for OpenAiBackend {
    async fn invoke(&self, inv: ProviderInvocation) -> Result<ProviderReply, ProviderError> {
        let (model, request_body) = self.build_request(&inv, false);

        debug!(
            provider = "openai",
            model = %model,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking OpenAI backend"
        );

        let request = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, "openai")
            .await?;

        let response_body: OpenAiResponse = response.json().await.map_err(|e| {
            ProviderError::Transport(format!("Failed to parse OpenAI response: {e}"))
        })?;

        let choice = response_body.choices.first().ok_or_else(|| {
            ProviderError::MalformedResponse("OpenAI response missing choices[0]".to_string())
        })?;

        let content = choice.message.content.clone().ok_or_else(|| {
            ProviderError::MalformedResponse(
                "OpenAI response missing content in choices[0]".to_string(),
            )
        })?;

        let mut reply = ProviderReply::new(content, "openai", model);
        if let Some(usage) = response_body.usage {
            reply = reply.with_tokens(usage.prompt_tokens, usage.completion_tokens);
        }

        debug!(
            provider = "openai",
            tokens_input = ?reply.tokens_input,
            tokens_output = ?reply.tokens_output,
            "OpenAI invocation completed"
        );

        Ok(reply)
    }

    async fn invoke_streaming(&self, inv: ProviderInvocation) -> Result<TextStream, ProviderError> {
        let (model, request_body) = self.build_request(&inv, true);

        debug!(
            provider = "openai",
            model = %model,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking OpenAI backend (streaming)"
        );

        let request = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, "openai")
            .await?;

        let (tx, rx) = mpsc::channel::<Result<String, ProviderError>>(32);

        tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut body = response.bytes_stream();

            while let Some(chunk) = body.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::Transport(format!(
                                "openai stream: {e}"
                            ))))
                            .await;
                        return;
                    }
                };

                for payload in parser.feed(&bytes) {
                    if payload == DONE_SENTINEL {
                        return;
                    }
                    match serde_json::from_str::<OpenAiStreamChunk>(&payload) {
                        Ok(chunk) => {
                            let fragment = chunk
                                .choices
                                .first()
                                .and_then(|c| c.delta.content.clone())
                                .unwrap_or_default();
                            if !fragment.is_empty() && tx.send(Ok(fragment)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Err(ProviderError::MalformedResponse(format!(
                                    "openai stream chunk: {e}"
                                ))))
                                .await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Chat-completions message format for requests
#[derive(Debug, Clone, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

/// Chat-completions message format for responses
#[derive(Debug, Clone, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

/// Request body
#[derive(Debug, Clone, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

/// Response body
#[derive(Debug, Clone, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

/// Choice in a non-streaming response
#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: OpenAiResponseMessage,
}

/// Incremental choice delta in a streaming response
#[derive(Debug, Clone, Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
