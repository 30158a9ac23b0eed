//! Gemini HTTP backend implementation
//!
//! Speaks the generateContent wire schema: conversation turns are
//! role/parts pairs, system text travels in a separate systemInstruction
//! field, and the assistant role is named "model". Streaming uses the
//! `streamGenerateContent` endpoint with SSE framing.

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

/// Default Gemini API endpoint root
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini backend configuration
#[derive(Clone)]
pub(crate) struct GeminiBackend {
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

impl GeminiBackend {
    /// Create a new Gemini backend
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

    /// Create a new Gemini backend from configuration
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Misconfiguration` if the API key environment
    /// variable is not set or the HTTP client cannot be constructed
    pub fn new_from_config(config: &tandem_config::Config) -> Result<Self, ProviderError> {
        let section = config.llm.gemini.as_ref();

        let api_key_env = section
            .and_then(|s| s.api_key_env.as_deref())
            .unwrap_or("GEMINI_API_KEY");

        let api_key = std::env::var(api_key_env).map_err(|_| {
            ProviderError::Misconfiguration(format!(
                "Gemini API key not found in environment variable '{api_key_env}'. \
                 Please set this variable or configure a different api_key_env in [llm.gemini]."
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

        Self::new(
            api_key,
            base_url,
            "gemini-2.0-flash".to_string(),
            default_params,
        )
    }

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

    /// Convert neutral messages to the generateContent format
    ///
    /// System messages are concatenated into the systemInstruction field;
    /// user and assistant turns become role/parts contents, with the
    /// assistant role mapped to "model".
    fn convert_messages(messages: &[Message]) -> (Option<GeminiContent>, Vec<GeminiContent>) {
        let mut system_text: Option<String> = None;
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    if let Some(existing) = system_text.as_mut() {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    } else {
                        system_text = Some(msg.content.clone());
                    }
                }
                Role::User => contents.push(GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![GeminiPart {
                        text: msg.content.clone(),
                    }],
                }),
                Role::Assistant => contents.push(GeminiContent {
                    role: Some("model".to_string()),
                    parts: vec![GeminiPart {
                        text: msg.content.clone(),
                    }],
                }),
            }
        }

        let system_instruction = system_text.map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart { text }],
        });

        (system_instruction, contents)
    }

    fn build_request(&self, inv: &ProviderInvocation) -> (String, GeminiRequest) {
        let (model, params) = self.resolve_params(inv);
        let (system_instruction, contents) = Self::convert_messages(&inv.messages);

        let body = GeminiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                max_output_tokens: params.max_tokens,
                temperature: params.temperature,
            },
        };

        (model, body)
    }

    fn endpoint(&self, model: &str, streaming: bool) -> String {
        if streaming {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, model
            )
        } else {
            format!("{}/models/{}:generateContent", self.base_url, model)
        }
    }

    /// Join the text parts of the first candidate, if any.
    fn candidate_text(response: &GeminiResponse) -> Option<String> {
        let content = response.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        Some(text)
    }
}

#[async_trait]
impl ProviderBackend for GeminiBackend {
    async fn invoke(&self, inv: ProviderInvocation) -> Result<ProviderReply, ProviderError> {
        let (model, request_body) = self.build_request(&inv);

        debug!(
            provider = "gemini",
            model = %model,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Gemini backend"
        );

        let request = self
            .client
            .post(&self.endpoint(&model, false))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, "gemini")
            .await?;

        let response_body: GeminiResponse = response.json().await.map_err(|e| {
            ProviderError::Transport(format!("Failed to parse Gemini response: {e}"))
        })?;

        let content = Self::candidate_text(&response_body).ok_or_else(|| {
            ProviderError::MalformedResponse(
                "Gemini response missing candidates[0].content".to_string(),
            )
        })?;

        let mut reply = ProviderReply::new(content, "gemini", model);
        if let Some(usage) = response_body.usage_metadata {
            reply = reply.with_tokens(
                usage.prompt_token_count.unwrap_or(0),
                usage.candidates_token_count.unwrap_or(0),
            );
        }

        debug!(
            provider = "gemini",
            tokens_input = ?reply.tokens_input,
            tokens_output = ?reply.tokens_output,
            "Gemini invocation completed"
        );

        Ok(reply)
    }

    async fn invoke_streaming(&self, inv: ProviderInvocation) -> Result<TextStream, ProviderError> {
        let (model, request_body) = self.build_request(&inv);

        debug!(
            provider = "gemini",
            model = %model,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Gemini backend (streaming)"
        );

        let request = self
            .client
            .post(&self.endpoint(&model, true))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, "gemini")
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
                                "gemini stream: {e}"
                            ))))
                            .await;
                        return;
                    }
                };

                for payload in parser.feed(&bytes) {
                    match serde_json::from_str::<GeminiResponse>(&payload) {
                        Ok(chunk) => {
                            let fragment = Self::candidate_text(&chunk).unwrap_or_default();
                            if !fragment.is_empty() && tx.send(Ok(fragment)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Err(ProviderError::MalformedResponse(format!(
                                    "gemini stream chunk: {e}"
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

/// One content block: a role plus ordered text parts
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

/// Request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

/// Response body (shared by one-shot and per-SSE-chunk payloads)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}
