//! Failure-absorbing adapter over the provider backends
//!
//! The pipeline never sees a `ProviderError` from a base or synthesizer
//! generation: the adapter converts every failure into a sealed
//! [`ProviderResult`] whose `failed` flag is the single authoritative
//! branch signal. A human-readable marker is appended so logs and batch
//! records show the failure inline, but no code path inspects text to
//! decide anything.

use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tandem_config::ProviderId;
use tandem_utils::error::ProviderError;

use crate::types::{ProviderBackend, ProviderInvocation};

/// Accumulated output of one provider invocation.
///
/// Created empty, appended to as fragments arrive, and sealed on error.
/// Once sealed the text is frozen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResult {
    text: String,
    failed: bool,
}

impl ProviderResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an already-complete successful result (used by batch mode).
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            failed: false,
        }
    }

    /// Append a fragment. No-op once sealed.
    pub fn append(&mut self, fragment: &str) {
        if !self.failed {
            self.text.push_str(fragment);
        }
    }

    /// Seal this result as failed, freezing the text after the marker.
    pub fn seal_failed(&mut self, marker: &str) {
        if !self.failed {
            self.text.push_str(marker);
            self.failed = true;
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        self.failed
    }
}

/// Human-readable marker surfaced in place of missing content.
fn failure_marker(provider: ProviderId, model: &str, err: &ProviderError) -> String {
    format!("[{provider} {model} request failed: {err}]")
}

/// Uniform entry point for one concrete provider.
///
/// Wraps a backend together with its dispatch tag; `generate` and
/// `generate_streaming` absorb every error into the returned result.
#[derive(Clone)]
pub struct ProviderAdapter {
    provider: ProviderId,
    backend: Arc<dyn ProviderBackend>,
}

impl ProviderAdapter {
    #[must_use]
    pub fn new(provider: ProviderId, backend: Arc<dyn ProviderBackend>) -> Self {
        Self { provider, backend }
    }

    #[must_use]
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// One-shot generation. All failures are absorbed into the result.
    pub async fn generate(&self, inv: ProviderInvocation) -> ProviderResult {
        let model = inv.model.clone();
        let mut result = ProviderResult::new();

        match self.backend.invoke(inv).await {
            Ok(reply) => result.append(&reply.text),
            Err(err) => {
                warn!(provider = %self.provider, model = %model, error = %err, "Provider invocation failed");
                result.seal_failed(&failure_marker(self.provider, &model, &err));
            }
        }

        result
    }

    /// Streaming generation. Each fragment is passed to `on_chunk` as it
    /// arrives and accumulated into the result; on failure the marker is
    /// emitted through `on_chunk` too, so the caller-visible stream shows
    /// the failure inline.
    pub async fn generate_streaming<F>(
        &self,
        inv: ProviderInvocation,
        mut on_chunk: F,
    ) -> ProviderResult
    where
        F: FnMut(&str),
    {
        let model = inv.model.clone();
        let mut result = ProviderResult::new();

        let mut stream = match self.backend.invoke_streaming(inv).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(provider = %self.provider, model = %model, error = %err, "Provider stream setup failed");
                let marker = failure_marker(self.provider, &model, &err);
                on_chunk(&marker);
                result.seal_failed(&marker);
                return result;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    on_chunk(&fragment);
                    result.append(&fragment);
                }
                Err(err) => {
                    warn!(provider = %self.provider, model = %model, error = %err, "Provider stream failed mid-sequence");
                    let marker = failure_marker(self.provider, &model, &err);
                    on_chunk(&marker);
                    result.seal_failed(&marker);
                    break;
                }
            }
        }

        result
    }
}

/// The two concrete backends, keyed by dispatch tag.
#[derive(Clone)]
pub struct BackendSet {
    openai: Arc<dyn ProviderBackend>,
    gemini: Arc<dyn ProviderBackend>,
}

impl BackendSet {
    /// Assemble a backend set from already-constructed backends.
    ///
    /// Test suites inject scripted mocks here.
    #[must_use]
    pub fn new(openai: Arc<dyn ProviderBackend>, gemini: Arc<dyn ProviderBackend>) -> Self {
        Self { openai, gemini }
    }

    /// Construct both HTTP backends from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Misconfiguration` if either backend cannot
    /// be built (missing API key environment variable, bad endpoint).
    pub fn from_config(config: &tandem_config::Config) -> Result<Self, ProviderError> {
        let openai = crate::OpenAiBackend::new_from_config(config)?;
        let gemini = crate::GeminiBackend::new_from_config(config)?;
        Ok(Self::new(Arc::new(openai), Arc::new(gemini)))
    }

    /// The raw backend for a provider tag (classifier calls go here; their
    /// errors must escalate, not be absorbed).
    #[must_use]
    pub fn backend(&self, provider: ProviderId) -> Arc<dyn ProviderBackend> {
        match provider {
            ProviderId::OpenAi => Arc::clone(&self.openai),
            ProviderId::Gemini => Arc::clone(&self.gemini),
        }
    }

    /// A failure-absorbing adapter for a provider tag.
    #[must_use]
    pub fn adapter(&self, provider: ProviderId) -> ProviderAdapter {
        ProviderAdapter::new(provider, self.backend(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProviderReply, TextStream};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Scripted backend: a fixed sequence of fragments, optionally
    /// followed by a failure.
    struct ScriptedBackend {
        fragments: Vec<String>,
        fail_after: bool,
        fail_setup: bool,
    }

    #[async_trait]
    impl ProviderBackend for ScriptedBackend {
        async fn invoke(&self, _inv: ProviderInvocation) -> Result<ProviderReply, ProviderError> {
            if self.fail_setup || self.fail_after {
                return Err(ProviderError::Transport("scripted failure".to_string()));
            }
            Ok(ProviderReply::new(
                self.fragments.concat(),
                "scripted",
                "test-model",
            ))
        }

        async fn invoke_streaming(
            &self,
            _inv: ProviderInvocation,
        ) -> Result<TextStream, ProviderError> {
            if self.fail_setup {
                return Err(ProviderError::Transport("scripted setup failure".to_string()));
            }
            let mut items: Vec<Result<String, ProviderError>> =
                self.fragments.iter().cloned().map(Ok).collect();
            if self.fail_after {
                items.push(Err(ProviderError::Transport(
                    "scripted mid-stream failure".to_string(),
                )));
            }
            Ok(Box::pin(futures_util::stream::iter(items)))
        }
    }

    fn adapter(backend: ScriptedBackend) -> ProviderAdapter {
        ProviderAdapter::new(ProviderId::OpenAi, Arc::new(backend))
    }

    fn inv() -> ProviderInvocation {
        ProviderInvocation::new("test-model", Duration::from_secs(5), vec![])
    }

    #[tokio::test]
    async fn test_streaming_concatenation_matches_chunks() {
        let a = adapter(ScriptedBackend {
            fragments: vec!["Hel".to_string(), "lo ".to_string(), "world".to_string()],
            fail_after: false,
            fail_setup: false,
        });

        let mut seen = Vec::new();
        let result = a.generate_streaming(inv(), |c| seen.push(c.to_string())).await;

        assert!(!result.failed());
        assert_eq!(result.text(), "Hello world");
        assert_eq!(seen.concat(), "Hello world");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_seals_result() {
        let a = adapter(ScriptedBackend {
            fragments: vec!["partial".to_string()],
            fail_after: true,
            fail_setup: false,
        });

        let mut seen = Vec::new();
        let result = a.generate_streaming(inv(), |c| seen.push(c.to_string())).await;

        assert!(result.failed());
        assert!(result.text().starts_with("partial"));
        assert!(result.text().contains("request failed"));
        // The marker was also surfaced to the chunk consumer
        assert!(seen.last().unwrap().contains("request failed"));
    }

    #[tokio::test]
    async fn test_setup_failure_seals_result() {
        let a = adapter(ScriptedBackend {
            fragments: vec![],
            fail_after: false,
            fail_setup: true,
        });

        let result = a.generate_streaming(inv(), |_| {}).await;

        assert!(result.failed());
        assert!(result.text().contains("scripted setup failure"));
    }

    #[tokio::test]
    async fn test_one_shot_failure_absorbed() {
        let a = adapter(ScriptedBackend {
            fragments: vec![],
            fail_after: true,
            fail_setup: false,
        });

        let result = a.generate(inv()).await;
        assert!(result.failed());
    }

    #[test]
    fn test_sealed_result_is_frozen() {
        let mut result = ProviderResult::new();
        result.append("before");
        result.seal_failed(" [failed]");
        result.append(" after");
        result.seal_failed(" again");

        assert_eq!(result.text(), "before [failed]");
        assert!(result.failed());
    }
}
