//! Request orchestration
//!
//! Drives one request through classify → generate → decide →
//! synthesize → done. The two base generations run as independent
//! concurrent tasks joined before any decision is taken; each owns its
//! own result accumulator exclusively. Every provider-level failure is
//! absorbed into a degraded branch — the whole request fails only when
//! both base providers fail, and even that is reported as a normal
//! terminal event carrying a fatal message.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tandem_config::{Config, ModelRef, PipelineSpec};
use tandem_llm::{
    BackendSet, CachedBackend, Message, ProviderAdapter, ProviderInvocation, ProviderResult,
    ResponseCache,
};
use tandem_utils::error::{EngineError, ProviderError};
use tandem_utils::types::{ChatRole, ChatTurn};

use crate::classify::IntentClassifier;
use crate::events::{EventSink, StreamEvent};
use crate::pipeline::PipelineRegistry;

/// Literal final response when neither base provider produced a draft.
pub const FATAL_BOTH_FAILED: &str =
    "Both base providers failed; no response could be generated.";

/// One generation request. The caller owns the history and supplies it
/// in full; it is never mutated here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Optional hard constraint the final answer must satisfy
    pub constraint: Option<String>,
    /// Full conversation history, oldest first
    pub history: Vec<ChatTurn>,
}

impl GenerateRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            constraint: None,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

/// Which branch the pipeline takes after both base results settle.
///
/// Derived, never stored: a pure function of the two failure flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDecision {
    /// Neither failed: merge both drafts
    Synthesize,
    /// B failed: refine A's draft
    RefineA,
    /// A failed: refine B's draft
    RefineB,
    /// Terminal fatal outcome; no synthesis attempted
    BothFailed,
}

impl FallbackDecision {
    #[must_use]
    pub fn from_flags(a_failed: bool, b_failed: bool) -> Self {
        match (a_failed, b_failed) {
            (false, false) => Self::Synthesize,
            (false, true) => Self::RefineA,
            (true, false) => Self::RefineB,
            (true, true) => Self::BothFailed,
        }
    }

    /// Narration for the fallback log; empty when nothing failed.
    #[must_use]
    pub fn describe(self, pipeline: &PipelineSpec) -> String {
        match self {
            Self::Synthesize => String::new(),
            Self::RefineA => format!(
                "Base model B ({}) failed; the response was refined from base model A ({}).",
                pipeline.base_b, pipeline.base_a
            ),
            Self::RefineB => format!(
                "Base model A ({}) failed; the response was refined from base model B ({}).",
                pipeline.base_a, pipeline.base_b
            ),
            Self::BothFailed => format!(
                "Both base models ({} and {}) failed; no synthesis was attempted.",
                pipeline.base_a, pipeline.base_b
            ),
        }
    }
}

/// Aggregate record returned by batch mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub final_response: String,
    pub provider_a: ProviderResult,
    pub provider_b: ProviderResult,
    pub pipeline_name: String,
    pub fallback_log: String,
    pub classifier_reasoning: String,
    pub completed_at: DateTime<Utc>,
}

/// The per-request state machine over the provider backends.
pub struct Orchestrator {
    backends: BackendSet,
    registry: PipelineRegistry,
    classifier_model: ModelRef,
    request_timeout: Duration,
}

impl Orchestrator {
    /// Assemble an orchestrator from explicit parts (test seam).
    #[must_use]
    pub fn new(
        backends: BackendSet,
        registry: PipelineRegistry,
        classifier_model: ModelRef,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backends,
            registry,
            classifier_model,
            request_timeout,
        }
    }

    /// Build the orchestrator and its HTTP backends from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Misconfiguration` if a backend cannot be
    /// constructed.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        Ok(Self::new(
            BackendSet::from_config(config)?,
            PipelineRegistry::from_config(config),
            config.classifier.clone(),
            config.limits.request_timeout(),
        ))
    }

    /// The history prefix used for prompting context.
    ///
    /// Callers commonly include the just-submitted prompt as the final
    /// user turn of the history they send; that turn is excluded so the
    /// prompt never appears twice in provider input.
    fn context_prefix<'a>(request: &'a GenerateRequest) -> &'a [ChatTurn] {
        match request.history.split_last() {
            Some((last, rest))
                if last.role == ChatRole::User && last.content == request.prompt =>
            {
                rest
            }
            _ => &request.history,
        }
    }

    /// Neutral provider messages for a base generation: translated
    /// history prefix plus the prompt as the final user turn.
    fn base_messages(request: &GenerateRequest, context: &[ChatTurn]) -> Vec<Message> {
        let mut messages: Vec<Message> = context
            .iter()
            .map(|turn| match turn.role {
                ChatRole::User => Message::user(turn.content.clone()),
                ChatRole::Assistant => Message::assistant(turn.content.clone()),
            })
            .collect();
        messages.push(Message::user(request.prompt.clone()));
        messages
    }

    fn invocation(&self, model: &ModelRef, messages: Vec<Message>) -> ProviderInvocation {
        ProviderInvocation::new(model.model.clone(), self.request_timeout, messages)
    }

    fn classifier(&self) -> IntentClassifier {
        IntentClassifier::new(
            self.backends.backend(self.classifier_model.provider),
            self.classifier_model.clone(),
            self.request_timeout,
        )
    }

    /// Adapter for a model, optionally caching one-shot calls (batch).
    fn adapter(&self, model: &ModelRef, cache: Option<&Arc<ResponseCache>>) -> ProviderAdapter {
        let backend = self.backends.backend(model.provider);
        match cache {
            Some(cache) => ProviderAdapter::new(
                model.provider,
                Arc::new(CachedBackend::new(
                    backend,
                    Arc::clone(cache),
                    model.provider.to_string(),
                )),
            ),
            None => ProviderAdapter::new(model.provider, backend),
        }
    }

    /// Build the synthesis or refinement prompt for the branch taken.
    ///
    /// Drafts are inlined into the prompt text, never passed as history
    /// turns. Must not be called for `BothFailed`.
    fn synthesis_input(
        request: &GenerateRequest,
        context: &[ChatTurn],
        decision: FallbackDecision,
        result_a: &ProviderResult,
        result_b: &ProviderResult,
    ) -> String {
        let constraint = request.constraint.as_deref();
        match decision {
            FallbackDecision::Synthesize => tandem_prompt::synthesis_prompt(
                &request.prompt,
                result_a.text(),
                result_b.text(),
                constraint,
                context,
            ),
            FallbackDecision::RefineA => tandem_prompt::refinement_prompt(
                &request.prompt,
                result_a.text(),
                constraint,
                context,
            ),
            FallbackDecision::RefineB => tandem_prompt::refinement_prompt(
                &request.prompt,
                result_b.text(),
                constraint,
                context,
            ),
            FallbackDecision::BothFailed => {
                unreachable!("no synthesis input exists when both providers failed")
            }
        }
    }

    /// The surviving draft surfaced when the synthesizer itself fails:
    /// prefer A unless A is the one that failed upstream.
    fn better_base<'a>(
        result_a: &'a ProviderResult,
        result_b: &'a ProviderResult,
    ) -> (&'static str, &'a ProviderResult) {
        if result_a.failed() {
            ("draft B", result_b)
        } else {
            ("draft A", result_a)
        }
    }

    /// Run one request, streaming progress into `sink`.
    ///
    /// Exactly one terminal event (`done` or `error`) is emitted and
    /// nothing follows it. Provider-level failures degrade; only a
    /// classifier failure terminates the stream with `error`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EmptyPrompt` — before emitting any event —
    /// when the prompt is missing. All later failures are reported
    /// through the stream instead.
    pub async fn run_streaming(
        &self,
        request: &GenerateRequest,
        sink: &EventSink,
    ) -> Result<(), EngineError> {
        if request.prompt.trim().is_empty() {
            return Err(EngineError::EmptyPrompt);
        }

        let context = Self::context_prefix(request);

        sink.emit(StreamEvent::Status {
            message: "Classifying request intent".to_string(),
        });

        let classification = match self.classifier().classify(&request.prompt, context).await {
            Ok(classification) => classification,
            Err(err) => {
                warn!(error = %err, "Classifier failed; request is fatal");
                sink.emit(StreamEvent::Error {
                    message: EngineError::Classifier(err).to_string(),
                });
                return Ok(());
            }
        };

        let pipeline = self.registry.resolve(classification.intent);
        info!(
            intent = %classification.intent,
            pipeline = %pipeline.display_name,
            "Pipeline selected"
        );

        sink.emit(StreamEvent::InitialData {
            pipeline_name: pipeline.display_name.clone(),
            classifier_reasoning: classification.reasoning.clone(),
        });
        sink.emit(StreamEvent::Status {
            message: format!(
                "Generating drafts with {} and {}",
                pipeline.base_a, pipeline.base_b
            ),
        });

        let messages = Self::base_messages(request, context);
        let adapter_a = self.adapter(&pipeline.base_a, None);
        let adapter_b = self.adapter(&pipeline.base_b, None);

        // Join barrier: both drafts settle before any decision is taken.
        let (result_a, result_b) = tokio::join!(
            adapter_a.generate_streaming(
                self.invocation(&pipeline.base_a, messages.clone()),
                |text| {
                    sink.emit(StreamEvent::ProviderAChunk {
                        text: text.to_string(),
                    });
                }
            ),
            adapter_b.generate_streaming(self.invocation(&pipeline.base_b, messages), |text| {
                sink.emit(StreamEvent::ProviderBChunk {
                    text: text.to_string(),
                });
            }),
        );

        let decision = FallbackDecision::from_flags(result_a.failed(), result_b.failed());
        debug!(?decision, "Fallback decision taken");

        let fallback_log = decision.describe(pipeline);
        if !fallback_log.is_empty() {
            sink.emit(StreamEvent::FallbackLog {
                log: fallback_log.clone(),
            });
        }

        if decision == FallbackDecision::BothFailed {
            sink.emit(StreamEvent::Done {
                message: FATAL_BOTH_FAILED.to_string(),
            });
            return Ok(());
        }

        sink.emit(StreamEvent::Status {
            message: format!("Synthesizing final response with {}", pipeline.synthesizer),
        });

        let synthesis_prompt =
            Self::synthesis_input(request, context, decision, &result_a, &result_b);
        let synthesizer = self.adapter(&pipeline.synthesizer, None);
        let synthesis = synthesizer
            .generate_streaming(
                self.invocation(
                    &pipeline.synthesizer,
                    vec![Message::user(synthesis_prompt)],
                ),
                |text| {
                    sink.emit(StreamEvent::SynthesisChunk {
                        text: text.to_string(),
                    });
                },
            )
            .await;

        if synthesis.failed() {
            let (label, survivor) = Self::better_base(&result_a, &result_b);
            warn!(
                synthesizer = %pipeline.synthesizer,
                fallback = label,
                "Synthesizer failed; surfacing surviving draft"
            );
            sink.emit(StreamEvent::FallbackLog {
                log: format!(
                    "Synthesizer {} failed; returning {} unchanged.",
                    pipeline.synthesizer, label
                ),
            });
            sink.emit(StreamEvent::SynthesisChunk {
                text: format!("\n--- Fallback: {label} (unsynthesized) ---\n{}", survivor.text()),
            });
        }

        sink.emit(StreamEvent::Done {
            message: "Response complete".to_string(),
        });
        Ok(())
    }

    /// Run one request without incremental delivery, returning the
    /// aggregate record. `cache` deduplicates identical one-shot base
    /// calls within a batch run.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EmptyPrompt` for a missing prompt and
    /// `EngineError::Classifier` when the classifier call fails; all
    /// provider-level failures degrade into the returned record.
    pub async fn run_batch(
        &self,
        request: &GenerateRequest,
        cache: Option<&Arc<ResponseCache>>,
    ) -> Result<BatchOutcome, EngineError> {
        if request.prompt.trim().is_empty() {
            return Err(EngineError::EmptyPrompt);
        }

        let context = Self::context_prefix(request);

        let classification = self
            .classifier()
            .classify(&request.prompt, context)
            .await
            .map_err(EngineError::Classifier)?;

        let pipeline = self.registry.resolve(classification.intent);
        info!(
            intent = %classification.intent,
            pipeline = %pipeline.display_name,
            "Pipeline selected (batch)"
        );

        let messages = Self::base_messages(request, context);
        let adapter_a = self.adapter(&pipeline.base_a, cache);
        let adapter_b = self.adapter(&pipeline.base_b, cache);

        let (result_a, result_b) = tokio::join!(
            adapter_a.generate(self.invocation(&pipeline.base_a, messages.clone())),
            adapter_b.generate(self.invocation(&pipeline.base_b, messages)),
        );

        let decision = FallbackDecision::from_flags(result_a.failed(), result_b.failed());
        let mut fallback_log = decision.describe(pipeline);

        if decision == FallbackDecision::BothFailed {
            return Ok(BatchOutcome {
                final_response: FATAL_BOTH_FAILED.to_string(),
                provider_a: result_a,
                provider_b: result_b,
                pipeline_name: pipeline.display_name.clone(),
                fallback_log,
                classifier_reasoning: classification.reasoning,
                completed_at: Utc::now(),
            });
        }

        let synthesis_prompt =
            Self::synthesis_input(request, context, decision, &result_a, &result_b);
        let synthesizer = self.adapter(&pipeline.synthesizer, None);
        let synthesis = synthesizer
            .generate(self.invocation(
                &pipeline.synthesizer,
                vec![Message::user(synthesis_prompt)],
            ))
            .await;

        let final_response = if synthesis.failed() {
            let (label, survivor) = Self::better_base(&result_a, &result_b);
            if !fallback_log.is_empty() {
                fallback_log.push('\n');
            }
            fallback_log.push_str(&format!(
                "Synthesizer {} failed; returning {} unchanged.",
                pipeline.synthesizer, label
            ));
            survivor.text().to_string()
        } else {
            synthesis.text().to_string()
        };

        Ok(BatchOutcome {
            final_response,
            provider_a: result_a,
            provider_b: result_b,
            pipeline_name: pipeline.display_name.clone(),
            fallback_log,
            classifier_reasoning: classification.reasoning,
            completed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_decision_table() {
        assert_eq!(
            FallbackDecision::from_flags(false, false),
            FallbackDecision::Synthesize
        );
        assert_eq!(
            FallbackDecision::from_flags(true, false),
            FallbackDecision::RefineB
        );
        assert_eq!(
            FallbackDecision::from_flags(false, true),
            FallbackDecision::RefineA
        );
        assert_eq!(
            FallbackDecision::from_flags(true, true),
            FallbackDecision::BothFailed
        );
    }

    #[test]
    fn test_describe_mentions_failed_side() {
        let pipeline = tandem_config::Config::default().pipelines.factual;

        assert_eq!(FallbackDecision::Synthesize.describe(&pipeline), "");
        let refine_b = FallbackDecision::RefineB.describe(&pipeline);
        assert!(refine_b.contains("Base model A"));
        assert!(refine_b.contains("failed"));
        assert!(refine_b.contains("base model B"));
    }

    #[test]
    fn test_context_prefix_drops_echoed_prompt() {
        let request = GenerateRequest::new("current question").with_history(vec![
            ChatTurn::user("earlier"),
            ChatTurn::assistant("answer"),
            ChatTurn::user("current question"),
        ]);

        let prefix = Orchestrator::context_prefix(&request);
        assert_eq!(prefix.len(), 2);
        assert_eq!(prefix[1].content, "answer");
    }

    #[test]
    fn test_context_prefix_keeps_unrelated_history() {
        let request = GenerateRequest::new("new question")
            .with_history(vec![ChatTurn::user("earlier"), ChatTurn::assistant("answer")]);

        let prefix = Orchestrator::context_prefix(&request);
        assert_eq!(prefix.len(), 2);
    }

    #[test]
    fn test_base_messages_end_with_prompt() {
        let request = GenerateRequest::new("the prompt")
            .with_history(vec![ChatTurn::user("q1"), ChatTurn::assistant("a1")]);
        let context = Orchestrator::context_prefix(&request);

        let messages = Orchestrator::base_messages(&request, context);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "q1");
        assert_eq!(messages[2].content, "the prompt");
    }

    #[test]
    fn test_better_base_prefers_a_unless_a_failed() {
        let ok_a = ProviderResult::from_text("a text");
        let ok_b = ProviderResult::from_text("b text");
        let mut failed_a = ProviderResult::new();
        failed_a.seal_failed("[a failed]");

        let (label, survivor) = Orchestrator::better_base(&ok_a, &ok_b);
        assert_eq!(label, "draft A");
        assert_eq!(survivor.text(), "a text");

        let (label, survivor) = Orchestrator::better_base(&failed_a, &ok_b);
        assert_eq!(label, "draft B");
        assert_eq!(survivor.text(), "b text");
    }
}
