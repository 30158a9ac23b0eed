//! Shared test support: scripted provider backends.
//!
//! The mock keys its behavior on the invocation's model name, so one
//! instance can play the classifier, both base providers and the
//! synthesizer in a single pipeline run while recording every call.
#![allow(dead_code)] // each test binary uses a different subset

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tandem::{
    BackendSet, ModelRef, Orchestrator, PipelineRegistry, PipelineSpec, ProviderBackend,
    ProviderError, ProviderInvocation, ProviderReply, ProviderId, TextStream,
};

/// Scripted behavior for one model name.
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed, streaming these fragments in order
    Reply(Vec<&'static str>),
    /// Fail before producing anything
    Fail,
    /// Stream these fragments, then fail mid-sequence
    FailAfter(Vec<&'static str>),
}

/// One recorded invocation: model name and the final user message.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
}

pub struct MockBackend {
    scripts: HashMap<String, Script>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl MockBackend {
    pub fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts
                .iter()
                .map(|(model, script)| ((*model).to_string(), script.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls_for(&self, model: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.model == model)
            .cloned()
            .collect()
    }

    fn record(&self, inv: &ProviderInvocation) -> Script {
        self.calls.lock().unwrap().push(RecordedCall {
            model: inv.model.clone(),
            prompt: inv.messages.last().map_or_else(String::new, |m| m.content.clone()),
        });
        self.scripts
            .get(&inv.model)
            .cloned()
            .unwrap_or_else(|| panic!("no script for model '{}'", inv.model))
    }
}

#[async_trait]
impl ProviderBackend for MockBackend {
    async fn invoke(&self, inv: ProviderInvocation) -> Result<ProviderReply, ProviderError> {
        match self.record(&inv) {
            Script::Reply(fragments) => Ok(ProviderReply::new(
                fragments.concat(),
                "mock",
                inv.model,
            )),
            Script::Fail | Script::FailAfter(_) => {
                Err(ProviderError::Transport("scripted failure".to_string()))
            }
        }
    }

    async fn invoke_streaming(&self, inv: ProviderInvocation) -> Result<TextStream, ProviderError> {
        match self.record(&inv) {
            Script::Reply(fragments) => {
                let items: Vec<Result<String, ProviderError>> =
                    fragments.into_iter().map(|f| Ok(f.to_string())).collect();
                Ok(Box::pin(futures_util::stream::iter(items)))
            }
            Script::Fail => Err(ProviderError::Transport("scripted failure".to_string())),
            Script::FailAfter(fragments) => {
                let mut items: Vec<Result<String, ProviderError>> =
                    fragments.into_iter().map(|f| Ok(f.to_string())).collect();
                items.push(Err(ProviderError::Transport(
                    "scripted mid-stream failure".to_string(),
                )));
                Ok(Box::pin(futures_util::stream::iter(items)))
            }
        }
    }
}

/// Model names used by the test pipelines.
pub const CLASSIFIER: &str = "classifier";
pub const FACT_A: &str = "fact-a";
pub const FACT_B: &str = "fact-b";
pub const FACT_SYNTH: &str = "fact-synth";
pub const CREA_A: &str = "crea-a";
pub const CREA_B: &str = "crea-b";
pub const CREA_SYNTH: &str = "crea-synth";

pub fn test_registry() -> PipelineRegistry {
    PipelineRegistry::new(
        PipelineSpec {
            display_name: "Factual test pipeline".to_string(),
            base_a: ModelRef::new(ProviderId::OpenAi, FACT_A),
            base_b: ModelRef::new(ProviderId::Gemini, FACT_B),
            synthesizer: ModelRef::new(ProviderId::OpenAi, FACT_SYNTH),
        },
        PipelineSpec {
            display_name: "Creative test pipeline".to_string(),
            base_a: ModelRef::new(ProviderId::OpenAi, CREA_A),
            base_b: ModelRef::new(ProviderId::Gemini, CREA_B),
            synthesizer: ModelRef::new(ProviderId::Gemini, CREA_SYNTH),
        },
    )
}

/// An orchestrator whose every model is served by the same scripted mock.
pub fn test_orchestrator(mock: Arc<MockBackend>) -> Orchestrator {
    let backends = BackendSet::new(mock.clone(), mock);
    Orchestrator::new(
        backends,
        test_registry(),
        ModelRef::new(ProviderId::OpenAi, CLASSIFIER),
        Duration::from_secs(5),
    )
}
