//! Intent classification
//!
//! One non-streaming call to a fixed classifier model labels the request
//! FACTUAL or CREATIVE. Parsing is deliberately forgiving: the last
//! non-empty line decides, and anything that is not recognizably creative
//! degrades to FACTUAL rather than to an error. Only a failure of the
//! underlying call escalates, because without an intent no pipeline can
//! be selected.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tandem_config::ModelRef;
use tandem_llm::{Message, ProviderBackend, ProviderInvocation};
use tandem_utils::error::ProviderError;
use tandem_utils::types::ChatTurn;

/// Classification label driving pipeline selection.
///
/// Derived once per request and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Factual,
    Creative,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Factual => write!(f, "factual"),
            Self::Creative => write!(f, "creative"),
        }
    }
}

/// Classifier verdict: the label plus the model's free-text reasoning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub reasoning: String,
}

/// Parse raw classifier output into a label and reasoning string.
///
/// The last non-empty line, uppercased, decides: containing "CREATIVE"
/// routes creative, anything else defaults to FACTUAL. The remaining
/// lines form the reasoning, with any literal "Reasoning:" label
/// stripped. Malformed or empty output therefore degrades to FACTUAL,
/// never to an error.
#[must_use]
pub fn parse_classifier_output(raw: &str) -> Classification {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let Some((label_line, reasoning_lines)) = lines.split_last() else {
        return Classification {
            intent: Intent::Factual,
            reasoning: String::new(),
        };
    };

    let intent = if label_line.to_uppercase().contains("CREATIVE") {
        Intent::Creative
    } else {
        Intent::Factual
    };

    let reasoning = reasoning_lines
        .iter()
        .map(|line| {
            line.strip_prefix("Reasoning:")
                .map_or(*line, str::trim_start)
        })
        .collect::<Vec<_>>()
        .join("\n");

    Classification { intent, reasoning }
}

/// Labels a request by invoking the configured classifier model once.
pub struct IntentClassifier {
    backend: Arc<dyn ProviderBackend>,
    model: ModelRef,
    timeout: Duration,
}

impl IntentClassifier {
    #[must_use]
    pub fn new(backend: Arc<dyn ProviderBackend>, model: ModelRef, timeout: Duration) -> Self {
        Self {
            backend,
            model,
            timeout,
        }
    }

    /// Classify a prompt given its conversation-context prefix.
    ///
    /// # Errors
    ///
    /// Returns the underlying `ProviderError` unchanged; the caller must
    /// treat it as request-fatal since no intent could be derived.
    pub async fn classify(
        &self,
        prompt: &str,
        history: &[ChatTurn],
    ) -> Result<Classification, ProviderError> {
        let text = tandem_prompt::classification_prompt(prompt, history);
        let inv = ProviderInvocation::new(
            self.model.model.clone(),
            self.timeout,
            vec![Message::user(text)],
        );

        let reply = self.backend.invoke(inv).await?;
        let classification = parse_classifier_output(&reply.text);

        debug!(
            intent = %classification.intent,
            model = %self.model,
            "Intent classified"
        );

        Ok(classification)
    }
}
