//! Ordered event stream delivered to the caller
//!
//! One `EventSink` exists per request; the orchestrator is its only
//! writer. Events arrive in emission order, each logical event at most
//! once, and exactly one terminal event (`done` or `error`) closes the
//! sequence. The channel is unbounded: a slow consumer buffers, it never
//! loses chunks mid-sequence.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Incremental progress event for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Free-text progress narration
    Status { message: String },
    /// Emitted once after classification: which pipeline ran and why
    InitialData {
        pipeline_name: String,
        classifier_reasoning: String,
    },
    /// Incremental text from base provider A
    ProviderAChunk { text: String },
    /// Incremental text from base provider B
    ProviderBChunk { text: String },
    /// Narration of a degraded branch (absent when nothing failed)
    FallbackLog { log: String },
    /// Incremental text of the final answer
    SynthesisChunk { text: String },
    /// Terminal: the request completed (possibly degraded)
    Done { message: String },
    /// Terminal: the request failed before any answer was possible
    Error { message: String },
}

impl StreamEvent {
    /// Whether this event closes the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Single-writer handle to a request's event stream.
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventSink {
    /// Create a sink together with its consumer half.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Append one event. A departed consumer is not an error; emission
    /// becomes a no-op and the pipeline runs to completion regardless.
    pub fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }
}
