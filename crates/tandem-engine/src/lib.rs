//! Orchestration core for tandem
//!
//! Ties the provider adapters, prompt builders and pipeline table into
//! the per-request state machine: classify the prompt, generate two
//! drafts in parallel, decide the fallback branch, synthesize (or
//! refine) the final answer, and deliver everything incrementally
//! through an ordered event stream.

mod classify;
mod events;
mod orchestrator;
mod pipeline;

pub use classify::{Classification, Intent, IntentClassifier, parse_classifier_output};
pub use events::{EventSink, StreamEvent};
pub use orchestrator::{
    BatchOutcome, FATAL_BOTH_FAILED, FallbackDecision, GenerateRequest, Orchestrator,
};
pub use pipeline::PipelineRegistry;
pub use tandem_utils::error::EngineError;
