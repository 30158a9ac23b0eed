//! tandem - dual-provider generation pipeline with intent routing
//!
//! tandem routes a prompt through an intent classifier, fans it out to
//! two independent generative providers in parallel, then synthesizes
//! (or, when one provider fails, refines) a single final answer —
//! streaming intermediate and final output incrementally to the caller.
//!
//! tandem can be used in two ways:
//! - **CLI**: the `tandem` binary renders the event stream on a terminal
//!   (`tandem run "..."`) or emits the batch record as JSON
//!   (`tandem batch "..."`).
//! - **Library**: drive [`Orchestrator`] directly and consume
//!   [`StreamEvent`]s from an [`EventSink`] channel.
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use tandem::{Config, EventSink, GenerateRequest, Orchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::discover()?;
//! let orchestrator = Orchestrator::from_config(&config)?;
//!
//! let (sink, mut events) = EventSink::channel();
//! let request = GenerateRequest::new("Write a poem about the sea");
//!
//! tokio::spawn(async move {
//!     let _ = orchestrator.run_streaming(&request, &sink).await;
//! });
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Failure semantics
//!
//! A single failed base provider degrades the request to refinement of
//! the surviving draft; a failed synthesizer degrades to the better
//! surviving draft. The whole request fails only when the classifier
//! fails or both base providers fail.

pub mod cli;

// Stable public surface, re-exported from the member crates
pub use tandem_config::{Config, ModelRef, PipelineSpec, ProviderId};
pub use tandem_engine::{
    BatchOutcome, Classification, EngineError, EventSink, FATAL_BOTH_FAILED, FallbackDecision,
    GenerateRequest, Intent, IntentClassifier, Orchestrator, PipelineRegistry, StreamEvent,
};
pub use tandem_llm::{
    BackendSet, Message, ProviderAdapter, ProviderBackend, ProviderError, ProviderInvocation,
    ProviderReply, ProviderResult, ResponseCache, Role, TextStream,
};
pub use tandem_utils::error::ConfigError;
pub use tandem_utils::exit_codes::ExitCode;
pub use tandem_utils::types::{ChatRole, ChatTurn};
