//! Provider backend abstraction for dual-provider generation
//!
//! This crate provides a trait-based system for invoking generative
//! backends over HTTP in one-shot or streaming mode. Both providers
//! implement the `ProviderBackend` trait; the orchestrator works against
//! `ProviderAdapter`, which absorbs every backend failure into a sealed
//! `ProviderResult` so the pipeline can degrade instead of aborting.

mod adapter;
mod cache;
mod gemini_backend;
pub(crate) mod http_client;
mod openai_backend;
pub(crate) mod sse;
mod types;

pub use adapter::{BackendSet, ProviderAdapter, ProviderResult};
pub use cache::{CacheStats, CachedBackend, ResponseCache};
pub use tandem_utils::error::ProviderError;
pub use types::{Message, ProviderBackend, ProviderInvocation, ProviderReply, Role, TextStream};

// Internal backend implementations
pub(crate) use gemini_backend::GeminiBackend;
pub(crate) use openai_backend::OpenAiBackend;
