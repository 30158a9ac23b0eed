//! Configuration management for tandem
//!
//! Hierarchical configuration loaded once at process start and immutable
//! afterwards: built-in reference defaults, overridden by an optional
//! `.tandem/config.toml` discovered upward from the working directory.
//! No code path mutates configuration at request time.

mod config;

pub use config::{
    Config, HttpProviderConfig, Limits, LlmConfig, ModelRef, PipelineSpec, PipelinesConfig,
    ProviderId,
};
