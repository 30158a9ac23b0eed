//! Intent-keyed pipeline table
//!
//! A pure lookup from intent to pipeline configuration. The table is
//! built once from validated configuration and is structurally total:
//! one entry per intent, so request-time resolution cannot fail. A
//! missing pipeline section is a startup configuration error, surfaced
//! long before any request exists.

use tandem_config::{Config, PipelineSpec};

use crate::classify::Intent;

/// Immutable intent → pipeline mapping.
#[derive(Debug, Clone)]
pub struct PipelineRegistry {
    factual: PipelineSpec,
    creative: PipelineSpec,
}

impl PipelineRegistry {
    /// Build a registry from explicit entries.
    #[must_use]
    pub fn new(factual: PipelineSpec, creative: PipelineSpec) -> Self {
        Self { factual, creative }
    }

    /// Build the registry from validated configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.pipelines.factual.clone(),
            config.pipelines.creative.clone(),
        )
    }

    /// Resolve the pipeline for an intent. Pure and total.
    #[must_use]
    pub fn resolve(&self, intent: Intent) -> &PipelineSpec {
        match intent {
            Intent::Factual => &self.factual,
            Intent::Creative => &self.creative,
        }
    }
}
