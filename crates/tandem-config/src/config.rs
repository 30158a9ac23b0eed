//! Configuration types, discovery and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tandem_utils::error::ConfigError;

/// Default request timeout applied to every provider invocation
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default maximum output tokens per provider invocation
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Which concrete backend serves a model.
///
/// Dispatch is always driven by this tag; model identifiers are opaque
/// strings and never inspected for vendor prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Chat-completions wire schema (role/content turns)
    OpenAi,
    /// generateContent wire schema (role/parts turns)
    Gemini,
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// A model identifier together with the backend that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: ProviderId,
    pub model: String,
}

impl ModelRef {
    #[must_use]
    pub fn new(provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Settings for one HTTP provider backend.
///
/// API keys are never stored in the file; `api_key_env` names the
/// environment variable to read at backend construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Custom endpoint; the backend default is used when absent
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            api_key_env: None,
            base_url: None,
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            temperature: None,
        }
    }
}

/// `[llm]` section: one entry per concrete backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub openai: Option<HttpProviderConfig>,
    #[serde(default)]
    pub gemini: Option<HttpProviderConfig>,
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Per-invocation timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_seconds: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Limits {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// One pipeline entry: which model fills each role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub display_name: String,
    pub base_a: ModelRef,
    pub base_b: ModelRef,
    pub synthesizer: ModelRef,
}

/// `[pipelines]` section: exactly one entry per intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinesConfig {
    pub factual: PipelineSpec,
    pub creative: PipelineSpec,
}

impl Default for PipelinesConfig {
    fn default() -> Self {
        Self {
            factual: PipelineSpec {
                display_name: "Factual (grounded drafts, precise synthesis)".to_string(),
                base_a: ModelRef::new(ProviderId::OpenAi, "gpt-4o"),
                base_b: ModelRef::new(ProviderId::Gemini, "gemini-2.0-flash"),
                synthesizer: ModelRef::new(ProviderId::OpenAi, "gpt-4o"),
            },
            creative: PipelineSpec {
                display_name: "Creative (expressive drafts, free synthesis)".to_string(),
                base_a: ModelRef::new(ProviderId::OpenAi, "gpt-4o"),
                base_b: ModelRef::new(ProviderId::Gemini, "gemini-2.0-flash"),
                synthesizer: ModelRef::new(ProviderId::Gemini, "gemini-2.5-pro"),
            },
        }
    }
}

/// `[classifier]` section: the fixed model used for intent classification.
fn default_classifier() -> ModelRef {
    ModelRef::new(ProviderId::OpenAi, "gpt-4o-mini")
}

/// Top-level configuration.
///
/// Use [`Config::discover()`] for CLI-like behavior (search `.tandem/config.toml`
/// upward from the current directory, stop at a repository root), or
/// [`Config::load()`] with an explicit path. Every loader validates before
/// returning, so a held `Config` is always internally consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default = "default_classifier")]
    pub classifier: ModelRef,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub pipelines: PipelinesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            classifier: default_classifier(),
            limits: Limits::default(),
            pipelines: PipelinesConfig::default(),
        }
    }
}

impl Config {
    /// Discover and load configuration starting from the current directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a discovered file cannot be read, parsed,
    /// or validated. A missing file is not an error; reference defaults
    /// apply.
    pub fn discover() -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir()
            .map_err(|e| ConfigError::InvalidFile(format!("cannot resolve current dir: {e}")))?;
        Self::discover_from(&start_dir)
    }

    /// Discover and load configuration starting from a specific directory.
    ///
    /// This is the path-driven variant used by tests to avoid process-global
    /// state.
    ///
    /// # Errors
    ///
    /// See [`Config::discover()`].
    pub fn discover_from(start_dir: &Path) -> Result<Self, ConfigError> {
        match Self::find_config_file(start_dir) {
            Some(path) => {
                debug!(path = %path.display(), "Loading discovered config file");
                Self::load(&path)
            }
            None => {
                debug!("No config file found; using reference defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load configuration from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the file does not exist,
    /// `ConfigError::InvalidFile` on parse failure, or a validation error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::InvalidFile(format!("{}: {e}", path.display()))
            }
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidFile` on parse failure or a validation
    /// error.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFile(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal configuration for tests: reference defaults, short timeout.
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Self {
            limits: Limits {
                request_timeout_seconds: 5,
            },
            ..Self::default()
        }
    }

    /// Walk upward from `start_dir` looking for `.tandem/config.toml`,
    /// stopping at the filesystem root or a repository root marker.
    fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(".tandem").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            if current_dir.join(".git").exists() {
                // Stop at repository root if no config found
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        None
    }

    /// Validate value ranges and cross-field invariants.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "limits.request_timeout_seconds".to_string(),
                value: "must be greater than 0".to_string(),
            });
        }

        for (name, provider) in [("openai", &self.llm.openai), ("gemini", &self.llm.gemini)] {
            let Some(provider) = provider else { continue };
            if let Some(max_tokens) = provider.max_tokens
                && max_tokens == 0
            {
                return Err(ConfigError::InvalidValue {
                    key: format!("llm.{name}.max_tokens"),
                    value: "must be greater than 0".to_string(),
                });
            }
            if let Some(temperature) = provider.temperature
                && !(0.0..=2.0).contains(&temperature)
            {
                return Err(ConfigError::InvalidValue {
                    key: format!("llm.{name}.temperature"),
                    value: format!("{temperature} is outside 0.0..=2.0"),
                });
            }
        }

        for (name, spec) in [
            ("pipelines.factual", &self.pipelines.factual),
            ("pipelines.creative", &self.pipelines.creative),
        ] {
            if spec.display_name.trim().is_empty() {
                return Err(ConfigError::MissingRequired(format!("{name}.display_name")));
            }
            for (role, model_ref) in [
                ("base_a", &spec.base_a),
                ("base_b", &spec.base_b),
                ("synthesizer", &spec.synthesizer),
            ] {
                if model_ref.model.trim().is_empty() {
                    return Err(ConfigError::MissingRequired(format!("{name}.{role}.model")));
                }
            }
        }

        if self.classifier.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired("classifier.model".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.request_timeout_seconds, 120);
        assert_eq!(config.classifier.provider, ProviderId::OpenAi);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [llm.openai]
            api_key_env = "OPENAI_API_KEY"
            max_tokens = 1024
            temperature = 0.7

            [llm.gemini]
            api_key_env = "GEMINI_API_KEY"

            [classifier]
            provider = "gemini"
            model = "gemini-2.0-flash-lite"

            [limits]
            request_timeout_seconds = 30

            [pipelines.factual]
            display_name = "Factual"
            base_a = { provider = "openai", model = "gpt-4o" }
            base_b = { provider = "gemini", model = "gemini-2.0-flash" }
            synthesizer = { provider = "openai", model = "gpt-4o" }

            [pipelines.creative]
            display_name = "Creative"
            base_a = { provider = "openai", model = "gpt-4o" }
            base_b = { provider = "gemini", model = "gemini-2.0-flash" }
            synthesizer = { provider = "gemini", model = "gemini-2.5-pro" }
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.classifier.provider, ProviderId::Gemini);
        assert_eq!(config.limits.request_timeout_seconds, 30);
        assert_eq!(
            config.llm.openai.as_ref().unwrap().max_tokens,
            Some(1024)
        );
        assert_eq!(config.pipelines.factual.synthesizer.provider, ProviderId::OpenAi);
        assert_eq!(
            config.pipelines.creative.synthesizer.model,
            "gemini-2.5-pro"
        );
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let toml = r#"
            [limits]
            request_timeout_seconds = 10
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.limits.request_timeout_seconds, 10);
        // Pipeline table falls back to the reference entries
        assert_eq!(config.pipelines.factual.base_a.provider, ProviderId::OpenAi);
        assert_eq!(config.pipelines.creative.base_b.provider, ProviderId::Gemini);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let toml = r#"
            [limits]
            request_timeout_seconds = 0
        "#;

        let err = Config::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("request_timeout_seconds"));
    }

    #[test]
    fn test_rejects_out_of_range_temperature() {
        let toml = r#"
            [llm.openai]
            temperature = 3.5
        "#;

        let err = Config::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_rejects_empty_pipeline_model() {
        let toml = r#"
            [pipelines.factual]
            display_name = "Factual"
            base_a = { provider = "openai", model = "" }
            base_b = { provider = "gemini", model = "gemini-2.0-flash" }
            synthesizer = { provider = "openai", model = "gpt-4o" }

            [pipelines.creative]
            display_name = "Creative"
            base_a = { provider = "openai", model = "gpt-4o" }
            base_b = { provider = "gemini", model = "gemini-2.0-flash" }
            synthesizer = { provider = "gemini", model = "gemini-2.5-pro" }
        "#;

        let err = Config::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("base_a.model"));
    }

    #[test]
    fn test_discover_from_finds_file_upward() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(".tandem");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            "[limits]\nrequest_timeout_seconds = 42\n",
        )
        .unwrap();

        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested).unwrap();
        assert_eq!(config.limits.request_timeout_seconds, 42);
    }

    #[test]
    fn test_discover_from_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        // Repository root marker stops the upward walk inside the tempdir
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();

        let config = Config::discover_from(dir.path()).unwrap();
        assert_eq!(config.limits.request_timeout_seconds, 120);
    }

    #[test]
    fn test_model_ref_display() {
        let mr = ModelRef::new(ProviderId::Gemini, "gemini-2.0-flash");
        assert_eq!(mr.to_string(), "gemini/gemini-2.0-flash");
    }
}
