//! Router configuration with TOML loading and validation.
//!
//! Configuration covers the four per-stage model settings, decomposition
//! limits, the agent capability map, evaluation gating, and error
//! handling (timeouts/retries). Values are resolved in order: explicit
//! file values → defaults.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, RouterError};

/// Default model used when a stage does not name one.
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.3;
/// Default maximum response tokens.
const DEFAULT_MAX_TOKENS: u32 = 1000;
/// Default maximum subqueries per decomposition.
const DEFAULT_MAX_SUBQUERIES: usize = 10;
/// Default decomposition recursion limit (advisory; one level is
/// performed).
const DEFAULT_RECURSION_LIMIT: usize = 3;
/// Default decomposition fallback threshold.
const DEFAULT_FALLBACK_THRESHOLD: f64 = 0.7;
/// Default quality threshold for the evaluation gate.
const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;
/// Default per-call agent timeout in seconds.
const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
/// Default retry count for failed agent calls.
const DEFAULT_RETRIES: u32 = 2;
/// Default fallback message returned when no trusted answer exists.
const DEFAULT_FALLBACK_MESSAGE: &str =
    "I wasn't able to find a reliable answer to that. Could you rephrase or narrow the question?";

/// Configuration for one LLM-backed pipeline stage.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Model identifier (e.g. "gpt-4.1-mini").
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Sampling temperature in `[0, 1]`.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens in the response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model_name() -> String {
    DEFAULT_MODEL.to_string()
}

const fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

const fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Per-stage model configurations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfigs {
    /// Model for query interpretation.
    #[serde(default)]
    pub interpretation: ModelConfig,
    /// Model for query decomposition.
    #[serde(default)]
    pub decomposition: ModelConfig,
    /// Model for response synthesis.
    #[serde(default)]
    pub synthesis: ModelConfig,
    /// Model for answer evaluation.
    #[serde(default)]
    pub evaluation: ModelConfig,
}

/// Limits applied to query decomposition.
#[derive(Debug, Clone, Deserialize)]
pub struct DecompositionConfig {
    /// Maximum number of subqueries allowed per decomposition.
    #[serde(default = "default_max_subqueries")]
    pub max_subqueries: usize,
    /// Maximum decomposition depth. Advisory: one level is performed.
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
    /// Threshold for triggering decomposition fallback.
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f64,
}

const fn default_max_subqueries() -> usize {
    DEFAULT_MAX_SUBQUERIES
}

const fn default_recursion_limit() -> usize {
    DEFAULT_RECURSION_LIMIT
}

const fn default_fallback_threshold() -> f64 {
    DEFAULT_FALLBACK_THRESHOLD
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            max_subqueries: DEFAULT_MAX_SUBQUERIES,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }
}

/// Quality-gate configuration for the judge.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationConfig {
    /// Message returned whenever the pipeline cannot produce a trusted
    /// answer. Must be non-empty.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    /// Minimum score each gated criterion must reach, in `[0, 1]`.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    /// Criteria names passed to the judge prompt.
    #[serde(default = "default_criteria")]
    pub criteria: Vec<String>,
}

fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

const fn default_quality_threshold() -> f64 {
    DEFAULT_QUALITY_THRESHOLD
}

fn default_criteria() -> Vec<String> {
    vec![
        "completeness".to_string(),
        "accuracy".to_string(),
        "clarity".to_string(),
    ]
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            fallback_message: default_fallback_message(),
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            criteria: default_criteria(),
        }
    }
}

/// Timeout and retry policy for agent dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorHandlingConfig {
    /// Per-call agent deadline in seconds. Must be positive.
    #[serde(default = "default_timeout", rename = "timeout")]
    pub timeout_secs: f64,
    /// Number of retries after a failed attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

const fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

impl ErrorHandlingConfig {
    /// Per-call deadline as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
        }
    }
}

/// Complete router configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmartRouterConfig {
    /// Whether the router is enabled. Disabled configs fail
    /// construction.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-stage model settings.
    #[serde(default)]
    pub models: ModelConfigs,
    /// Decomposition limits.
    #[serde(default)]
    pub decomposition: DecompositionConfig,
    /// Capability map: agent id → advertised capabilities. Ordered so
    /// candidate lists are deterministic.
    #[serde(default)]
    pub capabilities: BTreeMap<String, Vec<String>>,
    /// Evaluation gating.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Timeout/retry policy.
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
}

const fn default_enabled() -> bool {
    true
}

impl Default for SmartRouterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            models: ModelConfigs::default(),
            decomposition: DecompositionConfig::default(),
            capabilities: BTreeMap::new(),
            evaluation: EvaluationConfig::default(),
            error_handling: ErrorHandlingConfig::default(),
        }
    }
}

impl SmartRouterConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] when the file is missing,
    /// unparseable, or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| RouterError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| RouterError::Config {
            message: format!("cannot parse {}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates ranges and required values.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        for (stage, model) in [
            ("interpretation", &self.models.interpretation),
            ("decomposition", &self.models.decomposition),
            ("synthesis", &self.models.synthesis),
            ("evaluation", &self.models.evaluation),
        ] {
            if model.name.trim().is_empty() {
                return Err(RouterError::Config {
                    message: format!("models.{stage}.name must be non-empty"),
                });
            }
            if !(0.0..=1.0).contains(&model.temperature) {
                return Err(RouterError::Config {
                    message: format!(
                        "models.{stage}.temperature must be in [0, 1], got {}",
                        model.temperature
                    ),
                });
            }
            if model.max_tokens == 0 {
                return Err(RouterError::Config {
                    message: format!("models.{stage}.max_tokens must be >= 1"),
                });
            }
        }

        if self.decomposition.max_subqueries == 0 {
            return Err(RouterError::Config {
                message: "decomposition.max_subqueries must be >= 1".to_string(),
            });
        }
        if self.decomposition.recursion_limit == 0 {
            return Err(RouterError::Config {
                message: "decomposition.recursion_limit must be >= 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.decomposition.fallback_threshold) {
            return Err(RouterError::Config {
                message: format!(
                    "decomposition.fallback_threshold must be in [0, 1], got {}",
                    self.decomposition.fallback_threshold
                ),
            });
        }
        if self.evaluation.fallback_message.trim().is_empty() {
            return Err(RouterError::Config {
                message: "evaluation.fallback_message must be non-empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.evaluation.quality_threshold) {
            return Err(RouterError::Config {
                message: format!(
                    "evaluation.quality_threshold must be in [0, 1], got {}",
                    self.evaluation.quality_threshold
                ),
            });
        }
        if self.error_handling.timeout_secs <= 0.0 {
            return Err(RouterError::Config {
                message: format!(
                    "error_handling.timeout must be positive, got {}",
                    self.error_handling.timeout_secs
                ),
            });
        }
        Ok(())
    }
}
