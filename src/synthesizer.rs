//! Response synthesis into one coherent answer.
//!
//! A single successful response bypasses the provider and is returned
//! verbatim with full confidence. Multiple responses are merged by the
//! provider; when its output is not parseable JSON, the raw text is
//! used as the answer with lowered confidence rather than failing the
//! pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::ModelConfig;
use crate::error::{Result, RouterError};
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::types::{AgentResponse, SynthesizedResult};
use crate::util;

/// Confidence attached when the provider output could not be parsed
/// and the raw text is used as the answer.
const PARSE_FALLBACK_CONFIDENCE: f64 = 0.7;
/// Confidence assumed when the provider omits one.
const DEFAULT_CONFIDENCE: f64 = 0.8;

/// System prompt for response synthesis.
const SYNTHESIS_PROMPT: &str = r#"You are a response synthesis expert. Merge multiple agent responses into one coherent answer.

Your task:
1. Read the original user query
2. Review responses from multiple specialist agents
3. Synthesize a comprehensive, coherent answer that:
   - Addresses the user's original question directly
   - Combines information from all responses
   - Resolves any conflicts (note discrepancies)
   - Uses clear, structured markdown format

Guidelines:
- If responses conflict, note the discrepancy clearly
- If information is incomplete, acknowledge what's missing
- Keep the answer focused on the user's query

Provide your synthesized answer in this JSON format:
{
  "answer": "Your synthesized answer in markdown",
  "conflicts_resolved": ["Description of any conflicts resolved"],
  "confidence": 0.0-1.0,
  "notes": "Any important notes about the synthesis"
}"#;

#[derive(Debug, Deserialize)]
struct SynthesisPayload {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    conflicts_resolved: Vec<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    notes: String,
}

const fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

/// Merges successful agent responses into a final answer.
pub struct ResultSynthesizer {
    provider: Arc<dyn CompletionProvider>,
    model: ModelConfig,
}

impl ResultSynthesizer {
    /// Creates a synthesizer over a provider and model configuration.
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>, model: ModelConfig) -> Self {
        Self { provider, model }
    }

    /// Synthesizes responses into a [`SynthesizedResult`].
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::EmptySynthesis`] for an empty input map,
    /// [`RouterError::Provider`] when the provider call fails, and
    /// [`RouterError::Synthesis`] when parsed output has an empty
    /// answer.
    pub async fn synthesize(
        &self,
        responses: &BTreeMap<String, AgentResponse>,
        original_query: &str,
    ) -> Result<SynthesizedResult> {
        if responses.is_empty() {
            return Err(RouterError::EmptySynthesis);
        }

        if responses.len() == 1
            && let Some((subquery_id, sole)) = responses.iter().next()
        {
            return Ok(Self::single_response(subquery_id, sole));
        }

        let formatted = Self::format_responses(responses);
        let input = format!("Original query: {original_query}\n\nAgent responses:\n{formatted}");
        let request = CompletionRequest::from_model(&self.model, SYNTHESIS_PROMPT, input);
        let response = self.provider.complete(&request).await?;

        let result = Self::parse_synthesis(&response, responses)?;
        tracing::info!(
            confidence = result.confidence,
            sources = ?result.sources,
            conflicts = result.conflicts_resolved.len(),
            "synthesis complete"
        );
        Ok(result)
    }

    /// Wraps a sole response without calling the provider.
    fn single_response(subquery_id: &str, response: &AgentResponse) -> SynthesizedResult {
        tracing::debug!(subquery = subquery_id, "single response, no synthesis needed");

        let mut metadata = Map::new();
        metadata.insert("single_response".to_string(), Value::Bool(true));
        metadata.insert(
            "subquery_id".to_string(),
            Value::String(subquery_id.to_string()),
        );

        SynthesizedResult {
            answer: response.content.clone(),
            sources: vec![response.agent_id.clone()],
            confidence: 1.0,
            conflicts_resolved: Vec::new(),
            metadata,
        }
    }

    /// Renders a section per response for the synthesis prompt.
    fn format_responses(responses: &BTreeMap<String, AgentResponse>) -> String {
        let mut formatted = String::new();
        for (subquery_id, response) in responses {
            let _ = writeln!(
                formatted,
                "### Response from {} (subquery: {subquery_id}):\n{}\n",
                response.agent_id, response.content
            );
        }
        formatted
    }

    /// Parses the provider output, degrading to the raw text with
    /// lowered confidence when it is not JSON.
    fn parse_synthesis(
        response: &str,
        responses: &BTreeMap<String, AgentResponse>,
    ) -> Result<SynthesizedResult> {
        let sources = Self::distinct_sources(responses);

        let Some(value) = util::parse_json(response) else {
            tracing::warn!("synthesis output is not JSON, using raw text as answer");
            let mut metadata = Map::new();
            metadata.insert("parse_fallback".to_string(), Value::Bool(true));
            metadata.insert("response_count".to_string(), Value::from(responses.len()));
            return Ok(SynthesizedResult {
                answer: response.to_string(),
                sources,
                confidence: PARSE_FALLBACK_CONFIDENCE,
                conflicts_resolved: Vec::new(),
                metadata,
            });
        };

        let payload: SynthesisPayload =
            serde_json::from_value(value).map_err(|e| RouterError::Synthesis {
                message: format!("unexpected synthesis shape: {e}"),
            })?;

        if payload.answer.trim().is_empty() {
            return Err(RouterError::Synthesis {
                message: "synthesized answer is empty".to_string(),
            });
        }

        let confidence = payload.confidence.clamp(0.0, 1.0);
        if (confidence - payload.confidence).abs() > f64::EPSILON {
            tracing::warn!(
                reported = payload.confidence,
                clamped = confidence,
                "confidence outside [0, 1], clamped"
            );
        }

        let mut metadata = Map::new();
        if !payload.notes.is_empty() {
            metadata.insert("notes".to_string(), Value::String(payload.notes));
        }
        metadata.insert("response_count".to_string(), Value::from(responses.len()));

        Ok(SynthesizedResult {
            answer: payload.answer,
            sources,
            confidence,
            conflicts_resolved: payload.conflicts_resolved,
            metadata,
        })
    }

    /// Distinct contributing agent ids, sorted.
    fn distinct_sources(responses: &BTreeMap<String, AgentResponse>) -> Vec<String> {
        responses
            .values()
            .map(|r| r.agent_id.clone())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }
}

impl std::fmt::Debug for ResultSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSynthesizer")
            .field("provider", &self.provider.name())
            .field("model", &self.model.name)
            .finish()
    }
}
