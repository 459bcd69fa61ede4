//! Answer quality evaluation.
//!
//! Scores a final answer across six criteria and gates it on the three
//! configured ones (completeness, accuracy, clarity). The API is
//! infallible by design: any provider or parse failure yields a
//! conservative result with `should_fallback = true` so the
//! orchestrator always receives a decision.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{EvaluationConfig, ModelConfig};
use crate::error::{Result, RouterError};
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::types::EvaluationResult;
use crate::util;

/// System prompt for answer evaluation.
const EVALUATION_PROMPT: &str = r#"You are an objective answer quality evaluator. Assess the answer against the criteria.

Evaluation criteria:
1. Completeness: Does the answer fully address the query? (1.0 fully, 0.5 partially, 0.0 not at all)
2. Accuracy: Is the information factually correct? (1.0 accurate, 0.5 uncertain, 0.0 clear errors)
3. Clarity: Is the answer well-formatted and understandable? (1.0 clear, 0.5 somewhat, 0.0 incoherent)
4. Faithfulness: Does the answer stick to provided information? (1.0 only provided, 0.0 unsupported claims)
5. Relevance: Is the answer relevant to the query? (1.0 highly, 0.0 off-topic)
6. Actionability: Can the user act on this answer? (1.0 actionable, 0.0 not)

Provide the evaluation in this JSON format:
{
  "completeness_score": 0.0-1.0,
  "accuracy_score": 0.0-1.0,
  "clarity_score": 0.0-1.0,
  "faithfulness_score": 0.0-1.0,
  "relevance_score": 0.0-1.0,
  "actionability_score": 0.0-1.0,
  "overall_score": 0.0-1.0,
  "issues": ["List any quality issues identified"],
  "reasoning": "Brief explanation of evaluation"
}"#;

#[derive(Debug, Deserialize)]
struct EvaluationPayload {
    #[serde(default = "default_score")]
    completeness_score: f64,
    #[serde(default = "default_score")]
    accuracy_score: f64,
    #[serde(default = "default_score")]
    clarity_score: f64,
    #[serde(default)]
    faithfulness_score: Option<f64>,
    #[serde(default)]
    relevance_score: Option<f64>,
    #[serde(default)]
    actionability_score: Option<f64>,
    #[serde(default)]
    overall_score: Option<f64>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

const fn default_score() -> f64 {
    0.5
}

/// LLM-backed answer quality judge.
pub struct AnswerJudge {
    provider: Arc<dyn CompletionProvider>,
    model: ModelConfig,
    eval_config: EvaluationConfig,
}

impl AnswerJudge {
    /// Creates a judge over a provider, model and evaluation settings.
    #[must_use]
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        model: ModelConfig,
        eval_config: EvaluationConfig,
    ) -> Self {
        Self {
            provider,
            model,
            eval_config,
        }
    }

    /// Evaluates an answer against the original query.
    ///
    /// Quality gate: all of completeness, accuracy and clarity must
    /// reach the configured threshold, otherwise `should_fallback` is
    /// set. Empty answers short-circuit to a fallback result without a
    /// provider call, and provider/parse failures degrade the same way.
    pub async fn evaluate(
        &self,
        answer: &str,
        original_query: &str,
        criteria: Option<&[String]>,
    ) -> EvaluationResult {
        if answer.trim().is_empty() {
            tracing::warn!("empty answer, skipping evaluation");
            return self.fallback_result("answer is empty");
        }

        let criteria = criteria.unwrap_or(&self.eval_config.criteria);
        match self.score(answer, original_query, criteria).await {
            Ok(result) => {
                tracing::info!(
                    high_quality = result.is_high_quality,
                    completeness = result.completeness,
                    accuracy = result.accuracy,
                    clarity = result.clarity,
                    "evaluation complete"
                );
                result
            }
            Err(e) => {
                tracing::error!(error = %e, "evaluation failed, using conservative fallback");
                self.fallback_result(&format!("evaluation error: {e}"))
            }
        }
    }

    /// Runs the provider evaluation and applies the quality gate.
    async fn score(
        &self,
        answer: &str,
        original_query: &str,
        criteria: &[String],
    ) -> Result<EvaluationResult> {
        let input = format!(
            "Query: {original_query}\n\nAnswer:\n{answer}\n\nCriteria: {}",
            criteria.join(", ")
        );
        let request = CompletionRequest::from_model(&self.model, EVALUATION_PROMPT, input);
        let response = self.provider.complete(&request).await?;
        self.parse_evaluation(&response)
    }

    /// Parses the provider's JSON scores and applies the gate.
    fn parse_evaluation(&self, response: &str) -> Result<EvaluationResult> {
        let value = util::parse_json(response).ok_or_else(|| RouterError::Evaluation {
            message: format!(
                "response is not JSON (preview: {:?})",
                response.chars().take(200).collect::<String>()
            ),
        })?;
        let payload: EvaluationPayload =
            serde_json::from_value(value).map_err(|e| RouterError::Evaluation {
                message: format!("unexpected evaluation shape: {e}"),
            })?;

        let completeness = payload.completeness_score.clamp(0.0, 1.0);
        let accuracy = payload.accuracy_score.clamp(0.0, 1.0);
        let clarity = payload.clarity_score.clamp(0.0, 1.0);

        let threshold = self.eval_config.quality_threshold;
        let is_high_quality =
            completeness >= threshold && accuracy >= threshold && clarity >= threshold;

        let mut metadata = Map::new();
        if !payload.reasoning.is_empty() {
            metadata.insert("reasoning".to_string(), Value::String(payload.reasoning));
        }
        metadata.insert("threshold".to_string(), Value::from(threshold));
        for (key, score) in [
            ("faithfulness_score", payload.faithfulness_score),
            ("relevance_score", payload.relevance_score),
            ("actionability_score", payload.actionability_score),
            ("overall_score", payload.overall_score),
        ] {
            if let Some(score) = score {
                metadata.insert(key.to_string(), Value::from(score.clamp(0.0, 1.0)));
            }
        }

        Ok(EvaluationResult {
            is_high_quality,
            completeness,
            accuracy,
            clarity,
            issues: payload.issues,
            should_fallback: !is_high_quality,
            metadata,
        })
    }

    /// Conservative result used for empty answers and evaluation
    /// failures.
    fn fallback_result(&self, reason: &str) -> EvaluationResult {
        let mut metadata = Map::new();
        metadata.insert(
            "fallback_reason".to_string(),
            Value::String(reason.to_string()),
        );
        metadata.insert(
            "threshold".to_string(),
            Value::from(self.eval_config.quality_threshold),
        );
        EvaluationResult {
            is_high_quality: false,
            completeness: 0.0,
            accuracy: 0.0,
            clarity: 0.0,
            issues: vec![reason.to_string()],
            should_fallback: true,
            metadata,
        }
    }
}

impl std::fmt::Debug for AnswerJudge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerJudge")
            .field("provider", &self.provider.name())
            .field("model", &self.model.name)
            .field("threshold", &self.eval_config.quality_threshold)
            .finish()
    }
}
