//! Core data model for the routing pipeline.
//!
//! These types flow between pipeline stages: [`QueryIntent`] from the
//! interpreter, [`Subquery`] from the decomposer, [`AgentResponse`] from
//! the dispatcher, [`SynthesizedResult`] from the synthesizer and
//! [`EvaluationResult`] from the judge. The classification enums are
//! closed sums; the orchestrator matches them exhaustively.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Complexity classification of a user query, ordered from simplest
/// to hardest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryComplexity {
    /// Single, straightforward question requiring one agent.
    Simple,
    /// Multiple questions or domains, straightforward routing.
    Moderate,
    /// Multiple interdependent questions requiring synthesis.
    Complex,
}

impl QueryComplexity {
    /// Parses a complexity string (case-insensitive).
    ///
    /// Unknown values map to [`Self::Simple`], matching the lenient
    /// handling of provider output.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "moderate" => Self::Moderate,
            "complex" => Self::Complex,
            _ => Self::Simple,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

impl std::fmt::Display for QueryComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a routed subquery interacts with its target agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingPattern {
    /// The agent completes the task and returns control.
    #[default]
    Delegation,
    /// The agent takes over an iterative interaction.
    Handoff,
}

impl RoutingPattern {
    /// Parses a routing pattern string (case-insensitive).
    ///
    /// Returns `None` for unknown values so callers can decide whether
    /// to warn before defaulting to [`Self::Delegation`].
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "delegation" => Some(Self::Delegation),
            "handoff" => Some(Self::Handoff),
            _ => None,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delegation => "delegation",
            Self::Handoff => "handoff",
        }
    }
}

impl std::fmt::Display for RoutingPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final decision recorded on an [`crate::trace::ExecutionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalDecision {
    /// Pure social query answered by the conversational agent.
    Chitchat,
    /// Fast-path hit whose domains were not conversational.
    FastPath,
    /// Simple query answered directly by a single agent.
    Direct,
    /// Complex query answered by merging multiple agent responses.
    Synthesized,
    /// Quality gate rejected the answer; the fallback message was used.
    Fallback,
    /// The pipeline failed; the fallback message was used.
    Error,
}

impl FinalDecision {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chitchat => "chitchat",
            Self::FastPath => "fast_path",
            Self::Direct => "direct",
            Self::Synthesized => "synthesized",
            Self::Fallback => "fallback",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed intent and classification of a user query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryIntent {
    /// The user's original query text.
    pub original_query: String,
    /// Complexity classification.
    pub complexity: QueryComplexity,
    /// Knowledge domains involved, in classifier order. Never empty:
    /// parsing substitutes `["search"]` when the classifier returns
    /// nothing.
    pub domains: Vec<String>,
    /// Whether multiple responses must be merged into one answer.
    pub requires_synthesis: bool,
    /// Opaque provenance and debugging data (fast-path pattern name,
    /// classifier reasoning, heuristic counters).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl QueryIntent {
    /// Returns `true` when the intent's domains mark it as pure
    /// social conversation.
    #[must_use]
    pub fn is_chitchat(&self) -> bool {
        self.domains
            .iter()
            .any(|d| d == "conversation" || d == "social")
    }
}

/// A decomposed unit of work to be routed to one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subquery {
    /// Identifier unique within one decomposition.
    pub id: String,
    /// Natural-language subquery text.
    pub text: String,
    /// Capability keyword the target agent must advertise.
    pub capability_required: String,
    /// Ids of subqueries that must complete before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Delegation or handoff.
    #[serde(default)]
    pub routing_pattern: RoutingPattern,
    /// Additional context (decomposition index, original query).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Token usage reported by a provider or agent invocation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated in the completion.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

/// Execution metadata attached to an [`AgentResponse`] by the dispatcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Wall-clock execution time in seconds, including retries.
    pub execution_time: f64,
    /// Number of attempts made (1 = no retries).
    pub attempts: u32,
    /// Display name of the agent that handled the subquery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Routing pattern the subquery was dispatched with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_pattern: Option<RoutingPattern>,
    /// Token usage, when the agent reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// The deadline in seconds that applied to each attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Stable tag of the terminal error kind for failed responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

/// Result of dispatching one subquery to one agent.
///
/// Owned by the dispatcher until handed to the aggregator; immutable
/// thereafter. A failed invocation is a value, not an error: `success`
/// is `false` and `error` carries the terminal failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Id of the subquery this responds to.
    pub subquery_id: String,
    /// Id of the agent that produced the response.
    pub agent_id: String,
    /// Response text. Non-empty whenever `success` is `true`.
    pub content: String,
    /// Whether the agent handled the subquery successfully.
    pub success: bool,
    /// Terminal error description. Set whenever `success` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution metadata (timing, attempts, usage).
    #[serde(default)]
    pub metadata: ResponseMeta,
}

impl AgentResponse {
    /// Builds a successful response.
    #[must_use]
    pub fn success(
        subquery_id: impl Into<String>,
        agent_id: impl Into<String>,
        content: impl Into<String>,
        metadata: ResponseMeta,
    ) -> Self {
        Self {
            subquery_id: subquery_id.into(),
            agent_id: agent_id.into(),
            content: content.into(),
            success: true,
            error: None,
            metadata,
        }
    }

    /// Builds a failed response.
    #[must_use]
    pub fn failure(
        subquery_id: impl Into<String>,
        agent_id: impl Into<String>,
        error: impl Into<String>,
        metadata: ResponseMeta,
    ) -> Self {
        Self {
            subquery_id: subquery_id.into(),
            agent_id: agent_id.into(),
            content: String::new(),
            success: false,
            error: Some(error.into()),
            metadata,
        }
    }
}

/// Final merged answer produced by the synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedResult {
    /// The synthesized answer text.
    pub answer: String,
    /// Distinct agent ids that contributed, sorted.
    pub sources: Vec<String>,
    /// Confidence in the synthesis, clamped to `[0, 1]`.
    pub confidence: f64,
    /// Conflicts the synthesizer reported resolving.
    #[serde(default)]
    pub conflicts_resolved: Vec<String>,
    /// Additional synthesis metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Quality evaluation of a final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Whether all gated scores met the quality threshold.
    pub is_high_quality: bool,
    /// Completeness score in `[0, 1]`.
    pub completeness: f64,
    /// Accuracy score in `[0, 1]`.
    pub accuracy: f64,
    /// Clarity score in `[0, 1]`.
    pub clarity: f64,
    /// Identified quality issues.
    #[serde(default)]
    pub issues: Vec<String>,
    /// Whether the configured fallback message should replace the answer.
    pub should_fallback: bool,
    /// Additional evaluation metadata (reasoning, secondary scores).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_parse() {
        assert_eq!(QueryComplexity::parse("SIMPLE"), QueryComplexity::Simple);
        assert_eq!(
            QueryComplexity::parse("Moderate"),
            QueryComplexity::Moderate
        );
        assert_eq!(QueryComplexity::parse("complex"), QueryComplexity::Complex);
        assert_eq!(QueryComplexity::parse("garbage"), QueryComplexity::Simple);
    }

    #[test]
    fn test_complexity_ordering() {
        assert!(QueryComplexity::Simple < QueryComplexity::Moderate);
        assert!(QueryComplexity::Moderate < QueryComplexity::Complex);
    }

    #[test]
    fn test_routing_pattern_parse() {
        assert_eq!(
            RoutingPattern::parse("delegation"),
            Some(RoutingPattern::Delegation)
        );
        assert_eq!(
            RoutingPattern::parse("HANDOFF"),
            Some(RoutingPattern::Handoff)
        );
        assert_eq!(RoutingPattern::parse("broadcast"), None);
        assert_eq!(RoutingPattern::default(), RoutingPattern::Delegation);
    }

    #[test]
    fn test_final_decision_serialization() {
        let json = serde_json::to_string(&FinalDecision::FastPath).unwrap_or_default();
        assert_eq!(json, "\"fast_path\"");
        let json = serde_json::to_string(&FinalDecision::Synthesized).unwrap_or_default();
        assert_eq!(json, "\"synthesized\"");
    }

    #[test]
    fn test_intent_chitchat_detection() {
        let intent = QueryIntent {
            original_query: "hello".to_string(),
            complexity: QueryComplexity::Simple,
            domains: vec!["conversation".to_string(), "social".to_string()],
            requires_synthesis: false,
            metadata: Map::new(),
        };
        assert!(intent.is_chitchat());

        let intent = QueryIntent {
            domains: vec!["finance".to_string()],
            ..intent
        };
        assert!(!intent.is_chitchat());
    }

    #[test]
    fn test_agent_response_builders() {
        let ok = AgentResponse::success("sq1", "geo", "48.85, 2.35", ResponseMeta::default());
        assert!(ok.success);
        assert!(ok.error.is_none());
        assert!(!ok.content.is_empty());

        let failed = AgentResponse::failure("sq2", "finance", "boom", ResponseMeta::default());
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.content.is_empty());
    }

    #[test]
    fn test_response_meta_skips_empty_fields() {
        let json = serde_json::to_string(&ResponseMeta::default()).unwrap_or_default();
        assert!(!json.contains("usage"));
        assert!(!json.contains("agent_name"));
        assert!(json.contains("attempts"));
    }

    #[test]
    fn test_subquery_deserialization_defaults() {
        let json = r#"{"id": "sq1", "text": "find it", "capability_required": "search"}"#;
        let sq: Subquery = serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert!(sq.dependencies.is_empty());
        assert_eq!(sq.routing_pattern, RoutingPattern::Delegation);
    }
}
