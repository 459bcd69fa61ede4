//! Error types for the routing pipeline.
//!
//! All failure modes are expressed as one closed [`RouterError`] sum so
//! the orchestrator boundary can match exhaustively. The guiding policy:
//! recover locally wherever the pipeline can still produce a useful
//! answer, surface an error only when no answer can be produced.

use thiserror::Error;

/// Errors produced by the routing pipeline.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The input query was empty or whitespace-only.
    #[error("query cannot be empty")]
    EmptyQuery,

    /// Query interpretation failed (provider call or response parsing).
    ///
    /// Swallowed by the interpreter, which falls back to heuristic
    /// classification. Carried here so the fallback path can log the
    /// underlying cause.
    #[error("interpretation failed: {message}")]
    Interpretation {
        /// Human-readable failure description.
        message: String,
    },

    /// The decomposer produced more subqueries than the configured limit.
    #[error("too many subqueries: {count} > {max}")]
    TooManySubqueries {
        /// Number of subqueries produced.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Two subqueries in one decomposition share an id.
    #[error("duplicate subquery id: {id}")]
    DuplicateId {
        /// The offending id.
        id: String,
    },

    /// A subquery depends on an id not present in the batch.
    #[error("subquery {id} depends on unknown subquery {dependency}")]
    DanglingDependency {
        /// The dependent subquery id.
        id: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CyclicDependency {
        /// The cycle, starting and ending at the same id.
        path: Vec<String>,
    },

    /// Query decomposition failed for a reason other than validation.
    #[error("decomposition failed: {message}")]
    Decomposition {
        /// Human-readable failure description.
        message: String,
    },

    /// No agent advertises the required capability.
    #[error("no agent found with capability '{capability}'")]
    NoAgentForCapability {
        /// The capability that could not be routed.
        capability: String,
    },

    /// An agent id was referenced that is not registered.
    #[error("agent '{agent_id}' not found in registry")]
    UnknownAgent {
        /// The missing agent id.
        agent_id: String,
    },

    /// A specialist agent invocation failed.
    ///
    /// The dispatcher converts this into a failed `AgentResponse`; it
    /// never crosses the dispatch boundary as an error.
    #[error("agent invocation failed: {message}")]
    Agent {
        /// Human-readable failure description.
        message: String,
    },

    /// The dispatch machinery itself failed (not an individual agent).
    #[error("dispatch failed: {message}")]
    Dispatch {
        /// Human-readable failure description.
        message: String,
    },

    /// Response aggregation failed.
    #[error("aggregation failed: {message}")]
    Aggregation {
        /// Human-readable failure description.
        message: String,
    },

    /// Synthesis was requested with zero responses.
    #[error("cannot synthesize with zero responses")]
    EmptySynthesis,

    /// Response synthesis failed.
    #[error("synthesis failed: {message}")]
    Synthesis {
        /// Human-readable failure description.
        message: String,
    },

    /// Answer evaluation failed.
    ///
    /// The judge degrades to a conservative fallback result instead of
    /// surfacing this; it exists for internal plumbing and logging.
    #[error("evaluation failed: {message}")]
    Evaluation {
        /// Human-readable failure description.
        message: String,
    },

    /// A completion-provider request failed.
    #[error("provider request failed: {message}")]
    Provider {
        /// Human-readable failure description.
        message: String,
    },

    /// Session store access failed.
    #[error("session store error: {message}")]
    Session {
        /// Human-readable failure description.
        message: String,
    },

    /// Configuration is missing, unreadable, or invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Human-readable failure description.
        message: String,
    },
}

impl RouterError {
    /// Short stable tag for the error kind, used in response metadata.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::Interpretation { .. } => "interpretation",
            Self::TooManySubqueries { .. } => "too_many_subqueries",
            Self::DuplicateId { .. } => "duplicate_id",
            Self::DanglingDependency { .. } => "dangling_dependency",
            Self::CyclicDependency { .. } => "cyclic_dependency",
            Self::Decomposition { .. } => "decomposition",
            Self::NoAgentForCapability { .. } => "no_agent_for_capability",
            Self::UnknownAgent { .. } => "unknown_agent",
            Self::Agent { .. } => "agent",
            Self::Dispatch { .. } => "dispatch",
            Self::Aggregation { .. } => "aggregation",
            Self::EmptySynthesis => "empty_synthesis",
            Self::Synthesis { .. } => "synthesis",
            Self::Evaluation { .. } => "evaluation",
            Self::Provider { .. } => "provider",
            Self::Session { .. } => "session",
            Self::Config { .. } => "config",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_dependency_formats_path() {
        let err = RouterError::CyclicDependency {
            path: vec!["sq1".to_string(), "sq2".to_string(), "sq1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "cyclic dependency detected: sq1 -> sq2 -> sq1"
        );
    }

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(RouterError::EmptyQuery.kind(), "empty_query");
        assert_eq!(
            RouterError::NoAgentForCapability {
                capability: "stocks".to_string()
            }
            .kind(),
            "no_agent_for_capability"
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = RouterError::TooManySubqueries { count: 12, max: 10 };
        assert_eq!(err.to_string(), "too many subqueries: 12 > 10");

        let err = RouterError::DanglingDependency {
            id: "sq3".to_string(),
            dependency: "sq9".to_string(),
        };
        assert!(err.to_string().contains("sq9"));
    }
}
