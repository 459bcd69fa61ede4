//! Query decomposition into routable subqueries.
//!
//! Complex queries are broken into atomic subqueries with capability
//! requirements and an optional dependency DAG. Validation is strict:
//! batch size limits, unique ids, no dangling dependencies, no cycles.
//! Individual malformed items in the provider output are skipped with a
//! warning; a response that is not a JSON array is a decomposition
//! failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{DecompositionConfig, ModelConfig};
use crate::error::{Result, RouterError};
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::types::{QueryComplexity, QueryIntent, RoutingPattern, Subquery};
use crate::util;

/// System prompt for query decomposition.
const DECOMPOSITION_PROMPT: &str = r#"You are a query decomposition expert. Break down the complex query into independent subqueries.

Each subquery should:
- Be atomic and independently executable
- Require one specific capability (geocoding, finance, search, etc.)
- Have clear dependencies on other subqueries (if any)

Available capabilities:
- geocoding: Address to coordinates, reverse geocoding
- finance: Stock prices, market data, financial information
- search: Web search, general knowledge queries
- local_business: Restaurant/business search and reviews
- wikipedia: Encyclopedia knowledge, definitions
- research: Academic research, in-depth analysis
- mapping: Directions, routes, map visualization

Routing patterns:
- delegation: Agent completes task and returns (most common)
- handoff: Agent handles iterative/complex interaction

Respond ONLY with a valid JSON array:
[
  {
    "id": "sq1",
    "text": "Subquery text here",
    "capability_required": "capability_name",
    "dependencies": [],
    "routing_pattern": "delegation|handoff"
  }
]

If the query needs no decomposition, return an empty array: []"#;

#[derive(Debug, Deserialize)]
struct SubqueryPayload {
    #[serde(default)]
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default = "default_capability")]
    capability_required: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    routing_pattern: String,
}

fn default_capability() -> String {
    "search".to_string()
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unseen,
    OnStack,
    Done,
}

/// Decomposes complex queries into subquery batches.
pub struct QueryDecomposer {
    provider: Arc<dyn CompletionProvider>,
    model: ModelConfig,
    limits: DecompositionConfig,
}

impl QueryDecomposer {
    /// Creates a decomposer over a provider, model and limits.
    #[must_use]
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        model: ModelConfig,
        limits: DecompositionConfig,
    ) -> Self {
        Self {
            provider,
            model,
            limits,
        }
    }

    /// Decomposes an interpreted query into subqueries.
    ///
    /// Simple queries return an empty batch without a provider call. An
    /// empty provider array also means "no decomposition needed"; the
    /// orchestrator degrades to simple handling.
    ///
    /// # Errors
    ///
    /// Returns a decomposition or validation error
    /// ([`RouterError::TooManySubqueries`], [`RouterError::DuplicateId`],
    /// [`RouterError::DanglingDependency`],
    /// [`RouterError::CyclicDependency`], [`RouterError::Decomposition`]).
    pub async fn decompose(&self, intent: &QueryIntent) -> Result<Vec<Subquery>> {
        if intent.complexity == QueryComplexity::Simple {
            tracing::debug!("simple query, no decomposition");
            return Ok(Vec::new());
        }

        let input = format!(
            "{}\n\nQuery complexity: {}\nDomains: {}\nSynthesis required: {}",
            intent.original_query,
            intent.complexity,
            intent.domains.join(", "),
            intent.requires_synthesis
        );
        let request = CompletionRequest::from_model(&self.model, DECOMPOSITION_PROMPT, input);
        let response = self.provider.complete(&request).await?;

        let subqueries = Self::parse_decomposition(intent, &response)?;
        self.validate(&subqueries)?;
        Self::validate_dependencies(&subqueries)?;

        tracing::info!(
            count = subqueries.len(),
            ids = ?subqueries.iter().map(|sq| sq.id.as_str()).collect::<Vec<_>>(),
            "query decomposed"
        );
        Ok(subqueries)
    }

    /// Parses the provider's JSON array into subqueries.
    ///
    /// Items with empty text are skipped with a warning; unknown
    /// routing patterns default to delegation; missing ids are
    /// generated positionally.
    fn parse_decomposition(intent: &QueryIntent, response: &str) -> Result<Vec<Subquery>> {
        let value = util::parse_json(response).ok_or_else(|| RouterError::Decomposition {
            message: format!(
                "response is not JSON (preview: {:?})",
                response.chars().take(200).collect::<String>()
            ),
        })?;
        let items = value.as_array().ok_or_else(|| RouterError::Decomposition {
            message: "response is not a JSON array".to_string(),
        })?;

        let mut subqueries = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let payload: SubqueryPayload = match serde_json::from_value(item.clone()) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(index = i, error = %e, "skipping malformed subquery");
                    continue;
                }
            };

            if payload.text.trim().is_empty() {
                tracing::warn!(index = i, "skipping subquery with empty text");
                continue;
            }

            let id = if payload.id.trim().is_empty() {
                format!("sq{}", i + 1)
            } else {
                payload.id
            };

            let routing_pattern = if payload.routing_pattern.is_empty() {
                RoutingPattern::Delegation
            } else {
                RoutingPattern::parse(&payload.routing_pattern).unwrap_or_else(|| {
                    tracing::warn!(
                        pattern = %payload.routing_pattern,
                        "unknown routing pattern, defaulting to delegation"
                    );
                    RoutingPattern::Delegation
                })
            };

            let mut metadata = Map::new();
            metadata.insert("index".to_string(), Value::from(i));
            metadata.insert(
                "original_query".to_string(),
                Value::String(intent.original_query.clone()),
            );

            subqueries.push(Subquery {
                id,
                text: payload.text,
                capability_required: payload.capability_required,
                dependencies: payload.dependencies,
                routing_pattern,
                metadata,
            });
        }
        Ok(subqueries)
    }

    /// Validates batch size, id uniqueness and dependency presence.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::TooManySubqueries`],
    /// [`RouterError::DuplicateId`] or [`RouterError::DanglingDependency`].
    pub fn validate(&self, subqueries: &[Subquery]) -> Result<()> {
        if subqueries.len() > self.limits.max_subqueries {
            return Err(RouterError::TooManySubqueries {
                count: subqueries.len(),
                max: self.limits.max_subqueries,
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for sq in subqueries {
            if !seen.insert(sq.id.as_str()) {
                return Err(RouterError::DuplicateId { id: sq.id.clone() });
            }
        }

        for sq in subqueries {
            for dep in &sq.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(RouterError::DanglingDependency {
                        id: sq.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validates that the dependency graph is acyclic.
    ///
    /// Pure and idempotent: iterative depth-first search with
    /// three-color marking, no side effects. Dependencies on unknown
    /// ids are treated as leaves (they are caught by [`Self::validate`]).
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::CyclicDependency`] carrying the cycle
    /// path (first node repeated at the end) when a back-edge exists.
    pub fn validate_dependencies(subqueries: &[Subquery]) -> Result<()> {
        let graph: BTreeMap<&str, &[String]> = subqueries
            .iter()
            .map(|sq| (sq.id.as_str(), sq.dependencies.as_slice()))
            .collect();

        let mut marks: BTreeMap<&str, Mark> =
            graph.keys().map(|&id| (id, Mark::Unseen)).collect();

        for sq in subqueries {
            if marks.get(sq.id.as_str()) != Some(&Mark::Unseen) {
                continue;
            }

            // Stack of (node, next-dependency index); doubles as the
            // current DFS path for cycle extraction.
            let mut stack: Vec<(&str, usize)> = vec![(sq.id.as_str(), 0)];
            marks.insert(sq.id.as_str(), Mark::OnStack);

            while let Some(top) = stack.last_mut() {
                let (node, next) = (top.0, top.1);
                let deps = graph.get(node).copied().unwrap_or(&[]);
                if next < deps.len() {
                    top.1 += 1;
                    let neighbor = deps[next].as_str();
                    match marks.get(neighbor) {
                        Some(Mark::Unseen) => {
                            marks.insert(neighbor, Mark::OnStack);
                            stack.push((neighbor, 0));
                        }
                        Some(Mark::OnStack) => {
                            let start = stack
                                .iter()
                                .position(|&(n, _)| n == neighbor)
                                .unwrap_or(0);
                            let mut path: Vec<String> = stack[start..]
                                .iter()
                                .map(|&(n, _)| n.to_string())
                                .collect();
                            path.push(neighbor.to_string());
                            return Err(RouterError::CyclicDependency { path });
                        }
                        // Done nodes and unknown ids are leaves.
                        _ => {}
                    }
                } else {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for QueryDecomposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDecomposer")
            .field("provider", &self.provider.name())
            .field("model", &self.model.name)
            .field("max_subqueries", &self.limits.max_subqueries)
            .finish()
    }
}
