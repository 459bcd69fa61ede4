//! Response collection and organization.
//!
//! Keys dispatcher responses by subquery id, drops duplicates (first
//! wins), logs missing responses, and offers success/failure filters
//! plus simple statistics.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{Result, RouterError};
use crate::types::{AgentResponse, Subquery};

/// Counts over an aggregated response map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResponseStatistics {
    /// All aggregated responses.
    pub total: usize,
    /// Responses with `success = true`.
    pub successful: usize,
    /// Responses with `success = false`.
    pub failed: usize,
}

/// Aggregates agent responses by subquery id.
#[derive(Debug, Default)]
pub struct ResponseAggregator;

impl ResponseAggregator {
    /// Creates an aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Keys responses by subquery id.
    ///
    /// Duplicate responses for one id keep the first and drop (but
    /// count) the rest. Subqueries without a response are logged and
    /// simply absent from the output.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Aggregation`] when a response carries an
    /// empty subquery id, with counts in the message.
    pub fn aggregate(
        &self,
        responses: Vec<AgentResponse>,
        subqueries: &[Subquery],
    ) -> Result<BTreeMap<String, AgentResponse>> {
        tracing::debug!(
            responses = responses.len(),
            subqueries = subqueries.len(),
            "aggregating responses"
        );

        let response_count = responses.len();
        let mut aggregated: BTreeMap<String, AgentResponse> = BTreeMap::new();
        let mut duplicates = 0_usize;

        for response in responses {
            if response.subquery_id.trim().is_empty() {
                return Err(RouterError::Aggregation {
                    message: format!(
                        "response from agent '{}' has an empty subquery id \
                         ({response_count} responses, {} subqueries)",
                        response.agent_id,
                        subqueries.len()
                    ),
                });
            }
            if aggregated.contains_key(&response.subquery_id) {
                tracing::warn!(
                    subquery = %response.subquery_id,
                    "duplicate response, keeping first"
                );
                duplicates += 1;
                continue;
            }
            aggregated.insert(response.subquery_id.clone(), response);
        }

        let missing: BTreeSet<&str> = subqueries
            .iter()
            .map(|sq| sq.id.as_str())
            .filter(|id| !aggregated.contains_key(*id))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "missing responses for subqueries");
        }

        let successful = aggregated.values().filter(|r| r.success).count();
        tracing::info!(
            total = aggregated.len(),
            successful,
            failed = aggregated.len() - successful,
            duplicates,
            "responses aggregated"
        );
        Ok(aggregated)
    }

    /// Only the successful responses.
    #[must_use]
    pub fn extract_successful(
        &self,
        aggregated: &BTreeMap<String, AgentResponse>,
    ) -> BTreeMap<String, AgentResponse> {
        let successful: BTreeMap<String, AgentResponse> = aggregated
            .iter()
            .filter(|(_, r)| r.success)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        tracing::debug!(
            successful = successful.len(),
            total = aggregated.len(),
            "extracted successful responses"
        );
        successful
    }

    /// Only the failed responses.
    #[must_use]
    pub fn failed_responses(
        &self,
        aggregated: &BTreeMap<String, AgentResponse>,
    ) -> BTreeMap<String, AgentResponse> {
        aggregated
            .iter()
            .filter(|(_, r)| !r.success)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    /// Total/successful/failed counts.
    #[must_use]
    pub fn response_statistics(
        &self,
        aggregated: &BTreeMap<String, AgentResponse>,
    ) -> ResponseStatistics {
        let successful = aggregated.values().filter(|r| r.success).count();
        ResponseStatistics {
            total: aggregated.len(),
            successful,
            failed: aggregated.len() - successful,
        }
    }
}
