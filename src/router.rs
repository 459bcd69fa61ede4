//! Capability-based agent selection.
//!
//! Maps a subquery's required capability to an agent id using a
//! capability map (agent id → advertised capabilities). Lookup order:
//! routing cache, exact reverse-index match, fuzzy substring match,
//! agent-id domain fallback. When several agents qualify, the one with
//! the fewest total capabilities wins (most specialized), alphabetical
//! on ties, so routing is deterministic for a fixed map.

use std::collections::{BTreeMap, BTreeSet};

use crate::cache::{capability_index, routing_cache};
use crate::error::{Result, RouterError};
use crate::types::{RoutingPattern, Subquery};

/// Routes subqueries to agents by capability.
pub struct CapabilityRouter {
    capability_map: BTreeMap<String, Vec<String>>,
    reverse_index: BTreeMap<String, Vec<String>>,
    use_cache: bool,
}

impl CapabilityRouter {
    /// Creates a router with the process-wide caches enabled.
    ///
    /// Seeds the global [`capability_index`] on first construction.
    #[must_use]
    pub fn new(capability_map: BTreeMap<String, Vec<String>>) -> Self {
        Self::with_cache(capability_map, true)
    }

    /// Creates a router with explicit cache behavior. Tests use
    /// `use_cache = false` to stay off the process-wide state.
    #[must_use]
    pub fn with_cache(capability_map: BTreeMap<String, Vec<String>>, use_cache: bool) -> Self {
        let mut reverse_index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (agent_id, capabilities) in &capability_map {
            for capability in capabilities {
                reverse_index
                    .entry(capability.clone())
                    .or_default()
                    .push(agent_id.clone());
            }
        }

        if use_cache {
            let index = capability_index();
            if !index.is_initialized() {
                index.initialize(&capability_map);
            }
        }

        tracing::debug!(
            agents = capability_map.len(),
            capabilities = reverse_index.len(),
            cache = use_cache,
            "capability router initialized"
        );

        Self {
            capability_map,
            reverse_index,
            use_cache,
        }
    }

    /// Routes a subquery to an agent.
    ///
    /// Positive lookups are written to the routing cache; cache hits
    /// bypass candidate search entirely. The routing pattern is taken
    /// from the subquery (delegation by default).
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::NoAgentForCapability`] when no agent
    /// qualifies after all fallbacks.
    pub fn route(&self, subquery: &Subquery) -> Result<(String, RoutingPattern)> {
        let capability = subquery.capability_required.as_str();

        if self.use_cache
            && let Some(cached) = routing_cache().get_routing(capability)
        {
            tracing::debug!(
                subquery = %subquery.id,
                capability,
                agent = %cached,
                "routing cache hit"
            );
            return Ok((cached, subquery.routing_pattern));
        }

        let candidates = self.candidates_for(capability);
        if candidates.is_empty() {
            return Err(RouterError::NoAgentForCapability {
                capability: capability.to_string(),
            });
        }

        let agent_id = self.select_best(&candidates);
        if self.use_cache {
            routing_cache().set_routing(capability, &agent_id);
        }

        tracing::info!(
            subquery = %subquery.id,
            capability,
            agent = %agent_id,
            pattern = %subquery.routing_pattern,
            "subquery routed"
        );
        Ok((agent_id, subquery.routing_pattern))
    }

    /// Finds candidate agents for a capability.
    ///
    /// Order of strategies: capability-index exact match (when caching),
    /// local exact match, fuzzy substring match in either direction,
    /// then agent ids that contain or are contained in the capability.
    #[must_use]
    pub fn candidates_for(&self, capability: &str) -> Vec<String> {
        if self.use_cache {
            let cached = capability_index().find_agents_for_capability(capability);
            if !cached.is_empty() {
                return cached;
            }
        }

        if let Some(agents) = self.reverse_index.get(capability) {
            return agents.clone();
        }

        let mut fuzzy: Vec<String> = Vec::new();
        for (indexed, agents) in &self.reverse_index {
            if indexed.contains(capability) || capability.contains(indexed.as_str()) {
                fuzzy.extend(agents.iter().cloned());
            }
        }
        if !fuzzy.is_empty() {
            tracing::debug!(capability, candidates = ?fuzzy, "fuzzy capability match");
            return fuzzy;
        }

        for agent_id in self.capability_map.keys() {
            if agent_id.contains(capability) || capability.contains(agent_id.as_str()) {
                tracing::debug!(capability, agent = %agent_id, "agent domain match");
                return vec![agent_id.clone()];
            }
        }

        Vec::new()
    }

    /// Whether at least one agent can serve a capability.
    #[must_use]
    pub fn can_route(&self, capability: &str) -> bool {
        !self.candidates_for(capability).is_empty()
    }

    /// Capabilities advertised by one agent.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownAgent`] for unregistered ids.
    pub fn capabilities_of(&self, agent_id: &str) -> Result<&[String]> {
        self.capability_map
            .get(agent_id)
            .map(Vec::as_slice)
            .ok_or_else(|| RouterError::UnknownAgent {
                agent_id: agent_id.to_string(),
            })
    }

    /// All known agent ids, sorted.
    #[must_use]
    pub fn agents(&self) -> Vec<String> {
        self.capability_map.keys().cloned().collect()
    }

    /// All distinct capabilities, sorted.
    #[must_use]
    pub fn capabilities(&self) -> Vec<String> {
        self.reverse_index
            .keys()
            .cloned()
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }

    /// Picks the most specialized candidate: fewest total capabilities,
    /// then alphabetical.
    fn select_best(&self, candidates: &[String]) -> String {
        if candidates.len() == 1 {
            return candidates[0].clone();
        }
        candidates
            .iter()
            .min_by_key(|agent_id| {
                (
                    self.capability_map
                        .get(agent_id.as_str())
                        .map_or(usize::MAX, Vec::len),
                    agent_id.as_str(),
                )
            })
            .cloned()
            .unwrap_or_else(|| candidates[0].clone())
    }
}

impl std::fmt::Debug for CapabilityRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRouter")
            .field("agents", &self.capability_map.len())
            .field("capabilities", &self.reverse_index.len())
            .field("use_cache", &self.use_cache)
            .finish()
    }
}
