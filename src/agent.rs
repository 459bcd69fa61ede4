//! Specialist-agent invocation contract.
//!
//! The orchestrator treats specialist agents (geocoding, finance,
//! search, ...) as external collaborators behind one narrow trait:
//! subquery text plus an optional shared conversation session in, final
//! text plus optional usage counters out. Transport, timeout and domain
//! errors surface as errors; the dispatcher converts them into failed
//! responses.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ModelConfig;
use crate::error::{Result, RouterError};
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::session::Session;
use crate::types::TokenUsage;

/// Result of one specialist-agent invocation.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// The agent's final text.
    pub content: String,
    /// Token usage, when the agent reports it.
    pub usage: Option<TokenUsage>,
}

/// Trait implemented by every specialist agent.
///
/// When a session is supplied, the agent must use *that* session: all
/// agents in one conversation share a single log so cross-agent context
/// stays visible.
#[async_trait]
pub trait SpecialistAgent: Send + Sync {
    /// Stable agent id used in capability maps and routing.
    fn id(&self) -> &str;

    /// Display name for logging. Defaults to the id.
    fn name(&self) -> &str {
        self.id()
    }

    /// Executes the agent against an input.
    ///
    /// # Errors
    ///
    /// Returns a [`RouterError`] on transport, timeout, or domain
    /// failures; the dispatcher converts these to failed responses.
    async fn invoke(&self, input: &str, session: Option<&Session>) -> Result<AgentReply>;
}

/// Registry of available specialist agents, keyed by id.
#[derive(Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<dyn SpecialistAgent>>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent, replacing any previous agent with the same id.
    pub fn register(&mut self, agent: Arc<dyn SpecialistAgent>) {
        self.agents.insert(agent.id().to_string(), agent);
    }

    /// Looks up an agent by id.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn SpecialistAgent>> {
        self.agents.get(agent_id).cloned()
    }

    /// Registered agent ids, sorted.
    #[must_use]
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.agent_ids())
            .finish()
    }
}

/// Specialist agent backed by a completion provider.
///
/// Useful as a demo/default implementation: the agent's role is fixed
/// by its instructions and every invocation is a single completion.
/// Real deployments register their own [`SpecialistAgent`]
/// implementations instead.
pub struct CompletionAgent {
    id: String,
    instructions: String,
    provider: Arc<dyn CompletionProvider>,
    model: ModelConfig,
}

impl CompletionAgent {
    /// Creates a completion-backed agent.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        instructions: impl Into<String>,
        provider: Arc<dyn CompletionProvider>,
        model: ModelConfig,
    ) -> Self {
        Self {
            id: id.into(),
            instructions: instructions.into(),
            provider,
            model,
        }
    }
}

#[async_trait]
impl SpecialistAgent for CompletionAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, input: &str, session: Option<&Session>) -> Result<AgentReply> {
        let mut request = CompletionRequest::from_model(&self.model, &self.instructions, input);
        if let Some(session) = session {
            request = request.with_session(session.clone());
        }
        let content = self.provider.complete(&request).await?;
        if content.trim().is_empty() {
            return Err(RouterError::Agent {
                message: format!("agent '{}' returned empty content", self.id),
            });
        }
        Ok(AgentReply {
            content,
            usage: None,
        })
    }
}

impl std::fmt::Debug for CompletionAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionAgent")
            .field("id", &self.id)
            .field("model", &self.model.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticAgent {
        id: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl SpecialistAgent for StaticAgent {
        fn id(&self) -> &str {
            self.id
        }

        async fn invoke(&self, _input: &str, _session: Option<&Session>) -> Result<AgentReply> {
            Ok(AgentReply {
                content: self.reply.to_string(),
                usage: None,
            })
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = AgentRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(StaticAgent {
            id: "geo",
            reply: "48.85, 2.35",
        }));
        registry.register(Arc::new(StaticAgent {
            id: "finance",
            reply: "AAPL: $230",
        }));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.agent_ids(), vec!["finance", "geo"]);
        assert!(registry.get("geo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_replaces_same_id() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(StaticAgent {
            id: "geo",
            reply: "old",
        }));
        registry.register(Arc::new(StaticAgent {
            id: "geo",
            reply: "new",
        }));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_static_agent_invocation() {
        let agent = StaticAgent {
            id: "geo",
            reply: "48.85, 2.35",
        };
        let reply = agent.invoke("coordinates of Paris", None).await;
        assert_eq!(
            reply.map(|r| r.content).unwrap_or_default(),
            "48.85, 2.35"
        );
    }
}
