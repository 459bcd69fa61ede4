//! The SmartRouter pipeline driver.
//!
//! Coordinates the full query pipeline: fast-path pre-classification,
//! interpretation, decomposition, capability routing, concurrent
//! dispatch, aggregation, synthesis and quality evaluation. Every stage
//! runs under a scoped trace timer, and no error leaks past
//! [`SmartRouter::route_query`]: total failure still returns a
//! well-formed [`ExecutionResult`] carrying the fallback message.
//!
//! ```text
//! query ─► FastPath ─► Interpreter ─► Decomposer ─► Router ─► Dispatcher ─► Aggregator ─► Synthesizer ─► Judge ─► answer
//!                                    (skipped if simple)     (per subquery)  (fan-in)    (skip if 1)   (skip if chitchat)
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};

use crate::agent::AgentRegistry;
use crate::aggregator::ResponseAggregator;
use crate::cache::performance_metrics;
use crate::config::SmartRouterConfig;
use crate::decomposer::QueryDecomposer;
use crate::dispatcher::SubqueryDispatcher;
use crate::domain;
use crate::error::{Result, RouterError};
use crate::fast_path::FastPathRouter;
use crate::interpreter::QueryInterpreter;
use crate::judge::AnswerJudge;
use crate::provider::CompletionProvider;
use crate::router::CapabilityRouter;
use crate::session::Session;
use crate::synthesizer::ResultSynthesizer;
use crate::trace::{ExecutionResult, TraceCapture};
use crate::types::{FinalDecision, QueryComplexity, QueryIntent};

/// Agent id preferred for conversational queries when it is among the
/// candidates for the `conversation` capability.
const CHITCHAT_AGENT_ID: &str = "chitchat";

/// What the pipeline decided, before packaging into an
/// [`ExecutionResult`].
struct PipelineOutcome {
    answer: String,
    decision: FinalDecision,
    original_answer: Option<String>,
}

/// Multi-agent query orchestrator.
///
/// Owns one instance of every pipeline component. Construction
/// validates the configuration; a disabled configuration is an error.
/// Attach a [`Session`] to share conversation memory across every agent
/// invoked in the conversation.
pub struct SmartRouter {
    config: SmartRouterConfig,
    registry: Arc<AgentRegistry>,
    fast_path: FastPathRouter,
    interpreter: QueryInterpreter,
    decomposer: QueryDecomposer,
    router: CapabilityRouter,
    dispatcher: SubqueryDispatcher,
    aggregator: ResponseAggregator,
    synthesizer: ResultSynthesizer,
    judge: AnswerJudge,
    session: Option<Session>,
}

impl SmartRouter {
    /// Creates a router from configuration, a completion provider and
    /// an agent registry.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] when validation fails or the
    /// configuration is disabled.
    pub fn new(
        config: SmartRouterConfig,
        provider: Arc<dyn CompletionProvider>,
        registry: Arc<AgentRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        if !config.enabled {
            return Err(RouterError::Config {
                message: "router is disabled in configuration".to_string(),
            });
        }

        let interpreter = QueryInterpreter::new(
            Arc::clone(&provider),
            config.models.interpretation.clone(),
        );
        let decomposer = QueryDecomposer::new(
            Arc::clone(&provider),
            config.models.decomposition.clone(),
            config.decomposition.clone(),
        );
        let router = CapabilityRouter::new(config.capabilities.clone());
        let dispatcher = SubqueryDispatcher::new(Arc::clone(&registry), &config.error_handling);
        let synthesizer =
            ResultSynthesizer::new(Arc::clone(&provider), config.models.synthesis.clone());
        let judge = AnswerJudge::new(
            provider,
            config.models.evaluation.clone(),
            config.evaluation.clone(),
        );

        tracing::info!(
            agents = config.capabilities.len(),
            "router initialized"
        );

        Ok(Self {
            config,
            registry,
            fast_path: FastPathRouter::new(),
            interpreter,
            decomposer,
            router,
            dispatcher,
            aggregator: ResponseAggregator::new(),
            synthesizer,
            judge,
            session: None,
        })
    }

    /// Attaches a conversation session shared by all agent invocations.
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.dispatcher = self.dispatcher.clone().with_session(session.clone());
        self.session = Some(session);
        self
    }

    /// The configured capability map, for introspection.
    #[must_use]
    pub fn capabilities(&self) -> &std::collections::BTreeMap<String, Vec<String>> {
        &self.config.capabilities
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SmartRouterConfig {
        &self.config
    }

    /// The fast-path pre-classifier (metrics, pattern listing).
    #[must_use]
    pub fn fast_path(&self) -> &FastPathRouter {
        &self.fast_path
    }

    /// Mutable fast-path access for pattern management at setup time.
    pub fn fast_path_mut(&mut self) -> &mut FastPathRouter {
        &mut self.fast_path
    }

    /// Routes and executes a query through the full pipeline.
    ///
    /// Never fails: any error is caught at this boundary and mapped to
    /// a fallback [`ExecutionResult`] with `success = false`,
    /// `final_decision = error` and the traces collected so far. The
    /// optional `context` value is recorded into the first trace.
    pub async fn route_query(&self, query: &str, context: Option<Value>) -> ExecutionResult {
        let mut capture = TraceCapture::new();
        let mut agents_used: Vec<String> = Vec::new();

        tracing::info!(
            query = %query.chars().take(100).collect::<String>(),
            "processing query"
        );

        let outcome = self
            .run_pipeline(query, context, &mut capture, &mut agents_used)
            .await;
        let total_time = capture.total_time();
        performance_metrics().record("total", total_time);

        match outcome {
            Ok(outcome) => {
                tracing::info!(
                    decision = %outcome.decision,
                    total_time,
                    "query completed"
                );
                ExecutionResult {
                    answer: outcome.answer,
                    traces: capture.into_traces(),
                    total_time,
                    final_decision: outcome.decision,
                    agents_used,
                    success: true,
                    original_answer: outcome.original_answer,
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "pipeline failed, returning fallback");
                ExecutionResult {
                    answer: self.config.evaluation.fallback_message.clone(),
                    traces: capture.into_traces(),
                    total_time,
                    final_decision: FinalDecision::Error,
                    agents_used,
                    success: false,
                    original_answer: None,
                }
            }
        }
    }

    /// The fallible pipeline body; `route_query` is its error boundary.
    async fn run_pipeline(
        &self,
        query: &str,
        context: Option<Value>,
        capture: &mut TraceCapture,
        agents_used: &mut Vec<String>,
    ) -> Result<PipelineOutcome> {
        // Step 0: regex pre-classification, no LLM involved.
        let fast_intent = capture
            .run("fast_path", async {
                let hit = self.fast_path.try_fast_path(query);
                let mut data = match &hit {
                    Some(intent) => as_object(json!({
                        "matched": true,
                        "pattern": intent.metadata.get("fast_path_pattern").cloned(),
                        "confidence": intent.metadata.get("fast_path_confidence").cloned(),
                        "domains": intent.domains,
                    })),
                    None => as_object(json!({"matched": false, "fallthrough": true})),
                };
                if let Some(context) = &context {
                    data.insert("context".to_string(), context.clone());
                }
                Ok((hit, data))
            })
            .await?;

        if let Some(intent) = fast_intent {
            let (answer, agent_id) = self.handle_simple(&intent, capture).await?;
            agents_used.push(agent_id);
            let decision = if intent.is_chitchat() {
                FinalDecision::Chitchat
            } else {
                FinalDecision::FastPath
            };
            tracing::info!(decision = %decision, "fast-path hit, skipping evaluation");
            return Ok(PipelineOutcome {
                answer,
                decision,
                original_answer: None,
            });
        }

        // Step 1: LLM interpretation.
        let intent = capture
            .run("interpretation", async {
                let intent = self.interpreter.interpret(query).await?;
                let data = as_object(json!({
                    "intent": {
                        "complexity": intent.complexity.as_str(),
                        "domains": intent.domains,
                        "requires_synthesis": intent.requires_synthesis,
                    }
                }));
                Ok((intent, data))
            })
            .await?;

        let chitchat = intent.is_chitchat();

        // Step 2: execute by complexity.
        let answer = if intent.complexity == QueryComplexity::Simple {
            let (answer, agent_id) = self.handle_simple(&intent, capture).await?;
            agents_used.push(agent_id);
            answer
        } else {
            self.handle_complex(&intent, capture, agents_used).await?
        };

        // Step 3: chitchat is always acceptable; skip evaluation.
        if chitchat {
            tracing::info!("chitchat query, skipping evaluation");
            return Ok(PipelineOutcome {
                answer,
                decision: FinalDecision::Chitchat,
                original_answer: None,
            });
        }

        // Step 4: quality gate.
        let threshold = self.config.evaluation.quality_threshold;
        let evaluation = capture
            .run("evaluation", async {
                let evaluation = self.judge.evaluate(&answer, query, None).await;
                let issues = if evaluation.should_fallback {
                    evaluation.issues.clone()
                } else {
                    Vec::new()
                };
                let data = as_object(json!({
                    "passed": !evaluation.should_fallback,
                    "is_high_quality": evaluation.is_high_quality,
                    "issues": issues,
                    "scores": {
                        "completeness": evaluation.completeness,
                        "accuracy": evaluation.accuracy,
                        "clarity": evaluation.clarity,
                    },
                    "threshold": threshold,
                }));
                Ok((evaluation, data))
            })
            .await?;

        if evaluation.should_fallback {
            tracing::warn!(issues = ?evaluation.issues, "quality below threshold, using fallback");
            return Ok(PipelineOutcome {
                answer: self.config.evaluation.fallback_message.clone(),
                decision: FinalDecision::Fallback,
                original_answer: Some(answer),
            });
        }

        let decision = if agents_used.len() > 1 {
            FinalDecision::Synthesized
        } else {
            FinalDecision::Direct
        };
        Ok(PipelineOutcome {
            answer,
            decision,
            original_answer: None,
        })
    }

    /// Routes a simple query directly to one agent.
    ///
    /// Returns the answer and the agent id used.
    async fn handle_simple(
        &self,
        intent: &QueryIntent,
        capture: &mut TraceCapture,
    ) -> Result<(String, String)> {
        let (capability, agent_id) = self.select_simple_agent(intent)?;
        tracing::info!(capability = %capability, agent = %agent_id, "routing simple query");

        capture
            .run("routing", async {
                let data = as_object(json!({
                    "pattern": "SIMPLE",
                    "agent": agent_id,
                    "capability": capability,
                    "domains": intent.domains,
                }));
                Ok(((), data))
            })
            .await?;

        let answer = capture
            .run("execution", async {
                let agent =
                    self.registry
                        .get(&agent_id)
                        .ok_or_else(|| RouterError::UnknownAgent {
                            agent_id: agent_id.clone(),
                        })?;
                let started = Instant::now();
                let reply = agent
                    .invoke(&intent.original_query, self.session.as_ref())
                    .await?;
                let data = as_object(json!({
                    "agents": [agent_id],
                    "success": true,
                    "agent_executions": [{
                        "agent_id": agent_id,
                        "subquery_id": "direct",
                        "success": true,
                        "error": null,
                    }],
                    "execution_duration": started.elapsed().as_secs_f64(),
                    "concurrent": false,
                }));
                Ok((reply.content, data))
            })
            .await?;

        Ok((answer, agent_id))
    }

    /// Picks the capability and agent for a simple query using domain
    /// prioritization, with per-domain fallbacks and a final `search`
    /// fallback.
    fn select_simple_agent(&self, intent: &QueryIntent) -> Result<(String, String)> {
        // Conversational queries go to the conversational agent when
        // one exists, regardless of other candidates.
        if intent.is_chitchat() {
            let capability = "conversation".to_string();
            let candidates = self.router.candidates_for(&capability);
            let agent_id = if candidates.iter().any(|id| id == CHITCHAT_AGENT_ID) {
                Some(CHITCHAT_AGENT_ID.to_string())
            } else {
                candidates.first().cloned()
            };
            return agent_id
                .map(|id| (capability.clone(), id))
                .ok_or(RouterError::NoAgentForCapability { capability });
        }

        let mut capability = domain::primary_domain(&intent.domains)
            .map_or("search", domain::domain_capability)
            .to_string();

        if !self.router.can_route(&capability) {
            tracing::warn!(capability = %capability, "primary capability unroutable, trying alternatives");

            let mut by_priority: Vec<&String> = intent.domains.iter().collect();
            by_priority.sort_by_key(|d| std::cmp::Reverse(domain::domain_priority(d.as_str())));

            for alternative in by_priority {
                let alt_capability = domain::domain_capability(alternative);
                if alt_capability != capability && self.router.can_route(alt_capability) {
                    tracing::info!(
                        domain = %alternative,
                        capability = alt_capability,
                        "using alternative domain"
                    );
                    let agent = self.router.candidates_for(alt_capability).first().cloned();
                    if let Some(agent_id) = agent {
                        return Ok((alt_capability.to_string(), agent_id));
                    }
                }
            }

            tracing::warn!("no domain routable, falling back to 'search'");
            capability = "search".to_string();
        }

        self.router
            .candidates_for(&capability)
            .first()
            .cloned()
            .map(|agent_id| (capability.clone(), agent_id))
            .ok_or(RouterError::NoAgentForCapability { capability })
    }

    /// Runs the full decompose → route → dispatch → aggregate →
    /// synthesize pipeline for a non-simple query.
    async fn handle_complex(
        &self,
        intent: &QueryIntent,
        capture: &mut TraceCapture,
        agents_used: &mut Vec<String>,
    ) -> Result<String> {
        // Decomposition.
        let subqueries = capture
            .run("decomposition", async {
                let subqueries = self.decomposer.decompose(intent).await?;
                let data = if subqueries.is_empty() {
                    as_object(json!({"subquery_count": 0, "fallback_to_simple": true}))
                } else {
                    let listed: Vec<Value> = subqueries
                        .iter()
                        .map(|sq| {
                            json!({
                                "id": sq.id,
                                "text": sq.text,
                                "capability": sq.capability_required,
                            })
                        })
                        .collect();
                    as_object(json!({
                        "subquery_count": subqueries.len(),
                        "subqueries": listed,
                    }))
                };
                Ok((subqueries, data))
            })
            .await?;

        if subqueries.is_empty() {
            tracing::info!("decomposer returned no subqueries, treating as simple");
            let (answer, agent_id) = self.handle_simple(intent, capture).await?;
            agents_used.push(agent_id);
            return Ok(answer);
        }

        // Routing.
        let routed = capture
            .run("routing", async {
                let mut routed = Vec::with_capacity(subqueries.len());
                let mut routing_map = Map::new();
                let mut selected: Vec<String> = Vec::new();
                for subquery in &subqueries {
                    let (agent_id, pattern) = self.router.route(subquery)?;
                    routing_map
                        .insert(subquery.id.clone(), Value::String(agent_id.clone()));
                    if !selected.contains(&agent_id) {
                        selected.push(agent_id.clone());
                    }
                    tracing::debug!(
                        subquery = %subquery.id,
                        capability = %subquery.capability_required,
                        agent = %agent_id,
                        pattern = %pattern,
                        "subquery routed"
                    );
                    routed.push((subquery.clone(), agent_id));
                }
                let data = as_object(json!({
                    "routing": routing_map,
                    "agents_selected": selected,
                }));
                Ok((routed, data))
            })
            .await?;

        for (_, agent_id) in &routed {
            if !agents_used.contains(agent_id) {
                agents_used.push(agent_id.clone());
            }
        }

        // Concurrent execution.
        let responses = capture
            .run("execution", async {
                let started = Instant::now();
                let responses = self
                    .dispatcher
                    .dispatch_all(routed.clone(), Some(self.config.error_handling.timeout()))
                    .await?;
                let execution_duration = started.elapsed().as_secs_f64();

                let agent_executions: Vec<Value> = routed
                    .iter()
                    .zip(&responses)
                    .map(|((subquery, agent_id), response)| {
                        json!({
                            "agent_id": agent_id,
                            "subquery_id": subquery.id,
                            "success": response.success,
                            "error": response.error,
                        })
                    })
                    .collect();
                let agents: Vec<&str> = routed
                    .iter()
                    .map(|(_, agent_id)| agent_id.as_str())
                    .collect();

                let data = as_object(json!({
                    "response_count": responses.len(),
                    "agents": agents,
                    "success": responses.iter().all(|r| r.success),
                    "agent_executions": agent_executions,
                    "execution_duration": execution_duration,
                    "concurrent": routed.len() > 1,
                }));
                Ok((responses, data))
            })
            .await?;

        // Aggregation and success filtering.
        let aggregated = self.aggregator.aggregate(responses, &subqueries)?;
        let successful = self.aggregator.extract_successful(&aggregated);

        if successful.is_empty() {
            tracing::warn!("no successful responses, using fallback message");
            return Ok(self.config.evaluation.fallback_message.clone());
        }

        // Synthesis.
        let synthesized = capture
            .run("synthesis", async {
                let synthesized = self
                    .synthesizer
                    .synthesize(&successful, &intent.original_query)
                    .await?;
                let data = as_object(json!({
                    "synthesized_from": aggregated.len(),
                    "confidence": synthesized.confidence,
                    "sources": synthesized.sources,
                }));
                Ok((synthesized, data))
            })
            .await?;

        Ok(synthesized.answer)
    }
}

impl std::fmt::Debug for SmartRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartRouter")
            .field("agents", &self.config.capabilities.len())
            .field("registry", &self.registry.len())
            .field("session", &self.session.as_ref().map(Session::id))
            .finish()
    }
}

/// Unwraps a `json!` object literal into its map.
fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
