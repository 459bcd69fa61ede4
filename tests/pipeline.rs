//! End-to-end pipeline tests with scripted providers and test-double
//! agents.
//!
//! The scripted provider dispatches on the stage system prompt, so each
//! test controls exactly what the interpreter, decomposer, synthesizer
//! and judge see. Capability names and agent ids are consistent across
//! tests because the capability index and routing cache are
//! process-wide.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use switchyard::{
    AgentRegistry, AgentReply, CompletionProvider, CompletionRequest, ExecutionResult,
    FinalDecision, Result, RouterError, Session, SessionStore, SmartRouter, SmartRouterConfig,
    SpecialistAgent, SubqueryDispatcher,
};

const FALLBACK_MESSAGE: &str = "I could not find a reliable answer.";

const HIGH_EVALUATION: &str = r#"{"completeness_score": 0.9, "accuracy_score": 0.9, "clarity_score": 0.9, "issues": [], "reasoning": "good"}"#;
const LOW_EVALUATION: &str = r#"{"completeness_score": 0.3, "accuracy_score": 0.4, "clarity_score": 0.5, "issues": ["too vague"], "reasoning": "weak"}"#;

/// Provider scripted per pipeline stage; unscripted stages fail.
#[derive(Default)]
struct StageProvider {
    interpretation: Option<String>,
    decomposition: Option<String>,
    synthesis: Option<String>,
    evaluation: Option<String>,
}

impl StageProvider {
    fn new() -> Self {
        Self::default()
    }

    fn interpretation(mut self, response: &str) -> Self {
        self.interpretation = Some(response.to_string());
        self
    }

    fn decomposition(mut self, response: &str) -> Self {
        self.decomposition = Some(response.to_string());
        self
    }

    fn synthesis(mut self, response: &str) -> Self {
        self.synthesis = Some(response.to_string());
        self
    }

    fn evaluation(mut self, response: &str) -> Self {
        self.evaluation = Some(response.to_string());
        self
    }
}

#[async_trait]
impl CompletionProvider for StageProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let scripted = if request.system.contains("query analysis expert") {
            &self.interpretation
        } else if request.system.contains("query decomposition expert") {
            &self.decomposition
        } else if request.system.contains("response synthesis expert") {
            &self.synthesis
        } else if request.system.contains("answer quality evaluator") {
            &self.evaluation
        } else {
            &None
        };
        scripted.clone().ok_or_else(|| RouterError::Provider {
            message: format!(
                "unscripted provider call (system prompt: {:?})",
                request.system.chars().take(60).collect::<String>()
            ),
        })
    }
}

/// Agent that returns a fixed reply.
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

/// Agent that only completes when its partner runs concurrently.
struct BarrierAgent {
    id: &'static str,
    reply: &'static str,
    barrier: Arc<tokio::sync::Barrier>,
}

#[async_trait]
impl SpecialistAgent for BarrierAgent {
    fn id(&self) -> &str {
        self.id
    }

    async fn invoke(&self, _input: &str, _session: Option<&Session>) -> Result<AgentReply> {
        self.barrier.wait().await;
        Ok(AgentReply {
            content: self.reply.to_string(),
            usage: None,
        })
    }
}

/// Agent that always fails.
struct BrokenAgent {
    id: &'static str,
}

#[async_trait]
impl SpecialistAgent for BrokenAgent {
    fn id(&self) -> &str {
        self.id
    }

    async fn invoke(&self, _input: &str, _session: Option<&Session>) -> Result<AgentReply> {
        Err(RouterError::Agent {
            message: "upstream service unavailable".to_string(),
        })
    }
}

/// Agent that records its turn in the shared session and reports how
/// many prior messages it saw.
struct SessionAgent {
    id: &'static str,
}

#[async_trait]
impl SpecialistAgent for SessionAgent {
    fn id(&self) -> &str {
        self.id
    }

    async fn invoke(&self, input: &str, session: Option<&Session>) -> Result<AgentReply> {
        let prior = match session {
            Some(session) => session.history()?.len(),
            None => 0,
        };
        if let Some(session) = session {
            session.append(switchyard::MessageRole::User, input)?;
            session.append(
                switchyard::MessageRole::Assistant,
                &format!("{} answered", self.id),
            )?;
        }
        Ok(AgentReply {
            content: format!("{} saw {prior} prior messages", self.id),
            usage: None,
        })
    }
}

fn capability_map() -> BTreeMap<String, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert("chitchat".to_string(), vec!["conversation".to_string()]);
    map.insert(
        "geo".to_string(),
        vec!["geocoding".to_string(), "reverse_geocoding".to_string()],
    );
    map.insert(
        "finance".to_string(),
        vec!["stocks".to_string(), "market_data".to_string()],
    );
    map.insert(
        "one".to_string(),
        vec!["search".to_string(), "general_knowledge".to_string()],
    );
    map.insert("yelp".to_string(), vec!["local_business".to_string()]);
    map
}

fn config() -> SmartRouterConfig {
    let mut config = SmartRouterConfig::default();
    config.capabilities = capability_map();
    config.evaluation.fallback_message = FALLBACK_MESSAGE.to_string();
    config
}

fn default_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(StaticAgent {
        id: "chitchat",
        reply: "Hey there! How can I help?",
    }));
    registry.register(Arc::new(StaticAgent {
        id: "geo",
        reply: "The coordinates are 48.8566, 2.3522.",
    }));
    registry.register(Arc::new(StaticAgent {
        id: "finance",
        reply: "AAPL is trading at $230.12.",
    }));
    registry.register(Arc::new(StaticAgent {
        id: "one",
        reply: "Here is what I found on the web.",
    }));
    registry.register(Arc::new(StaticAgent {
        id: "yelp",
        reply: "Top pick: Luigi's Trattoria, 4.8 stars.",
    }));
    registry
}

fn router_with(provider: StageProvider, registry: AgentRegistry) -> SmartRouter {
    match SmartRouter::new(config(), Arc::new(provider), Arc::new(registry)) {
        Ok(router) => router,
        Err(_) => unreachable!(),
    }
}

fn phases(result: &ExecutionResult) -> Vec<&str> {
    result.traces.iter().map(|t| t.phase.as_str()).collect()
}

fn trace_data<'a>(result: &'a ExecutionResult, phase: &str) -> Option<&'a serde_json::Map<String, Value>> {
    result
        .traces
        .iter()
        .find(|t| t.phase == phase)
        .map(|t| &t.data)
}

fn assert_time_invariants(result: &ExecutionResult) {
    assert!(!result.traces.is_empty());
    let phase_sum: f64 = result.traces.iter().map(|t| t.duration).sum();
    assert!(
        result.total_time + 1e-6 >= phase_sum,
        "total_time {} < phase sum {phase_sum}",
        result.total_time
    );
}

#[tokio::test]
async fn chitchat_fast_path_skips_llm_entirely() {
    // Provider has nothing scripted: any LLM call would fail the test.
    let router = router_with(StageProvider::new(), default_registry());
    let result = router.route_query("hello", None).await;

    assert!(result.success);
    assert_eq!(result.final_decision, FinalDecision::Chitchat);
    assert_eq!(result.answer, "Hey there! How can I help?");
    assert_eq!(result.agents_used, vec!["chitchat"]);

    let phases = phases(&result);
    assert_eq!(phases, vec!["fast_path", "routing", "execution"]);
    assert!(!phases.contains(&"interpretation"));
    assert!(!phases.contains(&"evaluation"));
    assert_time_invariants(&result);
}

#[tokio::test]
async fn simple_query_routes_by_domain_priority() {
    let provider = StageProvider::new()
        .interpretation(
            r#"{"complexity": "SIMPLE", "domains": ["search", "local_business"], "requires_synthesis": false}"#,
        )
        .evaluation(HIGH_EVALUATION);
    let router = router_with(provider, default_registry());
    let result = router.route_query("best tacos near me?", None).await;

    assert!(result.success);
    // local_business (priority 10) outranks search (priority 4).
    assert_eq!(result.agents_used, vec!["yelp"]);
    assert_eq!(result.final_decision, FinalDecision::Direct);
    assert_eq!(result.answer, "Top pick: Luigi's Trattoria, 4.8 stars.");

    let routing = trace_data(&result, "routing");
    assert_eq!(
        routing.and_then(|d| d.get("capability")).and_then(Value::as_str),
        Some("local_business")
    );
}

#[tokio::test]
async fn complex_query_fans_out_and_synthesizes() {
    let provider = StageProvider::new()
        .interpretation(
            r#"{"complexity": "COMPLEX", "domains": ["geography", "finance"], "requires_synthesis": true}"#,
        )
        .decomposition(
            r#"[
                {"id": "sq1", "text": "coordinates of Apple HQ", "capability_required": "geocoding", "dependencies": []},
                {"id": "sq2", "text": "stock price of AAPL", "capability_required": "stocks", "dependencies": []}
            ]"#,
        )
        .synthesis(
            r#"{"answer": "Apple HQ sits at 37.33, -122.03 and AAPL trades at $230.12.", "conflicts_resolved": [], "confidence": 0.93, "notes": ""}"#,
        )
        .evaluation(HIGH_EVALUATION);

    // Barrier agents prove the two dispatches run concurrently: either
    // one alone would block forever.
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let mut registry = default_registry();
    registry.register(Arc::new(BarrierAgent {
        id: "geo",
        reply: "37.33, -122.03",
        barrier: Arc::clone(&barrier),
    }));
    registry.register(Arc::new(BarrierAgent {
        id: "finance",
        reply: "AAPL: $230.12",
        barrier,
    }));

    let router = router_with(provider, registry);
    let result = router
        .route_query("Where is Apple HQ and what is AAPL trading at?", None)
        .await;

    assert!(result.success);
    assert_eq!(result.final_decision, FinalDecision::Synthesized);
    assert!(result.answer.contains("37.33"));
    assert!(result.agents_used.contains(&"geo".to_string()));
    assert!(result.agents_used.contains(&"finance".to_string()));

    // Execution entries stay in input order regardless of completion.
    let execution = trace_data(&result, "execution");
    let executions = execution
        .and_then(|d| d.get("agent_executions"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0]["subquery_id"], "sq1");
    assert_eq!(executions[1]["subquery_id"], "sq2");
    assert_eq!(execution.and_then(|d| d.get("concurrent")), Some(&Value::Bool(true)));
    assert_time_invariants(&result);
}

#[tokio::test]
async fn cyclic_decomposition_returns_error_result() {
    let provider = StageProvider::new()
        .interpretation(
            r#"{"complexity": "COMPLEX", "domains": ["finance", "geography"], "requires_synthesis": true}"#,
        )
        .decomposition(
            r#"[
                {"id": "sq1", "text": "a", "capability_required": "stocks", "dependencies": ["sq2"]},
                {"id": "sq2", "text": "b", "capability_required": "geocoding", "dependencies": ["sq1"]}
            ]"#,
        );
    let router = router_with(provider, default_registry());
    let result = router.route_query("circular question", None).await;

    assert!(!result.success);
    assert_eq!(result.final_decision, FinalDecision::Error);
    assert_eq!(result.answer, FALLBACK_MESSAGE);

    // The decomposition trace records the failure.
    let decomposition = result
        .traces
        .iter()
        .find(|t| t.phase == "decomposition")
        .map(|t| (t.success, t.error.clone()));
    let (success, error) = decomposition.unwrap_or((true, None));
    assert!(!success);
    assert!(error.unwrap_or_default().contains("sq1 -> sq2 -> sq1"));
    assert_time_invariants(&result);
}

#[tokio::test]
async fn low_quality_answer_is_gated_to_fallback() {
    let provider = StageProvider::new()
        .interpretation(
            r#"{"complexity": "SIMPLE", "domains": ["finance"], "requires_synthesis": false}"#,
        )
        .evaluation(LOW_EVALUATION);
    let router = router_with(provider, default_registry());
    let result = router.route_query("what is AAPL trading at?", None).await;

    assert!(result.success);
    assert_eq!(result.final_decision, FinalDecision::Fallback);
    assert_eq!(result.answer, FALLBACK_MESSAGE);
    // The rejected answer is preserved for debugging.
    assert_eq!(
        result.original_answer.as_deref(),
        Some("AAPL is trading at $230.12.")
    );

    let evaluation = trace_data(&result, "evaluation");
    assert_eq!(
        evaluation.and_then(|d| d.get("passed")),
        Some(&Value::Bool(false))
    );
}

#[tokio::test]
async fn chitchat_via_interpretation_skips_evaluation() {
    // Wrapped greeting misses the fast path but classifies as chitchat.
    let provider = StageProvider::new().interpretation(
        r#"{"complexity": "SIMPLE", "domains": ["conversation", "social"], "requires_synthesis": false}"#,
    );
    let router = router_with(provider, default_registry());
    let result = router.route_query("hello hello my old friend", None).await;

    assert!(result.success);
    assert_eq!(result.final_decision, FinalDecision::Chitchat);
    assert_eq!(result.agents_used, vec!["chitchat"]);
    assert!(phases(&result).contains(&"interpretation"));
    assert!(!phases(&result).contains(&"evaluation"));
}

#[tokio::test]
async fn empty_decomposition_degrades_to_simple() {
    let provider = StageProvider::new()
        .interpretation(
            r#"{"complexity": "MODERATE", "domains": ["finance"], "requires_synthesis": true}"#,
        )
        .decomposition("[]")
        .evaluation(HIGH_EVALUATION);
    let router = router_with(provider, default_registry());
    let result = router.route_query("how are markets doing?", None).await;

    assert!(result.success);
    assert_eq!(result.final_decision, FinalDecision::Direct);
    assert_eq!(result.agents_used, vec!["finance"]);

    let decomposition = trace_data(&result, "decomposition");
    assert_eq!(
        decomposition.and_then(|d| d.get("fallback_to_simple")),
        Some(&Value::Bool(true))
    );
    let phases = phases(&result);
    assert!(phases.contains(&"routing"));
    assert!(phases.contains(&"execution"));
}

#[tokio::test]
async fn partial_failure_still_synthesizes_from_survivors() {
    let provider = StageProvider::new()
        .interpretation(
            r#"{"complexity": "COMPLEX", "domains": ["geography", "finance"], "requires_synthesis": true}"#,
        )
        .decomposition(
            r#"[
                {"id": "sq1", "text": "coordinates of Apple HQ", "capability_required": "geocoding", "dependencies": []},
                {"id": "sq2", "text": "stock price of AAPL", "capability_required": "stocks", "dependencies": []}
            ]"#,
        )
        .evaluation(HIGH_EVALUATION);

    let mut registry = default_registry();
    registry.register(Arc::new(BrokenAgent { id: "finance" }));

    // Retries make the broken agent slow to fail; keep the policy tight.
    let mut config = config();
    config.error_handling.retries = 0;
    config.error_handling.timeout_secs = 5.0;

    let router = match SmartRouter::new(
        config,
        Arc::new(provider),
        Arc::new(registry),
    ) {
        Ok(router) => router,
        Err(_) => unreachable!(),
    };
    let result = router
        .route_query("Where is Apple HQ and what is AAPL trading at?", None)
        .await;

    assert!(result.success);
    // One survivor: the synthesizer bypasses the provider and returns
    // it verbatim.
    assert_eq!(result.answer, "The coordinates are 48.8566, 2.3522.");
    assert_eq!(result.final_decision, FinalDecision::Synthesized);

    let execution = trace_data(&result, "execution");
    assert_eq!(
        execution.and_then(|d| d.get("success")),
        Some(&Value::Bool(false))
    );
}

#[tokio::test]
async fn all_agents_failing_yields_fallback_message() {
    let provider = StageProvider::new()
        .interpretation(
            r#"{"complexity": "COMPLEX", "domains": ["geography", "finance"], "requires_synthesis": true}"#,
        )
        .decomposition(
            r#"[
                {"id": "sq1", "text": "a", "capability_required": "geocoding", "dependencies": []},
                {"id": "sq2", "text": "b", "capability_required": "stocks", "dependencies": []}
            ]"#,
        )
        .evaluation(LOW_EVALUATION);

    let mut registry = default_registry();
    registry.register(Arc::new(BrokenAgent { id: "geo" }));
    registry.register(Arc::new(BrokenAgent { id: "finance" }));

    let mut config = config();
    config.error_handling.retries = 0;

    let router = match SmartRouter::new(config, Arc::new(provider), Arc::new(registry)) {
        Ok(router) => router,
        Err(_) => unreachable!(),
    };
    let result = router.route_query("doomed question", None).await;

    assert!(result.success);
    assert_eq!(result.answer, FALLBACK_MESSAGE);
}

#[tokio::test]
async fn empty_query_is_an_error_result() {
    let router = router_with(StageProvider::new(), default_registry());
    let result = router.route_query("   ", None).await;

    assert!(!result.success);
    assert_eq!(result.final_decision, FinalDecision::Error);
    assert_eq!(result.answer, FALLBACK_MESSAGE);
    // The failed interpretation phase is still traced.
    assert!(phases(&result).contains(&"interpretation"));
}

#[tokio::test]
async fn session_is_shared_across_turns() {
    let provider = StageProvider::new()
        .interpretation(
            r#"{"complexity": "SIMPLE", "domains": ["search"], "requires_synthesis": false}"#,
        )
        .evaluation(HIGH_EVALUATION);

    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(SessionAgent { id: "one" }));
    registry.register(Arc::new(StaticAgent {
        id: "chitchat",
        reply: "hi",
    }));
    registry.register(Arc::new(StaticAgent {
        id: "geo",
        reply: "x",
    }));
    registry.register(Arc::new(StaticAgent {
        id: "finance",
        reply: "x",
    }));
    registry.register(Arc::new(StaticAgent {
        id: "yelp",
        reply: "x",
    }));

    let store = match SessionStore::in_memory() {
        Ok(store) => Arc::new(store),
        Err(_) => unreachable!(),
    };
    let session = Session::new("user-42", store);
    let router = match SmartRouter::new(config(), Arc::new(provider), Arc::new(registry)) {
        Ok(router) => router.with_session(session),
        Err(_) => unreachable!(),
    };

    let first = router.route_query("find me a good museum", None).await;
    assert_eq!(first.answer, "one saw 0 prior messages");

    // The second turn sees the first turn's messages.
    let second = router.route_query("how far is it from here?", None).await;
    assert_eq!(second.answer, "one saw 2 prior messages");
}

#[tokio::test]
async fn session_is_shared_across_agents_in_one_conversation() {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(SessionAgent { id: "geo" }));
    registry.register(Arc::new(SessionAgent { id: "finance" }));

    let store = match SessionStore::in_memory() {
        Ok(store) => Arc::new(store),
        Err(_) => unreachable!(),
    };
    let session = Session::new("conv-shared", store);
    let dispatcher = SubqueryDispatcher::new(
        Arc::new(registry),
        &switchyard::ErrorHandlingConfig {
            timeout_secs: 5.0,
            retries: 0,
        },
    )
    .with_session(session);

    let subquery = |id: &str, capability: &str, text: &str| switchyard::Subquery {
        id: id.to_string(),
        text: text.to_string(),
        capability_required: capability.to_string(),
        dependencies: Vec::new(),
        routing_pattern: switchyard::RoutingPattern::Delegation,
        metadata: serde_json::Map::new(),
    };

    // Sequential dispatches: the second agent must see the first
    // agent's turn in the shared log.
    let first = dispatcher
        .dispatch(&subquery("sq1", "geocoding", "where is the Louvre?"), "geo", None)
        .await;
    assert!(first.success);
    assert_eq!(first.content, "geo saw 0 prior messages");

    let second = dispatcher
        .dispatch(
            &subquery("sq2", "stocks", "restaurants near there?"),
            "finance",
            None,
        )
        .await;
    assert!(second.success);
    assert_eq!(second.content, "finance saw 2 prior messages");
}

#[tokio::test]
async fn interpretation_heuristic_fallback_keeps_pipeline_alive() {
    // Interpretation is unscripted: the provider call fails and the
    // heuristic takes over ("weather" maps to the search domain).
    let provider = StageProvider::new().evaluation(HIGH_EVALUATION);
    let router = router_with(provider, default_registry());
    let result = router.route_query("what's the weather in Paris", None).await;

    assert!(result.success);
    assert_eq!(result.agents_used, vec!["one"]);
    assert_eq!(result.final_decision, FinalDecision::Direct);
}

#[tokio::test]
async fn result_serializes_to_wire_format() {
    let router = router_with(StageProvider::new(), default_registry());
    let result = router.route_query("hello", None).await;

    let json = serde_json::to_value(&result).unwrap_or_default();
    assert_eq!(json["final_decision"], "chitchat");
    assert_eq!(json["success"], true);
    assert!(json["traces"].is_array());
    assert!(json["total_time"].is_number());
    assert!(json.get("original_answer").is_none());
    assert_eq!(json["agents_used"][0], "chitchat");
}
