//! Switchyard: an LLM-powered multi-agent query orchestrator.
//!
//! Receives a natural-language query, decides whether one specialist
//! agent can answer it or it must be split into concurrently executable
//! subqueries, dispatches the work, merges the results, and gates the
//! final answer on a quality evaluation with a deterministic fallback.
//!
//! # Architecture
//!
//! ```text
//! query ─► FastPath ─► Interpreter ─► Decomposer ─► Router ─► Dispatcher ─► Aggregator ─► Synthesizer ─► Judge ─► answer
//! ```
//!
//! - [`FastPathRouter`] answers pure chitchat from regex patterns,
//!   skipping the LLM entirely.
//! - [`QueryInterpreter`] classifies complexity and domains, with a
//!   deterministic heuristic fallback.
//! - [`QueryDecomposer`] splits complex queries into a validated
//!   dependency DAG of subqueries.
//! - [`CapabilityRouter`] maps each subquery's capability to an agent,
//!   backed by process-wide caches.
//! - [`SubqueryDispatcher`] fans subqueries out concurrently with
//!   per-call timeouts and exponential-backoff retries.
//! - [`ResponseAggregator`] collects responses; [`ResultSynthesizer`]
//!   merges them; [`AnswerJudge`] gates quality.
//! - [`SmartRouter`] drives the stages, records per-phase traces, and
//!   never leaks an error past [`SmartRouter::route_query`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchyard::{
//!     AgentRegistry, CompletionAgent, OpenAiProvider, SmartRouter, SmartRouterConfig,
//! };
//!
//! # async fn run() -> Result<(), switchyard::RouterError> {
//! let config = SmartRouterConfig::load("smartrouter.toml")?;
//! let provider = Arc::new(OpenAiProvider::from_env()?);
//!
//! let mut registry = AgentRegistry::new();
//! registry.register(Arc::new(CompletionAgent::new(
//!     "geo",
//!     "You are a geocoding specialist.",
//!     provider.clone(),
//!     config.models.synthesis.clone(),
//! )));
//!
//! let router = SmartRouter::new(config, provider, Arc::new(registry))?;
//! let result = router.route_query("coordinates of Paris?", None).await;
//! println!("{}", result.answer);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod config;
pub mod decomposer;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod fast_path;
pub mod interpreter;
pub mod judge;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod router;
pub mod session;
pub mod synthesizer;
pub mod trace;
pub mod types;
pub mod util;

// Re-export key types
pub use agent::{AgentRegistry, AgentReply, CompletionAgent, SpecialistAgent};
pub use aggregator::{ResponseAggregator, ResponseStatistics};
pub use cache::{
    CacheMetrics, CapabilityIndex, LruCache, PerformanceMetrics, PhaseStats, RoutingCache,
    capability_index, performance_metrics, routing_cache,
};
pub use config::{
    DecompositionConfig, ErrorHandlingConfig, EvaluationConfig, ModelConfig, ModelConfigs,
    SmartRouterConfig,
};
pub use decomposer::QueryDecomposer;
pub use dispatcher::SubqueryDispatcher;
pub use error::{Result, RouterError};
pub use fast_path::{FastPathMetrics, FastPathRouter};
pub use interpreter::QueryInterpreter;
pub use judge::AnswerJudge;
pub use orchestrator::SmartRouter;
pub use provider::{CompletionProvider, CompletionRequest};
pub use providers::OpenAiProvider;
pub use router::CapabilityRouter;
pub use session::{MessageRole, Session, SessionMessage, SessionStore};
pub use synthesizer::ResultSynthesizer;
pub use trace::{ExecutionResult, PhaseTrace, TraceCapture};
pub use types::{
    AgentResponse, EvaluationResult, FinalDecision, QueryComplexity, QueryIntent, ResponseMeta,
    RoutingPattern, Subquery, SynthesizedResult, TokenUsage,
};
