//! Concurrent subquery dispatch with timeouts and retries.
//!
//! Each subquery runs under a per-attempt deadline with exponential
//! backoff (2^attempt seconds) between attempts. Per-subquery failures
//! never surface as errors: they come back as failed
//! [`AgentResponse`]s so one slow or broken agent cannot sink a batch.
//! [`SubqueryDispatcher::dispatch_all`] fans out one task per subquery
//! and preserves input order in its results; dropping the returned
//! future aborts all in-flight work.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::agent::AgentRegistry;
use crate::config::ErrorHandlingConfig;
use crate::error::{Result, RouterError};
use crate::session::Session;
use crate::types::{AgentResponse, ResponseMeta, Subquery};

/// Dispatches subqueries to registered agents.
#[derive(Clone)]
pub struct SubqueryDispatcher {
    registry: Arc<AgentRegistry>,
    timeout: Duration,
    retries: u32,
    session: Option<Session>,
}

impl SubqueryDispatcher {
    /// Creates a dispatcher over an agent registry and error policy.
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>, error_config: &ErrorHandlingConfig) -> Self {
        Self {
            registry,
            timeout: error_config.timeout(),
            retries: error_config.retries,
            session: None,
        }
    }

    /// Attaches the conversation session. Every agent invocation in
    /// this dispatcher then shares that one session.
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Dispatches one subquery to one agent.
    ///
    /// Runs up to `retries + 1` attempts, each under the deadline
    /// (`timeout` argument overrides the configured default), sleeping
    /// `2^attempt` seconds between attempts. Always returns a response;
    /// failures are values, not errors.
    pub async fn dispatch(
        &self,
        subquery: &Subquery,
        agent_id: &str,
        timeout: Option<Duration>,
    ) -> AgentResponse {
        let deadline = timeout.unwrap_or(self.timeout);
        let started = Instant::now();
        let mut attempt: u32 = 0;

        tracing::debug!(
            subquery = %subquery.id,
            agent = agent_id,
            timeout_secs = deadline.as_secs_f64(),
            "dispatching subquery"
        );

        loop {
            if attempt > 0 {
                tracing::info!(
                    subquery = %subquery.id,
                    attempt,
                    retries = self.retries,
                    "retrying subquery"
                );
            }

            let outcome = tokio::time::timeout(deadline, self.execute(subquery, agent_id)).await;

            match outcome {
                Ok(Ok(invocation)) => {
                    let execution_time = started.elapsed().as_secs_f64();
                    tracing::info!(
                        subquery = %subquery.id,
                        agent = agent_id,
                        attempts = attempt + 1,
                        elapsed = execution_time,
                        "subquery completed"
                    );
                    let metadata = ResponseMeta {
                        execution_time,
                        attempts: attempt + 1,
                        agent_name: Some(invocation.agent_name),
                        routing_pattern: Some(subquery.routing_pattern),
                        usage: invocation.usage,
                        timeout: None,
                        error_kind: None,
                    };
                    return AgentResponse::success(
                        &subquery.id,
                        agent_id,
                        invocation.content,
                        metadata,
                    );
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        subquery = %subquery.id,
                        agent = agent_id,
                        attempt = attempt + 1,
                        error = %err,
                        "subquery attempt failed"
                    );
                    if attempt >= self.retries {
                        let metadata = ResponseMeta {
                            execution_time: started.elapsed().as_secs_f64(),
                            attempts: attempt + 1,
                            routing_pattern: Some(subquery.routing_pattern),
                            error_kind: Some(err.kind().to_string()),
                            ..ResponseMeta::default()
                        };
                        return AgentResponse::failure(
                            &subquery.id,
                            agent_id,
                            err.to_string(),
                            metadata,
                        );
                    }
                }
                Err(_elapsed) => {
                    tracing::warn!(
                        subquery = %subquery.id,
                        agent = agent_id,
                        attempt = attempt + 1,
                        timeout_secs = deadline.as_secs_f64(),
                        "subquery timed out"
                    );
                    if attempt >= self.retries {
                        let metadata = ResponseMeta {
                            execution_time: started.elapsed().as_secs_f64(),
                            attempts: attempt + 1,
                            routing_pattern: Some(subquery.routing_pattern),
                            timeout: Some(deadline.as_secs_f64()),
                            error_kind: Some("timeout".to_string()),
                            ..ResponseMeta::default()
                        };
                        return AgentResponse::failure(
                            &subquery.id,
                            agent_id,
                            format!(
                                "Timeout after {}s (retries exhausted)",
                                format_secs(deadline)
                            ),
                            metadata,
                        );
                    }
                }
            }

            let backoff = Duration::from_secs(1_u64 << attempt.min(16));
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Dispatches a batch of routed subqueries concurrently.
    ///
    /// One task per subquery; all make progress concurrently with
    /// independent deadlines, and the batch completes when every task
    /// has terminated. Responses are returned in input order. Aborted
    /// tasks become failed responses.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Dispatch`] only when a dispatch task
    /// panics, a system fault rather than an agent failure.
    pub async fn dispatch_all(
        &self,
        subqueries: Vec<(Subquery, String)>,
        timeout: Option<Duration>,
    ) -> Result<Vec<AgentResponse>> {
        if subqueries.is_empty() {
            tracing::debug!("no subqueries to dispatch");
            return Ok(Vec::new());
        }

        tracing::info!(count = subqueries.len(), "dispatching subqueries concurrently");

        let labels: Vec<(String, String)> = subqueries
            .iter()
            .map(|(sq, agent_id)| (sq.id.clone(), agent_id.clone()))
            .collect();

        let mut tasks: JoinSet<(usize, AgentResponse)> = JoinSet::new();
        for (index, (subquery, agent_id)) in subqueries.into_iter().enumerate() {
            let dispatcher = self.clone();
            tasks.spawn(async move {
                let response = dispatcher.dispatch(&subquery, &agent_id, timeout).await;
                (index, response)
            });
        }

        let mut slots: Vec<Option<AgentResponse>> = labels.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, response)) => slots[index] = Some(response),
                Err(err) if err.is_cancelled() => {
                    // Slot stays empty; filled with a failure below.
                }
                Err(err) => {
                    return Err(RouterError::Dispatch {
                        message: format!("dispatch task failed: {err}"),
                    });
                }
            }
        }

        let responses: Vec<AgentResponse> = slots
            .into_iter()
            .zip(labels)
            .map(|(slot, (subquery_id, agent_id))| {
                slot.unwrap_or_else(|| {
                    AgentResponse::failure(
                        subquery_id,
                        agent_id,
                        "dispatch cancelled",
                        ResponseMeta {
                            error_kind: Some("cancelled".to_string()),
                            ..ResponseMeta::default()
                        },
                    )
                })
            })
            .collect();

        let success_count = responses.iter().filter(|r| r.success).count();
        tracing::info!(
            successful = success_count,
            total = responses.len(),
            "batch dispatch completed"
        );
        Ok(responses)
    }

    /// Runs one agent invocation. Errors are returned to the retry loop.
    async fn execute(&self, subquery: &Subquery, agent_id: &str) -> Result<AgentInvocation> {
        let agent = self
            .registry
            .get(agent_id)
            .ok_or_else(|| RouterError::UnknownAgent {
                agent_id: agent_id.to_string(),
            })?;

        let reply = agent.invoke(&subquery.text, self.session.as_ref()).await?;
        if reply.content.trim().is_empty() {
            return Err(RouterError::Agent {
                message: format!("agent '{agent_id}' returned empty content"),
            });
        }

        Ok(AgentInvocation {
            content: reply.content,
            agent_name: agent.name().to_string(),
            usage: reply.usage,
        })
    }
}

impl std::fmt::Debug for SubqueryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubqueryDispatcher")
            .field("agents", &self.registry.len())
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("session", &self.session.as_ref().map(Session::id))
            .finish()
    }
}

/// Result of a single successful agent invocation.
struct AgentInvocation {
    content: String,
    agent_name: String,
    usage: Option<crate::types::TokenUsage>,
}

fn format_secs(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if (secs - secs.trunc()).abs() < f64::EPSILON {
        format!("{}", secs as u64)
    } else {
        format!("{secs}")
    }
}
