//! Phase-level execution tracing.
//!
//! Every pipeline stage runs under a scoped timer: [`TraceCapture::run`]
//! measures the stage, appends exactly one [`PhaseTrace`] whether the
//! stage succeeds or fails, and feeds the duration into the global
//! performance metrics. The capture is per-request and not shared
//! across tasks.

use std::future::Future;
use std::time::Instant;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::cache::performance_metrics;
use crate::error::RouterError;
use crate::types::FinalDecision;

/// Serializes a seconds value rounded to three decimals.
#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_secs<S>(secs: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64((secs * 1000.0).round() / 1000.0)
}

/// Trace record for one executed phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTrace {
    /// Phase name (`fast_path`, `interpretation`, `routing`, ...).
    pub phase: String,
    /// Phase duration in seconds.
    #[serde(serialize_with = "serialize_secs")]
    pub duration: f64,
    /// Phase-specific data captured during execution.
    pub data: Map<String, Value>,
    /// Whether the phase completed without error.
    pub success: bool,
    /// Error message when the phase failed.
    pub error: Option<String>,
}

/// Collects phase traces for one `route_query` invocation.
pub struct TraceCapture {
    started: Instant,
    traces: Vec<PhaseTrace>,
}

impl TraceCapture {
    /// Starts a new capture; total time is measured from here.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            traces: Vec::new(),
        }
    }

    /// Runs a phase future under a scoped timer.
    ///
    /// The future resolves to `(value, data)`; on success the data map
    /// becomes the trace payload. On failure a failed trace carrying
    /// the error text is appended and the error is propagated. Exactly
    /// one trace is appended either way, and the duration is recorded
    /// into the global [`performance_metrics`].
    ///
    /// # Errors
    ///
    /// Propagates the phase's error untouched.
    pub async fn run<T, F>(&mut self, phase: &str, fut: F) -> Result<T, RouterError>
    where
        F: Future<Output = Result<(T, Map<String, Value>), RouterError>>,
    {
        let phase_start = Instant::now();
        let outcome = fut.await;
        let duration = phase_start.elapsed().as_secs_f64();
        performance_metrics().record(phase, duration);

        match outcome {
            Ok((value, data)) => {
                tracing::debug!(phase, duration, "phase completed");
                self.traces.push(PhaseTrace {
                    phase: phase.to_string(),
                    duration,
                    data,
                    success: true,
                    error: None,
                });
                Ok(value)
            }
            Err(err) => {
                tracing::error!(phase, duration, error = %err, "phase failed");
                self.traces.push(PhaseTrace {
                    phase: phase.to_string(),
                    duration,
                    data: Map::new(),
                    success: false,
                    error: Some(err.to_string()),
                });
                Err(err)
            }
        }
    }

    /// Total elapsed time since the capture started, in seconds.
    #[must_use]
    pub fn total_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// The traces collected so far.
    #[must_use]
    pub fn traces(&self) -> &[PhaseTrace] {
        &self.traces
    }

    /// Consumes the capture, yielding its traces.
    #[must_use]
    pub fn into_traces(self) -> Vec<PhaseTrace> {
        self.traces
    }
}

impl Default for TraceCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete result of one `route_query` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Final answer text (possibly the configured fallback message).
    pub answer: String,
    /// One trace per executed phase, in phase order.
    pub traces: Vec<PhaseTrace>,
    /// Total wall-clock time in seconds.
    #[serde(serialize_with = "serialize_secs")]
    pub total_time: f64,
    /// How the answer was produced.
    pub final_decision: FinalDecision,
    /// Agent ids that participated.
    pub agents_used: Vec<String>,
    /// Whether the pipeline completed without surfacing an error.
    pub success: bool,
    /// The pre-fallback answer; present only when
    /// `final_decision == Fallback`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_answer: Option<String>,
}
