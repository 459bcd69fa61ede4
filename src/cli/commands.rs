//! CLI command implementations.
//!
//! Contains the business logic for each CLI command. Commands return
//! their output as a string; the binary decides how to print it.

use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use crate::agent::{AgentRegistry, CompletionAgent};
use crate::cli::parser::{Cli, Commands};
use crate::config::SmartRouterConfig;
use crate::error::{Result, RouterError};
use crate::fast_path::FastPathRouter;
use crate::orchestrator::SmartRouter;
use crate::providers::OpenAiProvider;
use crate::session::{Session, SessionStore};
use crate::trace::ExecutionResult;

/// Executes the parsed CLI command.
///
/// # Errors
///
/// Returns a [`RouterError`] when the command fails (configuration,
/// provider setup, serialization).
pub async fn execute(cli: &Cli) -> Result<String> {
    match &cli.command {
        Commands::Route {
            query,
            session,
            session_db,
        } => cmd_route(cli, query, session.as_deref(), session_db.as_deref()).await,
        Commands::Patterns => Ok(cmd_patterns()),
        Commands::CheckConfig => cmd_check_config(cli),
    }
}

/// Builds the router from config + environment and routes one query.
async fn cmd_route(
    cli: &Cli,
    query: &str,
    session_id: Option<&str>,
    session_db: Option<&std::path::Path>,
) -> Result<String> {
    let config = load_config(cli)?;
    let provider = Arc::new(OpenAiProvider::from_env()?);

    // One completion-backed specialist per configured agent id. Real
    // deployments register their own SpecialistAgent implementations.
    let mut registry = AgentRegistry::new();
    for (agent_id, capabilities) in &config.capabilities {
        let instructions = format!(
            "You are the '{agent_id}' specialist agent. You handle: {}. \
             Answer the user's request directly and concisely.",
            capabilities.join(", ")
        );
        let stage_provider: Arc<dyn crate::provider::CompletionProvider> = provider.clone();
        registry.register(Arc::new(CompletionAgent::new(
            agent_id.clone(),
            instructions,
            stage_provider,
            config.models.synthesis.clone(),
        )));
    }

    let mut router = SmartRouter::new(config, provider, Arc::new(registry))?;
    if let Some(session_id) = session_id {
        let store = match session_db {
            Some(path) => SessionStore::open(path)?,
            None => SessionStore::in_memory()?,
        };
        router = router.with_session(Session::new(session_id, Arc::new(store)));
    }

    let result = router.route_query(query, None).await;
    format_result(&result, &cli.format, cli.verbose)
}

/// Lists the default fast-path patterns.
fn cmd_patterns() -> String {
    let router = FastPathRouter::new();
    let mut out = String::from("Fast-path patterns (checked in order):\n");
    for name in router.list_patterns() {
        let _ = writeln!(out, "  {name}");
    }
    out
}

/// Validates the configuration file and prints a summary.
fn cmd_check_config(cli: &Cli) -> Result<String> {
    let path = cli.config_path();
    let config = SmartRouterConfig::load(&path)?;
    let mut out = String::new();
    let _ = writeln!(out, "Configuration OK: {}", path.display());
    let _ = writeln!(out, "  enabled: {}", config.enabled);
    let _ = writeln!(out, "  agents: {}", config.capabilities.len());
    for (agent_id, capabilities) in &config.capabilities {
        let _ = writeln!(out, "    {agent_id}: {}", capabilities.join(", "));
    }
    let _ = writeln!(
        out,
        "  timeout: {}s, retries: {}",
        config.error_handling.timeout_secs, config.error_handling.retries
    );
    let _ = writeln!(
        out,
        "  quality threshold: {}",
        config.evaluation.quality_threshold
    );
    Ok(out)
}

fn load_config(cli: &Cli) -> Result<SmartRouterConfig> {
    let path = cli.config_path();
    if path.exists() {
        SmartRouterConfig::load(path)
    } else if cli.config.is_some() {
        Err(RouterError::Config {
            message: format!("configuration file not found: {}", path.display()),
        })
    } else {
        tracing::warn!("no configuration file found, using defaults");
        Ok(SmartRouterConfig::default())
    }
}

fn format_result(result: &ExecutionResult, format: &str, verbose: bool) -> Result<String> {
    if format == "json" {
        return serde_json::to_string_pretty(result).map_err(|e| RouterError::Config {
            message: format!("cannot serialize result: {e}"),
        });
    }

    let mut out = result.answer.clone();
    if verbose {
        let _ = write!(
            out,
            "\n\n[decision: {} | agents: {} | {:.2}s | success: {}]",
            result.final_decision,
            result.agents_used.join(", "),
            result.total_time,
            result.success
        );
        for trace in &result.traces {
            let _ = write!(out, "\n  {} ({:.3}s)", trace.phase, trace.duration);
            if !trace.success {
                let _ = write!(out, " FAILED: {}", trace.error.as_deref().unwrap_or("?"));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::PhaseTrace;
    use crate::types::FinalDecision;

    fn result() -> ExecutionResult {
        ExecutionResult {
            answer: "Hello!".to_string(),
            traces: vec![PhaseTrace {
                phase: "fast_path".to_string(),
                duration: 0.001,
                data: serde_json::Map::new(),
                success: true,
                error: None,
            }],
            total_time: 0.002,
            final_decision: FinalDecision::Chitchat,
            agents_used: vec!["chitchat".to_string()],
            success: true,
            original_answer: None,
        }
    }

    #[test]
    fn test_format_result_text() {
        let out = format_result(&result(), "text", false).unwrap_or_default();
        assert_eq!(out, "Hello!");
    }

    #[test]
    fn test_format_result_verbose_includes_traces() {
        let out = format_result(&result(), "text", true).unwrap_or_default();
        assert!(out.contains("decision: chitchat"));
        assert!(out.contains("fast_path"));
    }

    #[test]
    fn test_format_result_json() {
        let out = format_result(&result(), "json", false).unwrap_or_default();
        assert!(out.contains("\"final_decision\": \"chitchat\""));
    }

    #[test]
    fn test_cmd_patterns_lists_defaults() {
        let out = cmd_patterns();
        assert!(out.contains("greeting_simple"));
        assert!(out.contains("negation"));
    }
}
