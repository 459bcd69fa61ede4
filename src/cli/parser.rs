//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Switchyard: multi-agent query orchestrator.
///
/// Routes natural-language queries across specialist agents, with
/// LLM-based interpretation, decomposition and synthesis.
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the router configuration file.
    #[arg(short, long, env = "SWITCHYARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route a query through the orchestration pipeline.
    ///
    /// Requires `OPENAI_API_KEY` (and optionally `OPENAI_BASE_URL`)
    /// in the environment.
    #[command(after_help = r#"Examples:
  switchyard route "What's the weather in Paris?"
  switchyard route "Coordinates of Apple HQ and AAPL price" --format json
  switchyard route "restaurants nearby?" --session user-42 --session-db ./sessions.db
  switchyard -c ./smartrouter.toml route "hello"
"#)]
    Route {
        /// Query text to route.
        query: String,

        /// Conversation session id (enables cross-turn memory).
        #[arg(short, long)]
        session: Option<String>,

        /// SQLite file for persistent session storage. In-memory
        /// when omitted.
        #[arg(long)]
        session_db: Option<PathBuf>,
    },

    /// List the fast-path chitchat patterns.
    Patterns,

    /// Validate a configuration file and print a summary.
    CheckConfig,
}

impl Cli {
    /// Resolves the configuration path, defaulting to
    /// `smartrouter.toml` in the working directory.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from("smartrouter.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_command() {
        let cli = Cli::try_parse_from(["switchyard", "route", "hello"]);
        let cli = match cli {
            Ok(cli) => cli,
            Err(_) => unreachable!(),
        };
        assert!(matches!(cli.command, Commands::Route { .. }));
        assert_eq!(cli.format, "text");
    }

    #[test]
    fn test_parse_route_with_session() {
        let cli = Cli::try_parse_from([
            "switchyard",
            "route",
            "restaurants there?",
            "--session",
            "user-42",
            "--format",
            "json",
        ]);
        let cli = match cli {
            Ok(cli) => cli,
            Err(_) => unreachable!(),
        };
        match cli.command {
            Commands::Route { session, .. } => {
                assert_eq!(session.as_deref(), Some("user-42"));
            }
            _ => unreachable!(),
        }
        assert_eq!(cli.format, "json");
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["switchyard", "patterns"]);
        let cli = match cli {
            Ok(cli) => cli,
            Err(_) => unreachable!(),
        };
        assert_eq!(cli.config_path(), PathBuf::from("smartrouter.toml"));
    }
}
