//! Regex pre-classifier for pure chitchat.
//!
//! Matched queries skip LLM interpretation entirely. The pattern set is
//! deliberately conservative: it matches only when the *whole* trimmed
//! input is a greeting, farewell, gratitude, status inquiry,
//! affirmation or negation. Anything carrying a substantive question
//! must miss and fall through to the interpreter.

use std::collections::BTreeMap;
use std::sync::Mutex;

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, RouterError};
use crate::types::{QueryComplexity, QueryIntent};

/// Default pattern set, checked in declared order; first match wins.
const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    ("greeting_simple", r"^(hi|hello|hey|greetings|howdy)(\s|!|\.|\?)*$"),
    (
        "greeting_time",
        r"^(good morning|good afternoon|good evening|good day)(\s|!|\.)*$",
    ),
    (
        "farewell",
        r"^(bye|goodbye|see you|farewell|goodnight|cya|ttyl)(\s|!|\.)*$",
    ),
    (
        "gratitude",
        r"^(thanks|thank you|thx|ty|appreciate it|much appreciated)(\s|!|\.)*$",
    ),
    ("status_inquiry", r"^how (are|r) (you|u)(\s+doing)?(\s|\?|!)*$"),
    ("status_whatsup", r"^(what's up|whats up|wassup|sup)(\s|\?|!)*$"),
    (
        "affirmation",
        r"^(yes|yeah|yep|yup|sure|ok|okay|alright|sounds good)(\s|!|\.)*$",
    ),
    ("negation", r"^(no|nope|nah|not really)(\s|!|\.)*$"),
];

/// Domains attached to every default pattern.
const CHITCHAT_DOMAINS: [&str; 2] = ["conversation", "social"];

struct FastPattern {
    name: String,
    regex: Regex,
    domains: Vec<String>,
    complexity: QueryComplexity,
}

#[derive(Default)]
struct Counters {
    total_attempts: u64,
    total_matches: u64,
    per_pattern: BTreeMap<String, u64>,
}

/// Snapshot of fast-path matching metrics.
#[derive(Debug, Clone, Serialize)]
pub struct FastPathMetrics {
    /// Queries offered to the fast path.
    pub total_attempts: u64,
    /// Queries that matched a pattern.
    pub total_matches: u64,
    /// `total_matches / total_attempts`, or 0 with no attempts.
    pub match_rate: f64,
    /// Match count per pattern name.
    pub pattern_counts: BTreeMap<String, u64>,
}

/// Pre-classifier that routes pure chitchat without an LLM call.
///
/// Patterns are compiled once, case-insensitive, and anchored to the
/// whole trimmed input. Matching is a linear scan in declared order.
/// [`Self::try_fast_path`] is safe under concurrent use; pattern
/// mutation is expected to happen single-threaded at setup.
pub struct FastPathRouter {
    patterns: Vec<FastPattern>,
    counters: Mutex<Counters>,
}

impl FastPathRouter {
    /// Creates a router with the default chitchat pattern set.
    #[must_use]
    pub fn new() -> Self {
        let mut router = Self {
            patterns: Vec::with_capacity(DEFAULT_PATTERNS.len()),
            counters: Mutex::new(Counters::default()),
        };
        for (name, pattern) in DEFAULT_PATTERNS {
            let domains = CHITCHAT_DOMAINS.iter().map(ToString::to_string).collect();
            // Compilation of the built-in set cannot fail; a broken
            // pattern is skipped rather than poisoning construction.
            if router
                .add_pattern(name, pattern, domains, QueryComplexity::Simple)
                .is_err()
            {
                tracing::error!(pattern = name, "default fast-path pattern failed to compile");
            }
        }
        router
    }

    /// Attempts to classify `query` with the pattern set.
    ///
    /// Returns a fully-formed [`QueryIntent`] on a match, `None` when
    /// the query must fall through to LLM interpretation. Match
    /// metadata records the pattern name and a confidence of 1.0.
    pub fn try_fast_path(&self, query: &str) -> Option<QueryIntent> {
        let normalized = query.trim();
        {
            let mut counters = self.lock_counters();
            counters.total_attempts += 1;
        }

        for pattern in &self.patterns {
            if !pattern.regex.is_match(normalized) {
                continue;
            }
            {
                let mut counters = self.lock_counters();
                counters.total_matches += 1;
                *counters.per_pattern.entry(pattern.name.clone()).or_insert(0) += 1;
            }
            tracing::info!(
                pattern = %pattern.name,
                domains = ?pattern.domains,
                "fast-path match"
            );

            let mut metadata = Map::new();
            metadata.insert("fast_path".to_string(), Value::Bool(true));
            metadata.insert(
                "fast_path_pattern".to_string(),
                Value::String(pattern.name.clone()),
            );
            metadata.insert(
                "fast_path_confidence".to_string(),
                Value::from(1.0),
            );

            return Some(QueryIntent {
                original_query: query.to_string(),
                complexity: pattern.complexity,
                domains: pattern.domains.clone(),
                requires_synthesis: false,
                metadata,
            });
        }

        tracing::debug!("no fast-path match, falling through to interpretation");
        None
    }

    /// Adds or replaces a named pattern. New patterns are appended to
    /// the end of the check order; replacements keep their position.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] when the regex fails to compile.
    pub fn add_pattern(
        &mut self,
        name: &str,
        pattern: &str,
        domains: Vec<String>,
        complexity: QueryComplexity,
    ) -> Result<()> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| RouterError::Config {
                message: format!("invalid fast-path pattern '{name}': {e}"),
            })?;
        let compiled = FastPattern {
            name: name.to_string(),
            regex,
            domains,
            complexity,
        };
        if let Some(existing) = self.patterns.iter_mut().find(|p| p.name == name) {
            tracing::warn!(pattern = name, "replacing existing fast-path pattern");
            *existing = compiled;
        } else {
            self.patterns.push(compiled);
        }
        Ok(())
    }

    /// Removes a pattern by name. Returns `true` if it existed.
    pub fn remove_pattern(&mut self, name: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.name != name);
        before != self.patterns.len()
    }

    /// Names of all patterns in check order.
    #[must_use]
    pub fn list_patterns(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.name.clone()).collect()
    }

    /// Current matching metrics.
    pub fn metrics(&self) -> FastPathMetrics {
        let counters = self.lock_counters();
        #[allow(clippy::cast_precision_loss)]
        let match_rate = if counters.total_attempts == 0 {
            0.0
        } else {
            counters.total_matches as f64 / counters.total_attempts as f64
        };
        FastPathMetrics {
            total_attempts: counters.total_attempts,
            total_matches: counters.total_matches,
            match_rate,
            pattern_counts: counters.per_pattern.clone(),
        }
    }

    /// Resets all matching metrics to zero.
    pub fn reset_metrics(&self) {
        let mut counters = self.lock_counters();
        *counters = Counters::default();
    }

    fn lock_counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for FastPathRouter {
    fn default() -> Self {
        Self::new()
    }
}
