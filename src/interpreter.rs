//! Query interpretation and classification.
//!
//! Uses the completion provider to classify a query's complexity,
//! domains and synthesis requirement. When the provider call or its
//! JSON output fails, a deterministic heuristic takes over. The
//! fallback never fails, so interpretation always yields a usable
//! intent (only an empty query is an error).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::ModelConfig;
use crate::error::{Result, RouterError};
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::types::{QueryComplexity, QueryIntent};
use crate::util;

/// System prompt for query classification.
const INTERPRETATION_PROMPT: &str = r#"You are a query analysis expert. Analyze the user query and provide a structured JSON response.

Classify the query complexity:
- SIMPLE: Single, straightforward question requiring one agent
- MODERATE: Multiple questions or domains, straightforward routing
- COMPLEX: Multiple interdependent questions requiring synthesis

Identify domains from this list:
- geography: ONLY for geocoding - converting addresses to/from coordinates, location lookups
- mapping: Maps, driving directions, routes, navigation, distance calculation, place details
- finance: Stocks, markets, financial data
- search: Web search, general knowledge, real-time information, current events, news, weather
- local_business: Restaurants, shops, reviews
- wikipedia: Encyclopedia knowledge, historical facts
- research: Research papers, academic content, deep analysis
- conversation: Social queries, greetings, farewells, gratitude, friendly chat
- social: Casual conversation, small talk, how are you

CRITICAL DISTINCTION - geography vs mapping:
- Use "geography" ONLY for: address to coordinates, coordinates to address, "what's the address", "coordinates of"
- Use "mapping" for: driving directions, routes, navigation, "how to get from X to Y", "distance between"

RULE FOR REAL-TIME INFORMATION:
If the query asks for current/real-time information (weather, news, current events, "latest"), classify as:
- complexity: SIMPLE
- domains: ["search"]

RULE FOR SOCIAL/CHITCHAT:
If the query is PURELY social with NO information request, classify as:
- complexity: SIMPLE
- domains: ["conversation", "social"]
- requires_synthesis: false

GREETING WRAPPERS: a greeting followed by a substantive question is NOT chitchat.
Classify by the question ("Hi! Where's the nearest restaurant?" is local_business).
Only classify as ["conversation", "social"] when no actual question is asked.

Determine requires_synthesis: whether multiple responses must be combined into one coherent answer.

Respond ONLY with valid JSON in this format:
{
  "complexity": "SIMPLE|MODERATE|COMPLEX",
  "domains": ["domain1", "domain2"],
  "requires_synthesis": true|false,
  "reasoning": "Brief explanation of classification"
}"#;

/// Phrases that mark a query as pure chitchat in the heuristic
/// fallback. Matched on equality or prefix against the lowercased query.
const CHITCHAT_PHRASES: &[&str] = &[
    // greetings
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "greetings",
    // farewells
    "bye",
    "goodbye",
    "see you",
    "farewell",
    "take care",
    "catch you later",
    // gratitude
    "thank you",
    "thanks",
    "appreciate",
    "grateful",
    "thx",
    // social
    "how are you",
    "what's up",
    "how's it going",
    "how are things",
    "how do you do",
    // small talk
    "nice weather",
    "have a nice day",
    "have a great day",
    "good luck",
];

/// Keyword table for heuristic domain detection, in check order.
const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "search",
        &[
            "weather", "news", "current", "latest", "today", "now", "happening", "real-time",
            "live",
        ],
    ),
    (
        "geography",
        &[
            "address",
            "coordinates",
            "lat",
            "lng",
            "latitude",
            "longitude",
            "geocode",
            "where is",
            "where are",
            "location of",
            "nearest",
        ],
    ),
    (
        "mapping",
        &[
            "map",
            "direction",
            "route",
            "navigation",
            "drive",
            "driving",
            "distance",
            "how to get",
            "from",
            "to",
        ],
    ),
    (
        "finance",
        &["stock", "price", "market", "ticker", "aapl", "nyse", "financial"],
    ),
    (
        "local_business",
        &["restaurant", "cafe", "shop", "review", "yelp", "business"],
    ),
    (
        "wikipedia",
        &["wikipedia", "definition", "explain", "history of"],
    ),
    (
        "research",
        &["perplexity", "research", "study", "paper", "academic"],
    ),
];

/// Phrases marking a location question; these suppress the
/// `local_business` keyword match so "where is the nearest restaurant"
/// routes to geocoding rather than business search.
const LOCATION_PHRASES: &[&str] = &["where is", "where are", "location of", "nearest"];

#[derive(Debug, Deserialize)]
struct InterpretationPayload {
    #[serde(default)]
    complexity: String,
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    requires_synthesis: bool,
    #[serde(default)]
    reasoning: String,
}

/// Classifies user queries into [`QueryIntent`]s.
pub struct QueryInterpreter {
    provider: Arc<dyn CompletionProvider>,
    model: ModelConfig,
}

impl QueryInterpreter {
    /// Creates an interpreter over a provider and model configuration.
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>, model: ModelConfig) -> Self {
        Self { provider, model }
    }

    /// Interprets and classifies a user query.
    ///
    /// Provider or parse failures degrade to heuristic classification;
    /// the returned intent is always usable.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::EmptyQuery`] for blank input. No other
    /// error escapes.
    pub async fn interpret(&self, query: &str) -> Result<QueryIntent> {
        if query.trim().is_empty() {
            return Err(RouterError::EmptyQuery);
        }

        match self.classify(query).await {
            Ok(intent) => {
                tracing::info!(
                    complexity = %intent.complexity,
                    domains = ?intent.domains,
                    synthesis = intent.requires_synthesis,
                    "query interpreted"
                );
                Ok(intent)
            }
            Err(e) => {
                tracing::warn!(error = %e, "interpretation failed, using heuristic fallback");
                Ok(Self::fallback_intent(query))
            }
        }
    }

    /// Runs the provider classification and parses its JSON output.
    async fn classify(&self, query: &str) -> Result<QueryIntent> {
        let request = CompletionRequest::from_model(&self.model, INTERPRETATION_PROMPT, query);
        let response = self.provider.complete(&request).await?;
        Self::parse_classification(query, &response)
    }

    /// Parses the provider's JSON classification into a [`QueryIntent`].
    fn parse_classification(query: &str, response: &str) -> Result<QueryIntent> {
        let value = util::parse_json(response).ok_or_else(|| RouterError::Interpretation {
            message: format!(
                "response is not JSON (preview: {:?})",
                response.chars().take(200).collect::<String>()
            ),
        })?;
        let payload: InterpretationPayload =
            serde_json::from_value(value).map_err(|e| RouterError::Interpretation {
                message: format!("unexpected classification shape: {e}"),
            })?;

        let complexity = QueryComplexity::parse(&payload.complexity);
        let domains = if payload.domains.is_empty() {
            vec!["search".to_string()]
        } else {
            payload.domains
        };

        let mut metadata = Map::new();
        if !payload.reasoning.is_empty() {
            metadata.insert("reasoning".to_string(), Value::String(payload.reasoning));
        }

        Ok(QueryIntent {
            original_query: query.to_string(),
            complexity,
            domains,
            requires_synthesis: payload.requires_synthesis,
            metadata,
        })
    }

    /// Deterministic heuristic classification used when the provider
    /// call or parse fails. Never fails.
    #[must_use]
    pub fn fallback_intent(query: &str) -> QueryIntent {
        let query_lower = query.to_lowercase();
        let query_lower = query_lower.trim();

        if CHITCHAT_PHRASES
            .iter()
            .any(|p| query_lower == *p || query_lower.starts_with(p))
        {
            let mut metadata = Map::new();
            metadata.insert(
                "reasoning".to_string(),
                Value::String("heuristic fallback - chitchat detected".to_string()),
            );
            metadata.insert("is_chitchat".to_string(), Value::Bool(true));
            return QueryIntent {
                original_query: query.to_string(),
                complexity: QueryComplexity::Simple,
                domains: vec!["conversation".to_string(), "social".to_string()],
                requires_synthesis: false,
                metadata,
            };
        }

        let question_count = query.matches('?').count();
        let sentence_count = query.split('.').filter(|s| !s.trim().is_empty()).count();
        let is_location_query = LOCATION_PHRASES.iter().any(|p| query_lower.contains(p));

        let mut domains: Vec<String> = Vec::new();
        for (domain, keywords) in DOMAIN_KEYWORDS {
            if keywords.iter().any(|kw| query_lower.contains(kw)) {
                // A location question about a business is a geocoding
                // question, not a business search.
                if *domain == "local_business" && is_location_query {
                    continue;
                }
                domains.push((*domain).to_string());
            }
        }
        if domains.is_empty() {
            domains.push("search".to_string());
        }

        let (complexity, requires_synthesis) =
            if question_count > 1 || sentence_count > 2 || domains.len() > 1 {
                (QueryComplexity::Moderate, true)
            } else {
                (QueryComplexity::Simple, false)
            };

        let mut metadata = Map::new();
        metadata.insert(
            "reasoning".to_string(),
            Value::String("heuristic fallback".to_string()),
        );
        metadata.insert("question_count".to_string(), Value::from(question_count));
        metadata.insert("sentence_count".to_string(), Value::from(sentence_count));

        QueryIntent {
            original_query: query.to_string(),
            complexity,
            domains,
            requires_synthesis,
            metadata,
        }
    }
}

impl std::fmt::Debug for QueryInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryInterpreter")
            .field("provider", &self.provider.name())
            .field("model", &self.model.name)
            .finish()
    }
}
