//! Domain prioritization for simple-query routing.
//!
//! When the interpreter tags a query with several domains, the
//! orchestrator routes by the highest-priority one. Real-time
//! informational domains sit at the top so "what's the weather" can
//! never be mistaken for chitchat; conversational domains sit near the
//! bottom. Both tables are pure functions, fully deterministic.
//!
//! geography and mapping are deliberately distinct: `geography` is
//! geocoding (address ↔ coordinates) while `mapping` is
//! directions/routes/distance. Collapsing them regresses routing.
//!
//! # Priority Table
//!
//! | Priority | Domains |
//! |----------|---------|
//! | 12       | weather, news, current_events |
//! | 11       | realtime |
//! | 10       | local_business |
//! | 9        | finance |
//! | 8        | geography, geocoding |
//! | 7        | mapping |
//! | 6        | research |
//! | 5        | wikipedia |
//! | 4        | search, web_search |
//! | 3        | conversation, social |
//! | 0        | anything else |

/// Returns the routing priority of a domain tag (higher wins).
#[must_use]
pub fn domain_priority(domain: &str) -> u8 {
    match domain {
        "weather" | "news" | "current_events" => 12,
        "realtime" => 11,
        "local_business" => 10,
        "finance" => 9,
        "geography" | "geocoding" => 8,
        "mapping" => 7,
        "research" => 6,
        "wikipedia" => 5,
        "search" | "web_search" => 4,
        "conversation" | "social" => 3,
        _ => 0,
    }
}

/// Maps a domain tag to the capability used for routing.
///
/// Unknown domains pass through unchanged so ad-hoc capability tags
/// emitted by the classifier still route via the fuzzy fallbacks.
#[must_use]
pub fn domain_capability(domain: &str) -> &str {
    match domain {
        "geography" => "geocoding",
        "social" => "conversation",
        "web_search" => "search",
        _ => domain,
    }
}

/// Picks the highest-priority domain from a list.
///
/// Ties keep the earliest listed domain, so classifier order is a
/// stable secondary key. Returns `None` for an empty list.
#[must_use]
pub fn primary_domain<'a>(domains: &'a [String]) -> Option<&'a str> {
    let mut best: Option<(&str, u8)> = None;
    for domain in domains {
        let priority = domain_priority(domain);
        if best.is_none_or(|(_, best_priority)| priority > best_priority) {
            best = Some((domain.as_str(), priority));
        }
    }
    best.map(|(domain, _)| domain)
}
