//! Pluggable completion-provider trait.
//!
//! The four LLM-backed stages (interpreter, decomposer, synthesizer,
//! judge) and the default completion-backed specialist agent all speak
//! this one narrow contract: system instructions plus user input in,
//! text out. Implementations own the transport; test doubles script it.

use async_trait::async_trait;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::session::Session;

/// A provider-agnostic completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System instructions defining the caller's role.
    pub system: String,
    /// User input for this call.
    pub input: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Conversation session. When set, providers replay the session
    /// history as context and append the new turn after completion.
    pub session: Option<Session>,
}

impl CompletionRequest {
    /// Builds a request from a stage's [`ModelConfig`].
    #[must_use]
    pub fn from_model(
        model: &ModelConfig,
        system: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            input: input.into(),
            model: model.name.clone(),
            temperature: model.temperature,
            max_tokens: model.max_tokens,
            session: None,
        }
    }

    /// Attaches a conversation session.
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }
}

/// Trait for completion-provider backends.
///
/// Implementations handle the transport layer for a specific vendor
/// while presenting a uniform prompt-in / text-out interface. Response
/// text is expected (but not guaranteed) to be JSON for the pipeline
/// stages; callers tolerate fencing and trailing prose.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name (e.g. `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a completion request and returns the response text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RouterError::Provider`] on transport or
    /// API failures.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_model() {
        let model = ModelConfig {
            name: "gpt-4.1-mini".to_string(),
            temperature: 0.2,
            max_tokens: 512,
        };
        let request = CompletionRequest::from_model(&model, "You classify queries.", "hello");
        assert_eq!(request.model, "gpt-4.1-mini");
        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 512);
        assert!(request.session.is_none());
    }
}
