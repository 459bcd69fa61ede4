//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure, local proxies)
//! via the base URL override. When a request carries a session, the
//! session history is replayed as chat context and the new user/assistant
//! turn is appended after completion.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequest,
};
use async_trait::async_trait;

use crate::error::{Result, RouterError};
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::session::{MessageRole, SessionMessage};

/// Environment variable holding the API key.
const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable holding an optional base URL override.
const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// `OpenAI`-compatible completion provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a provider with the given API key.
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Self::with_config(api_key, None)
    }

    /// Creates a provider with an API key and base URL override.
    #[must_use]
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self::with_config(api_key, Some(base_url))
    }

    /// Creates a provider from `OPENAI_API_KEY` (and optionally
    /// `OPENAI_BASE_URL`) in the environment.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] when no API key is set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| RouterError::Config {
            message: format!("{API_KEY_ENV} is not set"),
        })?;
        let base_url = std::env::var(BASE_URL_ENV).ok();
        Ok(Self::with_config(&api_key, base_url.as_deref()))
    }

    fn with_config(api_key: &str, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
        }
    }

    /// Converts a stored session message to the SDK message type.
    fn convert_history_message(msg: &SessionMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            MessageRole::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                        msg.content.clone(),
                    ),
                    name: None,
                })
            }
            MessageRole::User => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                        msg.content.clone(),
                    ),
                    name: None,
                })
            }
            MessageRole::Assistant =>
            {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(
                        async_openai::types::ChatCompletionRequestAssistantMessageContent::Text(
                            msg.content.clone(),
                        ),
                    ),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        }
    }

    /// Builds the SDK request: system prompt, replayed session history,
    /// then the new user input.
    fn build_request(request: &CompletionRequest) -> CreateChatCompletionRequest {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            vec![ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                        request.system.clone(),
                    ),
                    name: None,
                },
            )];

        if let Some(session) = &request.session {
            match session.history() {
                Ok(history) => {
                    messages.extend(history.iter().map(Self::convert_history_message));
                }
                Err(e) => {
                    tracing::warn!(session = session.id(), error = %e, "cannot replay session history");
                }
            }
        }

        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                    request.input.clone(),
                ),
                name: None,
            },
        ));

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: Some(request.temperature).filter(|&t| t != 0.0),
            max_completion_tokens: Some(request.max_tokens),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let api_request = Self::build_request(request);

        let response = self
            .client
            .chat()
            .create(api_request)
            .await
            .map_err(|e| RouterError::Provider {
                message: e.to_string(),
            })?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        // Session appends are best-effort: a logging failure must not
        // discard an already-produced answer.
        if let Some(session) = &request.session {
            if let Err(e) = session.append(MessageRole::User, &request.input) {
                tracing::warn!(session = session.id(), error = %e, "cannot append user turn");
            }
            if let Err(e) = session.append(MessageRole::Assistant, &content) {
                tracing::warn!(session = session.id(), error = %e, "cannot append assistant turn");
            }
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::session::{Session, SessionStore};
    use std::sync::Arc;

    fn request() -> CompletionRequest {
        CompletionRequest::from_model(
            &ModelConfig {
                name: "gpt-4.1-mini".to_string(),
                temperature: 0.0,
                max_tokens: 256,
            },
            "You classify queries.",
            "what's the weather in Paris?",
        )
    }

    #[test]
    fn test_build_request_basic_shape() {
        let built = OpenAiProvider::build_request(&request());
        assert_eq!(built.model, "gpt-4.1-mini");
        // system + user input
        assert_eq!(built.messages.len(), 2);
        // Zero temperature is omitted so providers apply their default.
        assert!(built.temperature.is_none());
        assert_eq!(built.max_completion_tokens, Some(256));
    }

    #[test]
    fn test_build_request_replays_session_history() {
        let store = Arc::new(SessionStore::in_memory().unwrap_or_else(|_| unreachable!()));
        let session = Session::new("conv", store);
        session
            .append(MessageRole::User, "earlier question")
            .unwrap_or_else(|_| unreachable!());
        session
            .append(MessageRole::Assistant, "earlier answer")
            .unwrap_or_else(|_| unreachable!());

        let built = OpenAiProvider::build_request(&request().with_session(session));
        // system + 2 history + user input
        assert_eq!(built.messages.len(), 4);
        assert!(matches!(
            built.messages[1],
            ChatCompletionRequestMessage::User(_)
        ));
        assert!(matches!(
            built.messages[2],
            ChatCompletionRequestMessage::Assistant(_)
        ));
    }

    #[test]
    fn test_nonzero_temperature_is_forwarded() {
        let mut req = request();
        req.temperature = 0.4;
        let built = OpenAiProvider::build_request(&req);
        assert_eq!(built.temperature, Some(0.4));
    }
}
