//! Anthropic-backed implementation of the shared `inference_provider`
//! contract.
//!
//! This adapter translates `anthropic_api` stream semantics into the plain
//! text-delta stream expected by stream consumers. Cancellation aborts the
//! transport forwarding task and awaits its teardown, so once `cancel`
//! returns no further delta from the cancelled stream is delivered.

use std::time::Duration;

use anthropic_api::{
    normalize_messages_url, AnthropicApiClient, AnthropicApiConfig, MessagePayload,
    MessagesRequest, MessagesStreamEvent, StreamTaskHandle,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use inference_provider::{
    DeltaStream, InferenceProvider, ProviderError, ProviderInitError, ProviderProfile,
    StreamRequest,
};
use tokio::sync::Mutex;
use url::Url;

/// Stable provider identifier used for explicit startup selection.
pub const ANTHROPIC_PROVIDER_ID: &str = "anthropic";

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Runtime configuration for the Anthropic provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnthropicProviderConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidatedConfig {
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl ValidatedConfig {
    fn into_api_config(self) -> AnthropicApiConfig {
        let mut config = AnthropicApiConfig::new(self.api_key);

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

impl AnthropicProviderConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn validate(self) -> Result<ValidatedConfig, ProviderInitError> {
        let api_key = sanitize_required_string(self.api_key, "api key")?;
        let model = sanitize_required_string(self.model, "model id")?;
        let base_url = sanitize_optional_string(self.base_url, "base URL")?;

        if self.max_tokens == 0 {
            return Err(ProviderInitError::new(
                "anthropic provider max_tokens must be greater than zero",
            ));
        }

        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(ProviderInitError::new(
                    "anthropic provider timeout must be greater than zero when provided",
                ));
            }
        }

        if let Some(base_url) = base_url.as_deref() {
            let endpoint = normalize_messages_url(base_url);
            Url::parse(&endpoint).map_err(|error| {
                ProviderInitError::new(format!("anthropic provider base URL is invalid: {error}"))
            })?;
        }

        Ok(ValidatedConfig {
            api_key,
            model,
            max_tokens: self.max_tokens,
            base_url,
            timeout: self.timeout,
        })
    }
}

/// `InferenceProvider` adapter backed by `anthropic_api` transport
/// primitives.
pub struct AnthropicProvider {
    client: AnthropicApiClient,
    model: String,
    max_tokens: u32,
    active: Mutex<Option<StreamTaskHandle>>,
}

impl AnthropicProvider {
    /// Creates a provider using real Anthropic transport.
    pub fn new(config: AnthropicProviderConfig) -> Result<Self, ProviderInitError> {
        let validated = config.validate()?;
        let model = validated.model.clone();
        let max_tokens = validated.max_tokens;

        let client = AnthropicApiClient::new(validated.into_api_config())
            .map_err(|error| ProviderInitError::new(format!(
                "Failed to initialize anthropic provider: {error}"
            )))?;
        client
            .build_headers(None)
            .map_err(|error| ProviderInitError::new(format!(
                "Failed to initialize anthropic provider: {error}"
            )))?;

        Ok(Self {
            client,
            model,
            max_tokens,
            active: Mutex::new(None),
        })
    }
}

/// Assemble the wire request for one streaming attempt.
fn build_messages_request(
    model: &str,
    max_tokens: u32,
    request: &StreamRequest,
) -> MessagesRequest {
    let messages = request
        .messages
        .iter()
        .map(|message| MessagePayload::new(message.role.as_str(), message.content.clone()));

    MessagesRequest::new(model, max_tokens)
        .with_system(request.system.clone())
        .with_temperature(request.temperature)
        .with_messages(messages)
}

#[async_trait]
impl InferenceProvider for AnthropicProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: ANTHROPIC_PROVIDER_ID.to_string(),
            model_id: self.model.clone(),
        }
    }

    async fn stream(&self, request: StreamRequest) -> Result<DeltaStream, ProviderError> {
        let wire_request = build_messages_request(&self.model, self.max_tokens, &request);

        let (events, handle) = self
            .client
            .stream_messages(&wire_request)
            .await
            .map_err(|error| ProviderError::Request(error.to_string()))?;

        // Replace-and-teardown keeps at most one forwarding task alive.
        let previous = self.active.lock().await.replace(handle);
        if let Some(previous) = previous {
            tracing::debug!("tearing down stale stream task before starting a new one");
            previous.shutdown().await;
        }

        let deltas = events
            .filter_map(|event| async move {
                match event {
                    Ok(MessagesStreamEvent::TextDelta { text }) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(error) => Some(Err(ProviderError::Stream(error.to_string()))),
                }
            })
            .boxed();

        Ok(deltas)
    }

    async fn cancel(&self) {
        let handle = self.active.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }
}

fn sanitize_required_string(value: String, field_name: &str) -> Result<String, ProviderInitError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProviderInitError::new(format!(
            "anthropic provider requires a non-empty {field_name}",
        )));
    }

    Ok(trimmed.to_string())
}

fn sanitize_optional_string(
    value: Option<String>,
    field_name: &str,
) -> Result<Option<String>, ProviderInitError> {
    match value {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ProviderInitError::new(format!(
                    "anthropic provider field '{field_name}' cannot be empty when provided",
                )))
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use inference_provider::{ChatMessage, InferenceProvider, StreamRequest};

    use super::{
        build_messages_request, AnthropicProvider, AnthropicProviderConfig, ANTHROPIC_PROVIDER_ID,
    };

    fn init_error(config: AnthropicProviderConfig) -> inference_provider::ProviderInitError {
        match AnthropicProvider::new(config) {
            Ok(_) => panic!("provider init should fail for this test case"),
            Err(error) => error,
        }
    }

    #[test]
    fn profile_reports_anthropic_provider_id_and_model() {
        let provider = AnthropicProvider::new(AnthropicProviderConfig::new(
            "sk-test",
            "test-model",
        ))
        .expect("provider should build");

        let profile = provider.profile();
        assert_eq!(profile.provider_id, ANTHROPIC_PROVIDER_ID);
        assert_eq!(profile.model_id, "test-model");
    }

    #[test]
    fn wire_request_maps_roles_system_and_temperature() {
        let request = StreamRequest {
            messages: vec![
                ChatMessage::user("question"),
                ChatMessage::assistant("partial answer"),
                ChatMessage::user("continue"),
            ],
            system: "system prompt".to_string(),
            temperature: 0.7,
        };

        let wire = build_messages_request("test-model", 2048, &request);

        assert_eq!(wire.model, "test-model");
        assert_eq!(wire.max_tokens, 2048);
        assert_eq!(wire.system.as_deref(), Some("system prompt"));
        assert_eq!(wire.temperature, Some(0.7));
        assert!(wire.stream);

        let roles: Vec<&str> = wire
            .messages
            .iter()
            .map(|message| message.role.as_str())
            .collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert_eq!(wire.messages[1].content, "partial answer");
    }

    #[tokio::test]
    async fn cancel_without_active_stream_is_a_no_op() {
        let provider = AnthropicProvider::new(AnthropicProviderConfig::new(
            "sk-test",
            "test-model",
        ))
        .expect("provider should build");

        provider.cancel().await;
        provider.cancel().await;
    }

    #[test]
    fn new_rejects_empty_api_key() {
        let error = init_error(AnthropicProviderConfig::new("   ", "test-model"));
        assert!(error.message().contains("non-empty api key"));
    }

    #[test]
    fn new_rejects_empty_model() {
        let error = init_error(AnthropicProviderConfig::new("sk-test", " "));
        assert!(error.message().contains("non-empty model id"));
    }

    #[test]
    fn new_rejects_zero_max_tokens() {
        let error = init_error(
            AnthropicProviderConfig::new("sk-test", "test-model").with_max_tokens(0),
        );
        assert!(error.message().contains("max_tokens"));
    }

    #[test]
    fn new_rejects_blank_base_url() {
        let error =
            init_error(AnthropicProviderConfig::new("sk-test", "test-model").with_base_url("  "));
        assert!(error.message().contains("base URL"));
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        let error = init_error(
            AnthropicProviderConfig::new("sk-test", "test-model")
                .with_base_url("https://exa mple.com"),
        );
        assert!(error.message().contains("base URL is invalid"));
    }

    #[test]
    fn new_rejects_zero_timeout() {
        let error = init_error(
            AnthropicProviderConfig::new("sk-test", "test-model")
                .with_timeout(Duration::from_secs(0)),
        );
        assert!(error.message().contains("greater than zero"));
    }
}
