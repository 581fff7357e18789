//! Minimal provider-agnostic contract for streaming text generation.
//!
//! This crate intentionally defines only the shared request/response types
//! and the streaming lifecycle contract. It excludes provider transport
//! details, wire payloads, and orchestration concerns.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Stream of user-facing text deltas yielded by an active generation.
pub type DeltaStream = BoxStream<'static, Result<String, ProviderError>>;

/// Error returned while constructing/configuring a provider before any
/// stream is opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new provider initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Fatal failure surfaced by a provider during a run.
///
/// Both variants terminate the active turn; retrying is delegated to the
/// application layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The generation request was rejected before any delta was produced.
    #[error("inference request failed: {0}")]
    Request(String),
    /// The stream broke after generation started.
    #[error("inference stream interrupted: {0}")]
    Stream(String),
}

/// Role of one conversation turn as seen by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One model-facing conversation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Constructs a user-authored message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Constructs an assistant-authored message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Input required to open one streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// Outgoing message list, oldest first.
    pub messages: Vec<ChatMessage>,
    /// System prompt built freshly for this attempt.
    pub system: String,
    /// Effective sampling temperature for this attempt.
    pub temperature: f64,
}

/// Immutable metadata describing an inference provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for streaming generation with cooperative cancellation.
///
/// Contract:
///
/// 1. `stream` opens a fresh generation and yields textual deltas until the
///    model completes or the stream is cancelled.
/// 2. `cancel` tears down the active stream and must complete (awaiting any
///    underlying teardown) before returning; once it returns, no further
///    delta from the cancelled stream is delivered.
/// 3. `cancel` is safe to call when no stream is active.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Opens a streaming generation for the given request.
    async fn stream(&self, request: StreamRequest) -> Result<DeltaStream, ProviderError>;

    /// Cancels the currently-active stream, if any.
    async fn cancel(&self);
}
