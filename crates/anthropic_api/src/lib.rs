//! Transport-only Anthropic Messages API client primitives.
//!
//! This crate owns request building, response/error parsing, and SSE stream
//! decoding for the Messages endpoint only. It intentionally contains no
//! credential management and no orchestration coupling; callers hand it a
//! ready [`AnthropicApiConfig`] and consume normalized
//! [`MessagesStreamEvent`] values.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{AnthropicApiClient, MessagesEventStream, StreamTaskHandle};
pub use config::AnthropicApiConfig;
pub use error::AnthropicApiError;
pub use events::{MessagesStreamEvent, StopReason};
pub use payload::{MessagePayload, MessagesRequest};
pub use retry::RetryPolicy;
pub use sse::MessagesSseParser;
pub use url::normalize_messages_url;
