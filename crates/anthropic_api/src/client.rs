use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::AnthropicApiConfig;
use crate::error::{parse_error_message, AnthropicApiError};
use crate::events::MessagesStreamEvent;
use crate::headers::build_headers;
use crate::payload::MessagesRequest;
use crate::retry::RetryPolicy;
use crate::sse::MessagesSseParser;
use crate::url::normalize_messages_url;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct AnthropicApiClient {
    http: Client,
    config: AnthropicApiConfig,
}

/// Channel-backed stream of normalized Messages API events.
///
/// Events arrive as they are decoded from the wire; the stream ends when the
/// response body is exhausted or the forwarding task is shut down.
#[derive(Debug)]
pub struct MessagesEventStream {
    receiver: mpsc::Receiver<Result<MessagesStreamEvent, AnthropicApiError>>,
}

impl Stream for MessagesEventStream {
    type Item = Result<MessagesStreamEvent, AnthropicApiError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Handle to the background task forwarding SSE bytes into the event stream.
///
/// `shutdown` aborts the task and awaits its completion; once it returns, no
/// further event is sent into the paired [`MessagesEventStream`].
#[derive(Debug)]
pub struct StreamTaskHandle {
    task: JoinHandle<()>,
}

impl StreamTaskHandle {
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl AnthropicApiClient {
    pub fn new(config: AnthropicApiConfig) -> Result<Self, AnthropicApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(AnthropicApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AnthropicApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_messages_url(&self.config.base_url)
    }

    pub fn build_headers(&self, user_agent: Option<&str>) -> Result<HeaderMap, AnthropicApiError> {
        let headers = build_headers(&self.config, user_agent)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    AnthropicApiError::InvalidBaseUrl(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    AnthropicApiError::InvalidBaseUrl(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &MessagesRequest,
    ) -> Result<reqwest::RequestBuilder, AnthropicApiError> {
        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        Ok(self
            .http
            .post(self.normalized_endpoint())
            .headers(headers)
            .json(request))
    }

    pub async fn send_with_retry(
        &self,
        request: &MessagesRequest,
    ) -> Result<Response, AnthropicApiError> {
        let policy = RetryPolicy::default();
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=policy.max_attempts {
            let response = self
                .build_request(request)?
                .send()
                .await
                .map_err(AnthropicApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| String::from("request failed"));
                    let message = parse_error_message(status, &body);

                    if attempt < policy.max_attempts && policy.should_retry(status.as_u16(), &body)
                    {
                        tracing::debug!(status = status.as_u16(), attempt, "retrying request");
                        last_error = Some(message);
                        tokio::time::sleep(policy.delay_for(attempt)).await;
                        continue;
                    }

                    return Err(AnthropicApiError::Status(status, message));
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message.clone());
                    if attempt < policy.max_attempts {
                        tracing::debug!(attempt, error = %message, "retrying after request error");
                        tokio::time::sleep(policy.delay_for(attempt)).await;
                        continue;
                    }
                    return Err(AnthropicApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(AnthropicApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Open a streaming generation and return its event stream plus a handle
    /// to the background forwarding task.
    ///
    /// HTTP-level failures surface from this call; wire-level failures after
    /// the stream opens surface as `Err` items on the event stream.
    pub async fn stream_messages(
        &self,
        request: &MessagesRequest,
    ) -> Result<(MessagesEventStream, StreamTaskHandle), AnthropicApiError> {
        let response = self.send_with_retry(request).await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let body = response.bytes_stream();
        let task = tokio::spawn(forward_sse(body, tx));

        Ok((
            MessagesEventStream { receiver: rx },
            StreamTaskHandle { task },
        ))
    }
}

async fn forward_sse(
    mut body: impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
    tx: mpsc::Sender<Result<MessagesStreamEvent, AnthropicApiError>>,
) {
    let mut parser = MessagesSseParser::default();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                let _ = tx.send(Err(AnthropicApiError::Request(error))).await;
                return;
            }
        };

        for event in parser.feed(&chunk) {
            let item = match event {
                MessagesStreamEvent::Error {
                    error_type,
                    message,
                } => Err(AnthropicApiError::StreamFailed {
                    error_type,
                    message: message.unwrap_or_else(|| "unknown stream error".to_string()),
                }),
                event => Ok(event),
            };

            let failed = item.is_err();
            if tx.send(item).await.is_err() {
                // Receiver dropped, stop forwarding.
                return;
            }
            if failed {
                return;
            }
        }
    }
}
