use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum AnthropicApiError {
    MissingApiKey,
    InvalidVersion,
    InvalidBaseUrl(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    StreamFailed {
        error_type: Option<String>,
        message: String,
    },
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    Cancelled,
    Unknown(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "error")]
    pub value: Option<ErrorPayloadFields>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayloadFields {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub message: Option<String>,
}

impl ErrorPayloadFields {
    pub fn message_or_fallback(&self) -> Option<String> {
        if let Some(message) = self.message.as_deref().and_then(non_empty_string) {
            return Some(message.to_owned());
        }

        self.type_
            .as_deref()
            .and_then(non_empty_string)
            .map(ToOwned::to_owned)
    }
}

impl fmt::Display for AnthropicApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "api key is required"),
            Self::InvalidVersion => write!(f, "anthropic-version header value is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::StreamFailed {
                error_type,
                message,
            } => match error_type {
                Some(error_type) if !error_type.trim().is_empty() => {
                    write!(f, "stream failed ({error_type}): {message}")
                }
                _ => write!(f, "stream failed: {message}"),
            },
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(
                    f,
                    "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})"
                )
            }
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for AnthropicApiError {}

impl From<reqwest::Error> for AnthropicApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for AnthropicApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extract a human-readable message from an error response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let parsed = match serde_json::from_str::<ErrorPayload>(body) {
        Ok(payload) => payload,
        Err(_) => {
            return fallback_message(status, body);
        }
    };

    if let Some(error) = parsed.value {
        if let Some(message) = error.message_or_fallback() {
            return message;
        }
    }

    fallback_message(status, body)
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::{parse_error_message, AnthropicApiError};

    #[test]
    fn structured_error_body_yields_its_message() {
        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"Too many requests"}}"#;
        assert_eq!(
            parse_error_message(StatusCode::TOO_MANY_REQUESTS, body),
            "Too many requests"
        );
    }

    #[test]
    fn error_type_stands_in_when_the_message_is_absent() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error"}}"#;
        let status = StatusCode::from_u16(529).expect("529 is a valid status code");
        assert_eq!(parse_error_message(status, body), "overloaded_error");
    }

    #[test]
    fn unstructured_body_is_passed_through() {
        assert_eq!(
            parse_error_message(StatusCode::BAD_GATEWAY, "upstream connect error"),
            "upstream connect error"
        );
    }

    #[test]
    fn empty_body_falls_back_to_canonical_reason() {
        assert_eq!(
            parse_error_message(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
    }

    #[test]
    fn stream_failed_display_includes_error_type_when_present() {
        let error = AnthropicApiError::StreamFailed {
            error_type: Some("overloaded_error".to_string()),
            message: "Overloaded".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "stream failed (overloaded_error): Overloaded"
        );

        let error = AnthropicApiError::StreamFailed {
            error_type: None,
            message: "Overloaded".to_string(),
        };
        assert_eq!(error.to_string(), "stream failed: Overloaded");
    }
}
