use std::collections::BTreeMap;

use crate::config::AnthropicApiConfig;
use crate::error::AnthropicApiError;

pub const HEADER_API_KEY: &str = "x-api-key";
pub const HEADER_VERSION: &str = "anthropic-version";
pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_USER_AGENT: &str = "user-agent";

/// Build a deterministic header map for Messages API requests.
pub fn build_headers(
    config: &AnthropicApiConfig,
    user_agent: Option<&str>,
) -> Result<BTreeMap<String, String>, AnthropicApiError> {
    if config.api_key.trim().is_empty() {
        return Err(AnthropicApiError::MissingApiKey);
    }

    let version = config.version.trim();
    if version.is_empty() {
        return Err(AnthropicApiError::InvalidVersion);
    }

    let mut headers = BTreeMap::new();
    headers.insert(HEADER_API_KEY.to_owned(), config.api_key.trim().to_owned());
    headers.insert(HEADER_VERSION.to_owned(), version.to_owned());
    headers.insert(HEADER_ACCEPT.to_owned(), "text/event-stream".to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );

    let ua = match (user_agent, config.user_agent.as_deref()) {
        (Some(explicit), _) if !explicit.trim().is_empty() => explicit.trim().to_owned(),
        (None, Some(configured)) if !configured.trim().is_empty() => configured.trim().to_owned(),
        _ => default_user_agent(),
    };
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok(headers)
}

fn default_user_agent() -> String {
    format!(
        "backtrack-agent/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

#[cfg(test)]
mod tests {
    use super::{build_headers, HEADER_API_KEY, HEADER_USER_AGENT, HEADER_VERSION};
    use crate::config::AnthropicApiConfig;
    use crate::error::AnthropicApiError;

    #[test]
    fn headers_carry_key_version_and_content_negotiation() {
        let config = AnthropicApiConfig::new("sk-test");
        let headers = build_headers(&config, None).expect("headers should build");

        assert_eq!(headers.get(HEADER_API_KEY).map(String::as_str), Some("sk-test"));
        assert_eq!(
            headers.get(HEADER_VERSION).map(String::as_str),
            Some("2023-06-01")
        );
        assert_eq!(
            headers.get("accept").map(String::as_str),
            Some("text/event-stream")
        );
        assert_eq!(
            headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let config = AnthropicApiConfig::new("   ");
        let error = build_headers(&config, None).expect_err("blank key should fail");

        assert!(matches!(error, AnthropicApiError::MissingApiKey));
    }

    #[test]
    fn explicit_user_agent_wins_over_configured_one() {
        let config = AnthropicApiConfig::new("sk-test").with_user_agent("configured/1.0");

        let headers =
            build_headers(&config, Some("explicit/2.0")).expect("headers should build");
        assert_eq!(
            headers.get(HEADER_USER_AGENT).map(String::as_str),
            Some("explicit/2.0")
        );

        let headers = build_headers(&config, None).expect("headers should build");
        assert_eq!(
            headers.get(HEADER_USER_AGENT).map(String::as_str),
            Some("configured/1.0")
        );
    }

    #[test]
    fn extra_headers_are_lowercased_and_merged() {
        let config = AnthropicApiConfig::new("sk-test").insert_header("X-Trace-Id", "abc123");
        let headers = build_headers(&config, None).expect("headers should build");

        assert_eq!(
            headers.get("x-trace-id").map(String::as_str),
            Some("abc123")
        );
    }
}
