/// Default base URL for Anthropic transport requests.
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Normalize a base URL to a Messages API endpoint.
///
/// Normalization rules:
/// 1) keep `/v1/messages` unchanged
/// 2) append `/messages` when the path ends in `/v1`
/// 3) append `/v1/messages` otherwise
pub fn normalize_messages_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_ANTHROPIC_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/v1/messages") {
        return trimmed.to_string();
    }
    if trimmed.ends_with("/v1") {
        return format!("{trimmed}/messages");
    }
    format!("{trimmed}/v1/messages")
}
