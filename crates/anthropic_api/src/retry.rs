//! Retry schedule for transient Messages API failures.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Error-body fragments that mark a failure as transient even when the
/// status code alone is inconclusive.
const TRANSIENT_BODY_PATTERNS: [&str; 5] = [
    "overloaded",
    "rate[ _-]?limit",
    "service[ _-]?unavailable",
    "upstream[ _-]?connect",
    "connection[ _-]?reset",
];

/// Bounded exponential backoff: the delay doubles from `base` and saturates
/// at `ceiling`. No jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt.
    pub max_attempts: u32,
    pub base: Duration,
    pub ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(500),
            ceiling: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Whether a failed attempt is worth repeating.
    #[must_use]
    pub fn should_retry(&self, status: u16, error_text: &str) -> bool {
        is_transient_status(status) || transient_body_matcher().is_match(error_text)
    }

    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.base;
        for _ in 0..attempt {
            if delay >= self.ceiling {
                return self.ceiling;
            }
            delay = delay.saturating_mul(2);
        }
        delay.min(self.ceiling)
    }
}

/// Statuses the Messages endpoint uses for pressure and infrastructure
/// hiccups. 529 is the Anthropic overloaded status.
fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

fn transient_body_matcher() -> &'static Regex {
    static MATCHER: OnceLock<Regex> = OnceLock::new();
    MATCHER.get_or_init(|| {
        let pattern = format!("(?i){}", TRANSIENT_BODY_PATTERNS.join("|"));
        Regex::new(&pattern).expect("transient pattern list must form a valid regex")
    })
}
