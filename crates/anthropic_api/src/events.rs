use serde_json::Value;

/// Canonical stop reason mapped from `message_delta` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    Refusal,
}

impl StopReason {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "end_turn" => Self::EndTurn,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            "refusal" => Self::Refusal,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::StopSequence => "stop_sequence",
            Self::Refusal => "refusal",
        }
    }
}

/// Stream event emitted by the SSE parser after normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagesStreamEvent {
    MessageStart {
        id: Option<String>,
        model: Option<String>,
    },
    ContentBlockStart {
        index: u64,
        block_type: Option<String>,
    },
    TextDelta {
        text: String,
    },
    ContentBlockStop {
        index: u64,
    },
    MessageDelta {
        stop_reason: Option<StopReason>,
    },
    MessageStop,
    Ping,
    Error {
        error_type: Option<String>,
        message: Option<String>,
    },
    /// Unknown event type retained for parity-safe passthrough behavior.
    Unknown {
        event_type: String,
        payload: Value,
    },
}
