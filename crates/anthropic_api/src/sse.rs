use serde_json::Value;

use crate::events::{MessagesStreamEvent, StopReason};

/// Incremental parser for Messages API SSE streams.
///
/// Bytes accumulate until a blank line closes a frame; complete frames are
/// decoded and drained on every `feed`. The buffer stays raw bytes so a
/// multi-byte character split across network chunks is never corrupted.
#[derive(Debug, Default)]
pub struct MessagesSseParser {
    buffer: Vec<u8>,
}

impl MessagesSseParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<MessagesStreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some((at, width)) = frame_boundary(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..at + width).collect();
            events.extend(decode_frame(&frame[..at]));
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<MessagesStreamEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    /// True when no undelivered frame bytes remain (trailing whitespace
    /// aside).
    pub fn is_drained(&self) -> bool {
        self.buffer.iter().all(|byte| byte.is_ascii_whitespace())
    }
}

/// Locate the earliest frame terminator: a blank line in either LF or CRLF
/// convention. Returns its offset and width.
fn frame_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer
        .windows(2)
        .position(|pair| pair == b"\n\n")
        .map(|at| (at, 2));
    let crlf = buffer
        .windows(4)
        .position(|quad| quad == b"\r\n\r\n")
        .map(|at| (at, 4));

    match (lf, crlf) {
        (Some((lf_at, _)), Some(boundary)) if boundary.0 < lf_at => Some(boundary),
        (None, Some(boundary)) => Some(boundary),
        (found, _) => found,
    }
}

/// Decode one frame into normalized events.
///
/// Only `data:` lines carry payload; the `event:` line duplicates the JSON
/// `type` field and is ignored. Frames with no payload, undecodable bytes,
/// or non-JSON payloads produce nothing.
fn decode_frame(frame: &[u8]) -> Vec<MessagesStreamEvent> {
    let Ok(frame) = std::str::from_utf8(frame) else {
        return Vec::new();
    };

    let mut payload = String::new();
    for line in frame.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if !payload.is_empty() {
                payload.push('\n');
            }
            payload.push_str(data);
        }
    }

    if payload.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(&payload) {
        Ok(value) => map_event(value),
        Err(_) => Vec::new(),
    }
}

fn map_event(value: Value) -> Vec<MessagesStreamEvent> {
    let Some(event_type) = value
        .get("type")
        .and_then(|value| value.as_str())
        .map(ToOwned::to_owned)
    else {
        return Vec::new();
    };

    match event_type.as_str() {
        "message_start" => {
            let id = value
                .get("message")
                .and_then(|message| message.get("id"))
                .and_then(|value| value.as_str())
                .map(ToString::to_string);
            let model = value
                .get("message")
                .and_then(|message| message.get("model"))
                .and_then(|value| value.as_str())
                .map(ToString::to_string);
            vec![MessagesStreamEvent::MessageStart { id, model }]
        }
        "content_block_start" => {
            let index = value.get("index").and_then(Value::as_u64).unwrap_or(0);
            let block_type = value
                .get("content_block")
                .and_then(|block| block.get("type"))
                .and_then(|value| value.as_str())
                .map(ToString::to_string);
            vec![MessagesStreamEvent::ContentBlockStart { index, block_type }]
        }
        "content_block_delta" => {
            let delta_type = value
                .get("delta")
                .and_then(|delta| delta.get("type"))
                .and_then(|value| value.as_str());

            // Only text deltas reach callers; tool-input deltas have no
            // place in a text-only stream.
            if delta_type == Some("text_delta") {
                let text = value
                    .get("delta")
                    .and_then(|delta| delta.get("text"))
                    .and_then(|value| value.as_str())
                    .unwrap_or("");
                vec![MessagesStreamEvent::TextDelta {
                    text: text.to_owned(),
                }]
            } else {
                Vec::new()
            }
        }
        "content_block_stop" => {
            let index = value.get("index").and_then(Value::as_u64).unwrap_or(0);
            vec![MessagesStreamEvent::ContentBlockStop { index }]
        }
        "message_delta" => {
            let stop_reason = value
                .get("delta")
                .and_then(|delta| delta.get("stop_reason"))
                .and_then(|value| value.as_str())
                .and_then(StopReason::parse);
            vec![MessagesStreamEvent::MessageDelta { stop_reason }]
        }
        "message_stop" => vec![MessagesStreamEvent::MessageStop],
        "ping" => vec![MessagesStreamEvent::Ping],
        "error" => {
            let error_type = value
                .get("error")
                .and_then(|error| error.get("type"))
                .and_then(|value| value.as_str())
                .filter(|value| !value.is_empty())
                .map(ToString::to_string);
            let message = value
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(|value| value.as_str())
                .filter(|value| !value.is_empty())
                .map(ToString::to_string);
            vec![MessagesStreamEvent::Error {
                error_type,
                message,
            }]
        }
        _ => vec![MessagesStreamEvent::Unknown {
            event_type,
            payload: value,
        }],
    }
}
