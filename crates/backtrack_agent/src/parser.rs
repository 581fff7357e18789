//! Streaming parser separating plain text from protocol markers.
//!
//! A four-state machine driven one character at a time. Strict tag-prefix
//! validation keeps buffering bounded: after `<<`, the next characters must
//! form a prefix of `checkpoint:` or `backtrack:` or the buffered content is
//! flushed back as text, so `<<` inside ordinary prose or source code (for
//! example `std::cout << "x"`) survives verbatim.

use crate::signal::{parse_signal_body, SignalEvent, MAX_SIGNAL_BODY_LEN, TAG_PREFIXES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Emitting plain text; `<` may open a marker.
    Text,
    /// One `<` seen.
    MaybeOpen,
    /// `<<` seen; validating the tag prefix character by character.
    TagCheck,
    /// Complete tag prefix matched; accumulating the body until `>>`.
    InSignal,
}

/// Incremental parser for model output streams.
///
/// Accepts arbitrarily chunked input; any two chunkings of the same input
/// produce the same event sequence once adjacent text events are joined.
#[derive(Debug)]
pub struct SignalParser {
    state: ParseState,
    /// Tag-check / signal-body characters (everything after `<<`).
    buffer: String,
    /// Plain text pending emission, batched per `feed` call.
    text: String,
}

impl Default for SignalParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ParseState::Text,
            buffer: String::new(),
            text: String::new(),
        }
    }

    /// Feed a chunk of streamed text, returning parsed events.
    pub fn feed(&mut self, chunk: &str) -> Vec<SignalEvent> {
        let mut events = Vec::new();

        for ch in chunk.chars() {
            match self.state {
                ParseState::Text => self.step_text(ch),
                ParseState::MaybeOpen => self.step_maybe_open(ch),
                ParseState::TagCheck => self.step_tag_check(ch),
                ParseState::InSignal => self.step_in_signal(ch, &mut events),
            }
        }

        if !self.text.is_empty() && self.state == ParseState::Text {
            events.push(SignalEvent::Text(std::mem::take(&mut self.text)));
        }

        events
    }

    /// Emit any partially-buffered content as literal text.
    ///
    /// Idempotent: a second flush with no intervening input emits nothing.
    pub fn flush(&mut self) -> Vec<SignalEvent> {
        let mut pending = std::mem::take(&mut self.text);
        match self.state {
            ParseState::Text => {}
            ParseState::MaybeOpen => pending.push('<'),
            ParseState::TagCheck | ParseState::InSignal => {
                pending.push_str("<<");
                pending.push_str(&self.buffer);
            }
        }

        self.buffer.clear();
        self.state = ParseState::Text;

        if pending.is_empty() {
            Vec::new()
        } else {
            vec![SignalEvent::Text(pending)]
        }
    }

    fn step_text(&mut self, ch: char) {
        if ch == '<' {
            self.state = ParseState::MaybeOpen;
        } else {
            self.text.push(ch);
        }
    }

    fn step_maybe_open(&mut self, ch: char) {
        if ch == '<' {
            self.state = ParseState::TagCheck;
            self.buffer.clear();
        } else {
            self.text.push('<');
            self.state = ParseState::Text;
            self.step_text(ch);
        }
    }

    fn step_tag_check(&mut self, ch: char) {
        // `<<<`: the leading bracket is text; the trailing `<<` stays a
        // candidate marker open.
        if ch == '<' && self.buffer.is_empty() {
            self.text.push('<');
            return;
        }

        let accepted = TAG_PREFIXES.iter().any(|prefix| {
            prefix
                .get(self.buffer.len()..)
                .is_some_and(|rest| rest.starts_with(ch))
        });

        if accepted {
            self.buffer.push(ch);
            if TAG_PREFIXES.contains(&self.buffer.as_str()) {
                self.state = ParseState::InSignal;
            }
        } else {
            self.text.push_str("<<");
            self.text.push_str(&self.buffer);
            self.buffer.clear();
            self.state = ParseState::Text;
            self.step_text(ch);
        }
    }

    fn step_in_signal(&mut self, ch: char, events: &mut Vec<SignalEvent>) {
        self.buffer.push(ch);
        if self.buffer.chars().count() > MAX_SIGNAL_BODY_LEN {
            self.text.push_str("<<");
            self.text.push_str(&self.buffer);
            self.buffer.clear();
            self.state = ParseState::Text;
        } else if self.buffer.ends_with(">>") {
            self.complete_signal(events);
        }
    }

    fn complete_signal(&mut self, events: &mut Vec<SignalEvent>) {
        let body = &self.buffer[..self.buffer.len() - 2];
        match parse_signal_body(body) {
            Some(event) => {
                if !self.text.is_empty() {
                    events.push(SignalEvent::Text(std::mem::take(&mut self.text)));
                }
                events.push(event);
            }
            None => {
                self.text.push_str("<<");
                self.text.push_str(&self.buffer);
            }
        }

        self.buffer.clear();
        self.state = ParseState::Text;
    }
}
