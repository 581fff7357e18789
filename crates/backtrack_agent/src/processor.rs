//! Stream processor: orchestrates inference, parsing, and rewinds.
//!
//! One `run` call handles one user turn. Each retry iteration opens a fresh
//! provider stream, feeds every delta through a fresh [`SignalParser`], and
//! reacts to the parsed events: text accumulates and is forwarded, a
//! checkpoint snapshots the accumulated response, a backtrack cancels the
//! stream, truncates state back to the named checkpoint, and re-enters the
//! loop with an extra hint in the system prompt.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use inference_provider::{ChatMessage, InferenceProvider, StreamRequest};

use crate::checkpoint::CheckpointStore;
use crate::config::Settings;
use crate::parser::SignalParser;
use crate::signal::{BacktrackSignal, CheckpointSignal, CognitiveMode, SignalEvent};
use crate::system_prompt::build_system_prompt;

/// User-role directive appended after the preserved assistant prefix on a
/// retry. The provider refuses true assistant prefill, so the preserved text
/// rides along as a prior assistant turn followed by this instruction.
pub const CONTINUE_PROMPT: &str = "Continue your response directly from where you left off. \
Do not repeat, summarize, or acknowledge this instruction. Pick up mid-sentence if needed.";

/// Sink for the events a run produces, in stream order.
///
/// Always-async: synchronous implementations simply return ready futures.
/// Between an `on_backtrack` call and the next `on_text`, no other event is
/// delivered, so a UI may re-render the response as the given prefix and
/// append subsequent chunks.
#[async_trait]
pub trait RunCallbacks: Send {
    /// A visible-text chunk has been produced.
    async fn on_text(&mut self, segment: &str);

    /// A rewind just took effect; `new_visible_prefix` is the authoritative
    /// new user-visible text.
    async fn on_backtrack(&mut self, signal: &BacktrackSignal, new_visible_prefix: &str);

    /// A fatal provider error occurred and the turn has been rolled back.
    async fn on_error(&mut self, message: &str);

    /// The turn completed normally and `full_text` has been committed.
    async fn on_done(&mut self, full_text: &str);
}

/// Mutable state for a single `run` invocation.
#[derive(Debug)]
struct RunCtx {
    visible: String,
    raw: String,
    checkpoints: CheckpointStore,
    hints: Vec<String>,
    mode: CognitiveMode,
    temperature_override: Option<f64>,
    rewinds_used: u32,
    chars_since_marker: usize,
}

impl RunCtx {
    fn new(settings: &Settings) -> Self {
        Self {
            visible: String::new(),
            raw: String::new(),
            checkpoints: CheckpointStore::new(),
            hints: Vec::new(),
            mode: settings.default_mode,
            temperature_override: None,
            rewinds_used: 0,
            // The first checkpoint of a turn is always eligible.
            chars_since_marker: settings.min_marker_spacing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventOutcome {
    Continue,
    Rewound,
}

/// Orchestrates inference with backtrack interception.
pub struct StreamProcessor {
    provider: Arc<dyn InferenceProvider>,
    settings: Settings,
    history: Vec<ChatMessage>,
}

impl StreamProcessor {
    #[must_use]
    pub fn new(provider: Arc<dyn InferenceProvider>, settings: Settings) -> Self {
        Self {
            provider,
            settings,
            history: Vec::new(),
        }
    }

    /// Committed conversation history: completed user/assistant pairs only.
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Process one user message with backtracking support.
    ///
    /// All outcomes are surfaced through `callbacks`; on provider failure
    /// the committed history is left exactly as it was at entry.
    pub async fn run(&mut self, user_message: &str, callbacks: &mut dyn RunCallbacks) {
        let mut ctx = RunCtx::new(&self.settings);
        tracing::debug!(chars = user_message.len(), "starting user turn");

        let mut parser = loop {
            let request = self.compose_request(user_message, &ctx);
            let mut parser = SignalParser::new();

            let mut stream = match self.provider.stream(request).await {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::warn!(%error, "provider rejected the stream request");
                    callbacks.on_error(&format!("Inference error: {error}")).await;
                    return;
                }
            };

            let mut rewound = false;
            'deltas: while let Some(delta) = stream.next().await {
                let delta = match delta {
                    Ok(delta) => delta,
                    Err(error) => {
                        tracing::warn!(%error, "provider stream broke mid-turn");
                        callbacks.on_error(&format!("Inference error: {error}")).await;
                        return;
                    }
                };

                for event in parser.feed(&delta) {
                    if self.apply_event(event, &mut ctx, callbacks).await == EventOutcome::Rewound
                    {
                        // Events already parsed from this delta belong to the
                        // cancelled branch and are dropped with it.
                        rewound = true;
                        break 'deltas;
                    }
                }
            }

            if !rewound {
                break parser;
            }
        };

        for event in parser.flush() {
            if let SignalEvent::Text(text) = event {
                ctx.visible.push_str(&text);
                ctx.raw.push_str(&text);
                callbacks.on_text(&text).await;
            }
        }

        self.history.push(ChatMessage::user(user_message));
        self.history.push(ChatMessage::assistant(ctx.visible.clone()));
        tracing::debug!(
            chars = ctx.visible.len(),
            rewinds = ctx.rewinds_used,
            "turn completed"
        );
        callbacks.on_done(&ctx.visible).await;
    }

    fn compose_request(&self, user_message: &str, ctx: &RunCtx) -> StreamRequest {
        let temperature = ctx
            .temperature_override
            .unwrap_or_else(|| self.settings.temperature_for(ctx.mode));

        if !ctx.hints.is_empty() {
            tracing::debug!(
                mode = ctx.mode.as_str(),
                temperature,
                hints = ?ctx.hints,
                "composing retry request"
            );
        }

        StreamRequest {
            messages: self.continuation_messages(user_message, &ctx.raw),
            system: build_system_prompt(&ctx.hints, ctx.mode, temperature, &self.settings),
            temperature,
        }
    }

    /// Outgoing message list for one attempt.
    ///
    /// The pending user message is spliced in at composition time and only
    /// joins the committed history together with the completed assistant
    /// response; the preserved-prefix pair is ephemeral and never committed.
    fn continuation_messages(&self, user_message: &str, raw_accum: &str) -> Vec<ChatMessage> {
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(user_message));

        if !raw_accum.trim().is_empty() {
            messages.push(ChatMessage::assistant(raw_accum));
            messages.push(ChatMessage::user(CONTINUE_PROMPT));
        }

        messages
    }

    async fn apply_event(
        &self,
        event: SignalEvent,
        ctx: &mut RunCtx,
        callbacks: &mut dyn RunCallbacks,
    ) -> EventOutcome {
        match event {
            SignalEvent::Text(text) => {
                ctx.visible.push_str(&text);
                ctx.raw.push_str(&text);
                ctx.chars_since_marker += text.chars().count();
                tracing::trace!(chars = text.len(), "text chunk");
                callbacks.on_text(&text).await;
                EventOutcome::Continue
            }
            SignalEvent::Checkpoint(checkpoint) => {
                self.apply_checkpoint(checkpoint, ctx);
                EventOutcome::Continue
            }
            SignalEvent::Backtrack(backtrack) => {
                self.apply_backtrack(backtrack, ctx, callbacks).await
            }
        }
    }

    fn apply_checkpoint(&self, checkpoint: CheckpointSignal, ctx: &mut RunCtx) {
        if ctx.chars_since_marker < self.settings.min_marker_spacing {
            tracing::debug!(id = %checkpoint.id, "checkpoint ignored, too soon after last marker");
            return;
        }

        // The raw accumulator keeps the literal marker so the model does not
        // re-mint the same id when it continues from this prefix.
        ctx.raw.push_str("<<checkpoint:");
        ctx.raw.push_str(&checkpoint.id);
        ctx.raw.push_str(">>");
        ctx.checkpoints
            .register(checkpoint.id.clone(), ctx.visible.clone(), ctx.raw.clone());
        ctx.chars_since_marker = 0;
        tracing::debug!(
            id = %checkpoint.id,
            position = ctx.visible.len(),
            total = ctx.checkpoints.len(),
            "checkpoint registered"
        );
    }

    async fn apply_backtrack(
        &self,
        mut backtrack: BacktrackSignal,
        ctx: &mut RunCtx,
        callbacks: &mut dyn RunCallbacks,
    ) -> EventOutcome {
        if ctx.rewinds_used >= self.settings.max_rewinds {
            tracing::debug!(
                id = %backtrack.checkpoint_id,
                "backtrack ignored, rewind budget exhausted"
            );
            return EventOutcome::Continue;
        }

        let Some(record) = ctx.checkpoints.get(&backtrack.checkpoint_id).cloned() else {
            tracing::debug!(
                id = %backtrack.checkpoint_id,
                "backtrack ignored, unknown checkpoint"
            );
            return EventOutcome::Continue;
        };

        let mode = backtrack.mode.as_deref().and_then(CognitiveMode::parse);
        if backtrack.mode.is_some() && mode.is_none() {
            tracing::debug!(
                mode = backtrack.mode.as_deref().unwrap_or_default(),
                "unknown mode, keeping current"
            );
            backtrack.mode = None;
        }

        if let Some(temperature) = backtrack.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                tracing::debug!(temperature, "temperature out of range, discarding");
                backtrack.temperature = None;
            }
        }

        tracing::debug!(
            id = %backtrack.checkpoint_id,
            reason = %backtrack.reason,
            rewinds_used = ctx.rewinds_used,
            "rewinding to checkpoint"
        );

        // Must complete before state surgery: once cancel returns, no delta
        // from the cancelled stream reaches a parser.
        self.provider.cancel().await;

        ctx.visible = record.visible_prefix;
        ctx.raw = record.raw_prefix;
        ctx.checkpoints.prune_after(record.position);
        ctx.hints.push(backtrack.reason.clone());
        if let Some(mode) = mode {
            ctx.mode = mode;
        }
        if let Some(temperature) = backtrack.temperature {
            ctx.temperature_override = Some(temperature);
        }
        ctx.rewinds_used += 1;
        // The retry branch may open with a checkpoint immediately.
        ctx.chars_since_marker = self.settings.min_marker_spacing;

        callbacks.on_backtrack(&backtrack, &ctx.visible).await;
        EventOutcome::Rewound
    }
}
