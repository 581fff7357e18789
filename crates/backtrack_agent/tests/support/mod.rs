#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use backtrack_agent::{BacktrackSignal, RunCallbacks, Settings, StreamProcessor};
use inference_provider::InferenceProvider;
use inference_provider_mock::ScriptedProvider;

/// Collects callback invocations for assertions.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    pub texts: Vec<String>,
    pub backtracks: Vec<(BacktrackSignal, String)>,
    pub errors: Vec<String>,
    pub done: Vec<String>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// All text segments joined in arrival order.
    pub fn combined_text(&self) -> String {
        self.texts.concat()
    }
}

#[async_trait]
impl RunCallbacks for RecordingCallbacks {
    async fn on_text(&mut self, segment: &str) {
        self.texts.push(segment.to_string());
    }

    async fn on_backtrack(&mut self, signal: &BacktrackSignal, new_visible_prefix: &str) {
        self.backtracks
            .push((signal.clone(), new_visible_prefix.to_string()));
    }

    async fn on_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    async fn on_done(&mut self, full_text: &str) {
        self.done.push(full_text.to_string());
    }
}

/// Settings with the spacing gate disabled, matching most scripted scenarios.
pub fn test_settings() -> Settings {
    Settings::default().with_min_marker_spacing(0)
}

pub fn processor_with(provider: &Arc<ScriptedProvider>, settings: Settings) -> StreamProcessor {
    StreamProcessor::new(
        Arc::clone(provider) as Arc<dyn InferenceProvider>,
        settings,
    )
}

/// Run one turn and return the recorded callbacks.
pub async fn run_turn(processor: &mut StreamProcessor, user_message: &str) -> RecordingCallbacks {
    let mut callbacks = RecordingCallbacks::new();
    processor.run(user_message, &mut callbacks).await;
    callbacks
}
