//! Runtime settings for the backtracking orchestrator.

use std::collections::BTreeMap;

use crate::signal::CognitiveMode;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_MAX_REWINDS: u32 = 3;
pub const DEFAULT_MIN_MARKER_SPACING: usize = 30;
pub const DEFAULT_MAX_HINT_LENGTH: usize = 200;

/// Settings bundle read by the orchestrator and forwarded to providers.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Opaque model identifier forwarded to the provider.
    pub model: String,
    /// Rewind budget per response. Exhaustion is soft: further backtrack
    /// markers are ignored, the stream keeps going.
    pub max_rewinds: u32,
    /// Minimum characters between markers before a new checkpoint counts.
    pub min_marker_spacing: usize,
    /// Mode a fresh turn starts in.
    pub default_mode: CognitiveMode,
    /// Length cap applied when hints are rendered into the system prompt.
    pub max_hint_length: usize,
    /// Mode-to-temperature table.
    pub mode_temperatures: BTreeMap<CognitiveMode, f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_rewinds: DEFAULT_MAX_REWINDS,
            min_marker_spacing: DEFAULT_MIN_MARKER_SPACING,
            default_mode: CognitiveMode::Balanced,
            max_hint_length: DEFAULT_MAX_HINT_LENGTH,
            mode_temperatures: default_mode_temperatures(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_max_rewinds(mut self, max_rewinds: u32) -> Self {
        self.max_rewinds = max_rewinds;
        self
    }

    #[must_use]
    pub fn with_min_marker_spacing(mut self, min_marker_spacing: usize) -> Self {
        self.min_marker_spacing = min_marker_spacing;
        self
    }

    #[must_use]
    pub fn with_default_mode(mut self, default_mode: CognitiveMode) -> Self {
        self.default_mode = default_mode;
        self
    }

    #[must_use]
    pub fn with_max_hint_length(mut self, max_hint_length: usize) -> Self {
        self.max_hint_length = max_hint_length;
        self
    }

    #[must_use]
    pub fn with_mode_temperature(mut self, mode: CognitiveMode, temperature: f64) -> Self {
        self.mode_temperatures.insert(mode, temperature);
        self
    }

    /// Effective temperature for a mode, falling back to the mode's built-in
    /// default when the table has no entry.
    #[must_use]
    pub fn temperature_for(&self, mode: CognitiveMode) -> f64 {
        self.mode_temperatures
            .get(&mode)
            .copied()
            .unwrap_or_else(|| mode.default_temperature())
    }
}

fn default_mode_temperatures() -> BTreeMap<CognitiveMode, f64> {
    CognitiveMode::ALL
        .into_iter()
        .map(|mode| (mode, mode.default_temperature()))
        .collect()
}
