//! Marker grammar for the backtrack protocol.
//!
//! Two marker forms, each wrapped in `<<` and `>>`:
//!
//! ```text
//! <<checkpoint:ID>>
//! <<backtrack:ID|REASON[|rephrase:TEXT][|mode:NAME][|temp:FLOAT]>>
//! ```
//!
//! Body parsing is total: anything that fails validation is reported as
//! "not a signal" and re-emitted by the parser as literal text.

/// Maximum length of a marker body (between `<<` and `>>`), in characters.
pub const MAX_SIGNAL_BODY_LEN: usize = 500;

pub const CHECKPOINT_TAG: &str = "checkpoint:";
pub const BACKTRACK_TAG: &str = "backtrack:";

/// Tag prefixes the parser enters signal mode for.
pub(crate) const TAG_PREFIXES: [&str; 2] = [CHECKPOINT_TAG, BACKTRACK_TAG];

const REPHRASE_FIELD: &str = "rephrase:";
const MODE_FIELD: &str = "mode:";
const TEMP_FIELD: &str = "temp:";

/// Named preset of inference parameters the model may request on a rewind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CognitiveMode {
    Precise,
    Balanced,
    Adversarial,
    Exploratory,
}

impl CognitiveMode {
    pub const ALL: [Self; 4] = [
        Self::Precise,
        Self::Balanced,
        Self::Adversarial,
        Self::Exploratory,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "precise" => Self::Precise,
            "balanced" => Self::Balanced,
            "adversarial" => Self::Adversarial,
            "exploratory" => Self::Exploratory,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precise => "precise",
            Self::Balanced => "balanced",
            Self::Adversarial => "adversarial",
            Self::Exploratory => "exploratory",
        }
    }

    /// Built-in sampling temperature for this mode.
    #[must_use]
    pub fn default_temperature(&self) -> f64 {
        match self {
            Self::Precise => 0.2,
            Self::Balanced => 0.6,
            Self::Adversarial => 0.7,
            Self::Exploratory => 0.9,
        }
    }
}

impl Default for CognitiveMode {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Parsed event emitted by the streaming parser, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    /// Contiguous run of user-visible characters.
    Text(String),
    /// Named rewind point placed by the model.
    Checkpoint(CheckpointSignal),
    /// Rewind directive referencing an earlier checkpoint.
    Backtrack(BacktrackSignal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSignal {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktrackSignal {
    pub checkpoint_id: String,
    pub reason: String,
    pub rephrase: Option<String>,
    /// Raw mode name; semantic validation happens in the processor.
    pub mode: Option<String>,
    /// Already range-checked: out-of-range values are discarded at parse.
    pub temperature: Option<f64>,
}

/// Parse the content between `<<` and `>>` into a signal event.
///
/// Returns `None` for anything malformed; the caller re-emits the body as
/// literal text.
pub(crate) fn parse_signal_body(body: &str) -> Option<SignalEvent> {
    if let Some(id) = body.strip_prefix(CHECKPOINT_TAG) {
        if !is_valid_marker_id(id) {
            return None;
        }
        return Some(SignalEvent::Checkpoint(CheckpointSignal {
            id: id.to_string(),
        }));
    }

    if let Some(rest) = body.strip_prefix(BACKTRACK_TAG) {
        let mut parts = rest.split('|');
        let checkpoint_id = parts.next()?;
        let reason = parts.next()?;
        if !is_valid_marker_id(checkpoint_id) || reason.is_empty() {
            return None;
        }

        let (rephrase, mode, temperature) = parse_backtrack_extras(parts)?;
        return Some(SignalEvent::Backtrack(BacktrackSignal {
            checkpoint_id: checkpoint_id.to_string(),
            reason: reason.to_string(),
            rephrase,
            mode,
            temperature,
        }));
    }

    None
}

type BacktrackExtras = (Option<String>, Option<String>, Option<f64>);

/// Extract the optional fields after the reason. Unknown field prefixes,
/// empty values, and unparseable floats invalidate the whole marker.
/// Duplicate fields: the last one wins.
fn parse_backtrack_extras<'a>(parts: impl Iterator<Item = &'a str>) -> Option<BacktrackExtras> {
    let mut rephrase = None;
    let mut mode = None;
    let mut temperature = None;

    for part in parts {
        if let Some(value) = part.strip_prefix(REPHRASE_FIELD) {
            if value.is_empty() {
                return None;
            }
            rephrase = Some(value.to_string());
        } else if let Some(value) = part.strip_prefix(MODE_FIELD) {
            if value.is_empty() {
                return None;
            }
            mode = Some(value.to_string());
        } else if let Some(value) = part.strip_prefix(TEMP_FIELD) {
            temperature = Some(value.parse::<f64>().ok()?);
        } else {
            return None;
        }
    }

    // Syntactically valid but out-of-range temperatures are discarded; the
    // marker itself stays honoured.
    let temperature = temperature.filter(|value| (0.0..=1.0).contains(value));

    Some((rephrase, mode, temperature))
}

/// A marker identifier is a non-empty run of printable characters excluding
/// the reserved separators and whitespace.
fn is_valid_marker_id(id: &str) -> bool {
    !id.is_empty()
        && id.chars().all(|ch| {
            !ch.is_control() && !ch.is_whitespace() && !matches!(ch, '|' | '>' | '<' | ':')
        })
}
