//! System prompt template with dynamic backtrack hint injection.
//!
//! Built freshly on every attempt so the model observes its current mode,
//! effective temperature, and the hints accumulated from earlier rewinds in
//! the same turn.

use crate::config::Settings;
use crate::signal::CognitiveMode;

const PROTOCOL_HEADER: &str = "\
You write in drafts. Treat your first formulation of any idea as provisional: \
you can rewind mid-generation to an earlier point and continue down a better \
path, and you are expected to use that ability rather than settle for the \
first competent framing.

## Protocol

Before each decision point where the response could take meaningfully \
different directions, place a checkpoint:
    <<checkpoint:ID>>
ID is a short label such as opening, framing, claim, structure, or tone.

When you recognize a better path after generating past a checkpoint, rewind \
to it:
    <<backtrack:ID|reason>>
Optional fields may follow the reason in any order:
    <<backtrack:ID|reason|mode:exploratory>>
    <<backtrack:ID|reason|rephrase:reinterpretation of the question>>
    <<backtrack:ID|reason|temp:0.8>>
";

/// Bound length and strip control characters so a hint is inert context.
#[must_use]
pub fn sanitize_hint(hint: &str, max_length: usize) -> String {
    hint.chars()
        .filter(|ch| !ch.is_control())
        .take(max_length)
        .collect()
}

/// Build the system prompt for one attempt.
#[must_use]
pub fn build_system_prompt(
    hints: &[String],
    mode: CognitiveMode,
    temperature: f64,
    settings: &Settings,
) -> String {
    let mut prompt = String::from(PROTOCOL_HEADER);

    prompt.push_str(&format!(
        "\nAvailable modes: {}\nTemperature: {} ({})\n",
        render_mode_table(settings),
        temperature,
        mode.as_str(),
    ));

    prompt.push_str(&format!(
        "\n## Rules\n\
         1. Checkpoints go before the decision, not after.\n\
         2. At most {} backtracks per response.\n\
         3. Leave at least {} characters between markers.\n\
         4. Never reference a checkpoint ID you have not placed.\n\
         5. Markers stand alone, never inside code blocks or quotes.\n",
        settings.max_rewinds, settings.min_marker_spacing,
    ));

    prompt.push_str(
        "\n## What the reader sees\n\
         - Checkpoints are invisible; the system strips them completely.\n\
         - On backtrack, text after the checkpoint is erased and the new path streams in.\n\
         - Your backtrack reasons come back to you as constraints on the retry.\n",
    );

    if !hints.is_empty() {
        prompt.push_str("\n## Constraints for This Attempt\n");
        for (index, hint) in hints.iter().enumerate() {
            prompt.push_str(&format!(
                "- Backtrack {}: {}\n",
                index + 1,
                sanitize_hint(hint, settings.max_hint_length)
            ));
        }
    }

    prompt
}

fn render_mode_table(settings: &Settings) -> String {
    CognitiveMode::ALL
        .iter()
        .map(|mode| format!("{} ({})", mode.as_str(), settings.temperature_for(*mode)))
        .collect::<Vec<_>>()
        .join(", ")
}
