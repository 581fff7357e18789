//! Cognitive backtracking orchestrator for streaming text generation.
//!
//! An upstream model emits a token stream that may contain inline control
//! markers. The [`SignalParser`] separates plain text from `<<checkpoint:…>>`
//! and `<<backtrack:…>>` markers while the stream is still being produced;
//! the [`StreamProcessor`] strips markers from user-visible output and, on a
//! rewind, cancels the active generation, truncates the accumulated response
//! back to the named checkpoint, and restarts generation with an accumulated
//! hint describing why the previous path was abandoned.
//!
//! Providers plug in through the `inference_provider` contract; the
//! surrounding application observes progress through [`RunCallbacks`].

pub mod checkpoint;
pub mod config;
pub mod parser;
pub mod processor;
pub mod signal;
pub mod system_prompt;

pub use checkpoint::{CheckpointRecord, CheckpointStore};
pub use config::Settings;
pub use parser::SignalParser;
pub use processor::{RunCallbacks, StreamProcessor, CONTINUE_PROMPT};
pub use signal::{BacktrackSignal, CheckpointSignal, CognitiveMode, SignalEvent};
pub use system_prompt::{build_system_prompt, sanitize_hint};
