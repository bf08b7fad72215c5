pub mod engine;
pub mod prompt;

pub use engine::{render_transcript, DialogueEngine, DialogueSnapshot, DEFAULT_PACING};
pub use prompt::{build_turn_messages, coalesce, system_instruction, DialogueNames};
