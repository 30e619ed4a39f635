pub mod narrator;
pub mod voice;

pub use narrator::{perfect_alignment_message, NarrationOutcome, Narrator, SpokenTracker};
pub use voice::{ProcessVoice, Speak};
