//! Capture hand-off: turns streamed speech fragments into a thought.

pub mod transcript;

pub use transcript::TranscriptSession;
