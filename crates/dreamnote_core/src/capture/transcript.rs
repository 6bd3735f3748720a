//! Session-scoped transcript accumulator.
//!
//! # Responsibility
//! - Accumulate final recognizer fragments, skipping repeated ones.
//! - Track the current interim fragment for live display.
//! - Keep a bounded rolling window for the live preview.
//! - Hand the finished text to `create_thought`.
//!
//! # Invariants
//! - All state lives in the session value; sessions never share state.
//! - Stored text is whitespace-normalized (single spaces, trimmed).
//! - The rolling window never holds `ROLLING_WINDOW_LIMIT` words or more.

use crate::emotion::EmotionKey;
use crate::model::thought::{create_thought, Thought, ThoughtTag};
use once_cell::sync::Lazy;
use regex::Regex;

/// Preview shows at most this many trailing words.
pub const PREVIEW_WORDS: usize = 20;
/// Once the rolling window reaches this many words it is cut back to
/// `PREVIEW_WORDS`.
pub const ROLLING_WINDOW_LIMIT: usize = 40;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Transcript state for one recording session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptSession {
    final_text: String,
    last_final: String,
    interim: String,
    window: String,
}

impl TranscriptSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a final fragment. Returns `false` for blank or repeated input.
    ///
    /// A fragment is a repeat when it equals the previous final fragment or
    /// the transcript already ends with it.
    pub fn add_final(&mut self, fragment: &str) -> bool {
        let fragment = normalize(fragment);
        if fragment.is_empty() {
            return false;
        }
        if fragment == self.last_final || self.final_text.ends_with(&fragment) {
            return false;
        }

        self.final_text = join(&self.final_text, &fragment);
        self.window = roll(&join(&self.window, &fragment));
        self.last_final = fragment;
        self.interim.clear();
        true
    }

    pub fn set_interim(&mut self, fragment: &str) {
        self.interim = normalize(fragment);
    }

    pub fn clear_interim(&mut self) {
        self.interim.clear();
    }

    /// Every final fragment plus the pending interim one.
    pub fn complete_text(&self) -> String {
        join(&self.final_text, &self.interim)
    }

    /// Final fragments only.
    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    /// Trailing words for live display: rolling window plus interim.
    pub fn live_preview(&self) -> String {
        last_words(&join(&self.window, &self.interim), PREVIEW_WORDS)
    }

    pub fn is_empty(&self) -> bool {
        self.final_text.is_empty() && self.interim.is_empty()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Ends the session and builds the thought, or `None` for empty input.
    pub fn finish(
        self,
        tags: impl IntoIterator<Item = ThoughtTag>,
        emotion: Option<EmotionKey>,
        duration_seconds: u64,
    ) -> Option<Thought> {
        let text = self.complete_text();
        if text.is_empty() {
            return None;
        }
        Some(create_thought(&text, tags, duration_seconds, emotion))
    }
}

fn normalize(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

fn join(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (false, true) => head.to_string(),
        (false, false) => format!("{head} {tail}"),
    }
}

fn roll(text: &str) -> String {
    if text.split_whitespace().count() >= ROLLING_WINDOW_LIMIT {
        last_words(text, PREVIEW_WORDS)
    } else {
        text.to_string()
    }
}

fn last_words(text: &str, count: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(count);
    words[start..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::{TranscriptSession, PREVIEW_WORDS};
    use crate::emotion::EmotionKey;
    use crate::model::thought::ThoughtTag;

    fn words(range: std::ops::Range<usize>) -> String {
        range.map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn final_fragments_accumulate_and_repeats_are_skipped() {
        let mut session = TranscriptSession::new();
        assert!(session.add_final("  hello   there "));
        assert!(!session.add_final("hello there"));
        assert!(session.add_final("general"));
        assert!(!session.add_final("general"));
        assert!(!session.add_final("   "));
        assert_eq!(session.final_text(), "hello there general");
    }

    #[test]
    fn interim_is_shown_until_cleared() {
        let mut session = TranscriptSession::new();
        session.add_final("one two");
        session.set_interim(" three ");
        assert_eq!(session.complete_text(), "one two three");
        assert_eq!(session.live_preview(), "one two three");
        session.clear_interim();
        assert_eq!(session.complete_text(), "one two");
    }

    #[test]
    fn rolling_window_bounds_preview_but_not_transcript() {
        let mut session = TranscriptSession::new();
        session.add_final(&words(0..39));
        assert_eq!(session.live_preview(), words(19..39));
        session.add_final("w39");

        assert_eq!(session.live_preview(), words(20..40));
        assert_eq!(session.final_text().split_whitespace().count(), 40);

        session.set_interim("tail");
        let preview = session.live_preview();
        assert_eq!(preview.split_whitespace().count(), PREVIEW_WORDS);
        assert!(preview.ends_with("w39 tail"));
    }

    #[test]
    fn finish_builds_thought_or_none() {
        assert!(TranscriptSession::new()
            .finish([ThoughtTag::Idea], None, 3)
            .is_none());

        let mut session = TranscriptSession::new();
        session.add_final("walking in the rain");
        session.set_interim("again");
        let thought = session
            .finish([ThoughtTag::Reflection], Some(EmotionKey::Peace), 42)
            .expect("thought");
        assert_eq!(thought.text, "walking in the rain again");
        assert_eq!(thought.duration_seconds, 42);
        assert_eq!(thought.emotion, Some(EmotionKey::Peace));
        assert!(thought.tags.contains(&ThoughtTag::Reflection));
    }

    #[test]
    fn sessions_do_not_share_state() {
        let mut first = TranscriptSession::new();
        let second = TranscriptSession::new();
        first.add_final("only here");
        assert!(second.is_empty());
    }
}
