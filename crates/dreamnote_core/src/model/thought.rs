//! Thought domain model.
//!
//! # Responsibility
//! - Define the canonical captured-note record and its value types.
//! - Derive title, keywords, node size and cached color from content.
//! - Provide the pure `create_thought` constructor used by capture hand-off.
//!
//! # Invariants
//! - `id` is stable and never reused for another thought.
//! - `emotion_vector`, when present, is normalized (weights sum to 1).
//! - `color` always matches the effective emotion vector.
//! - `size` stays within `[MIN_NODE_SIZE, MAX_MERGED_NODE_SIZE]`.

use crate::emotion::{self, EmotionKey, EmotionVector, Rgb};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Characters kept from the text when deriving a title.
pub const TITLE_PREFIX_CHARS: usize = 50;
/// Maximum keywords derived from text.
pub const MAX_KEYWORDS: usize = 3;
/// Keywords must be longer than this many characters.
pub const KEYWORD_MIN_EXCLUSIVE_CHARS: usize = 4;
/// Smallest node size (empty text).
pub const MIN_NODE_SIZE: f64 = 60.0;
/// Largest size derivable from text alone.
pub const MAX_TEXT_NODE_SIZE: f64 = 110.0;
/// Upper bound for sizes produced by repeated merges.
pub const MAX_MERGED_NODE_SIZE: f64 = 160.0;

/// Opaque, globally unique thought identifier.
///
/// Newly created thoughts get a UUIDv4 string; records imported from older
/// schemas keep whatever id they already carried.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThoughtId(String);

impl ThoughtId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ThoughtId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThoughtId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Fixed tag enumeration offered by the capture UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThoughtTag {
    Idea,
    Task,
    Reflection,
    Random,
}

impl ThoughtTag {
    pub const ALL: [ThoughtTag; 4] = [Self::Idea, Self::Task, Self::Reflection, Self::Random];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idea => "Idea",
            Self::Task => "Task",
            Self::Reflection => "Reflection",
            Self::Random => "Random",
        }
    }

    /// Parses a tag name case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(trimmed))
    }
}

/// Free 2D layout coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn midpoint(&self, other: &Position) -> Position {
        Position::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }

    /// Spiral slot for the `index`-th node without a stored position.
    pub fn spiral(index: usize) -> Position {
        let i = index as f64;
        let angle = i * 0.8;
        let radius = 80.0 + i * 25.0;
        Position::new(angle.cos() * radius, angle.sin() * radius)
    }
}

/// Canonical captured-note record.
///
/// Serialized in camelCase to stay compatible with the records already held
/// by remote stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thought {
    pub id: ThoughtId,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
    pub text: String,
    /// Derived from text unless edited by the user.
    pub title: String,
    #[serde(default)]
    pub tags: BTreeSet<ThoughtTag>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_vector: Option<EmotionVector>,
    /// Legacy single emotion, used only when `emotion_vector` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<EmotionKey>,
    /// `None` until the node is placed; graph layout assigns a spiral slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub size: f64,
    /// Cached blend of the effective emotion vector.
    pub color: Rgb,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Structural problems that make a thought unfit for persistence.
#[derive(Debug, Clone, PartialEq)]
pub enum ThoughtValidationError {
    EmptyId,
    InvalidSize(f64),
    InvalidEmotionWeight { key: EmotionKey, weight: f64 },
    InvalidPosition,
}

impl Display for ThoughtValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "thought id cannot be empty"),
            Self::InvalidSize(size) => {
                write!(f, "thought size must be finite and positive, got {size}")
            }
            Self::InvalidEmotionWeight { key, weight } => write!(
                f,
                "emotion weight for `{key}` must be finite and non-negative, got {weight}"
            ),
            Self::InvalidPosition => write!(f, "thought position must be finite"),
        }
    }
}

impl Error for ThoughtValidationError {}

impl Thought {
    /// Builds a thought with caller-provided identity and creation instant.
    ///
    /// Used by import/merge paths where identity is decided elsewhere.
    /// Title, keywords, size and color are derived from `text`.
    pub fn with_id(id: ThoughtId, timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let mut thought = Self {
            id,
            timestamp,
            title: derive_title(&text),
            text,
            tags: BTreeSet::new(),
            pinned: false,
            duration_seconds: 0,
            emotion_vector: None,
            emotion: None,
            position: None,
            size: MIN_NODE_SIZE,
            color: emotion::NEUTRAL_COLOR,
            keywords: Vec::new(),
        };
        thought.refresh_derived();
        thought
    }

    /// Recomputes size, keywords and color from current source fields.
    pub fn refresh_derived(&mut self) {
        self.size = derive_node_size(&self.text);
        self.keywords = derive_keywords(&self.text);
        self.refresh_color();
    }

    /// Recomputes only the cached color.
    pub fn refresh_color(&mut self) {
        self.color = emotion::color_of(Some(&self.effective_emotion_vector()));
    }

    /// Stored vector when usable, else one-hot of the legacy emotion.
    pub fn effective_emotion_vector(&self) -> EmotionVector {
        match self.emotion_vector.as_ref() {
            Some(vector) if !vector.is_empty() => vector.clone(),
            _ => EmotionVector::one_hot(self.emotion.unwrap_or(EmotionKey::Neutral)),
        }
    }

    /// Argmax of the effective vector.
    pub fn dominant_emotion(&self) -> EmotionKey {
        self.effective_emotion_vector()
            .dominant()
            .unwrap_or(EmotionKey::Neutral)
    }

    /// Replaces the vector, renormalizing it; a zero-weight vector clears it.
    pub fn set_emotion_vector(&mut self, vector: Option<EmotionVector>) {
        self.emotion_vector = vector
            .map(EmotionVector::normalized)
            .filter(|normalized| !normalized.is_empty());
        self.refresh_color();
    }

    /// Sets a user title; blank input restores the derived title.
    pub fn rename(&mut self, title: &str) {
        let trimmed = title.trim();
        self.title = if trimmed.is_empty() {
            derive_title(&self.text)
        } else {
            trimmed.to_string()
        };
    }

    /// Adds the tag when missing, removes it otherwise. Returns the new state.
    pub fn toggle_tag(&mut self, tag: ThoughtTag) -> bool {
        if self.tags.remove(&tag) {
            false
        } else {
            self.tags.insert(tag);
            true
        }
    }

    pub fn toggle_pin(&mut self) -> bool {
        self.pinned = !self.pinned;
        self.pinned
    }

    pub fn move_to(&mut self, position: Position) {
        self.position = Some(position);
    }

    /// Checks structural invariants before persistence.
    pub fn validate(&self) -> Result<(), ThoughtValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ThoughtValidationError::EmptyId);
        }
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(ThoughtValidationError::InvalidSize(self.size));
        }
        if let Some(vector) = self.emotion_vector.as_ref() {
            for (key, weight) in vector.iter() {
                if !weight.is_finite() || weight < 0.0 {
                    return Err(ThoughtValidationError::InvalidEmotionWeight { key, weight });
                }
            }
        }
        if let Some(position) = self.position {
            if !position.x.is_finite() || !position.y.is_finite() {
                return Err(ThoughtValidationError::InvalidPosition);
            }
        }
        Ok(())
    }
}

/// Builds a freshly captured thought. No I/O, no persistence.
///
/// # Contract
/// - Generates a new id and stamps the current instant (millisecond precision).
/// - `emotion`, when given, becomes a one-hot vector and the legacy emotion.
pub fn create_thought(
    text: &str,
    tags: impl IntoIterator<Item = ThoughtTag>,
    duration_seconds: u64,
    emotion: Option<EmotionKey>,
) -> Thought {
    let mut thought = Thought::with_id(ThoughtId::generate(), now_millis(), text);
    thought.tags = tags.into_iter().collect();
    thought.duration_seconds = duration_seconds;
    thought.emotion = emotion;
    thought.set_emotion_vector(emotion.map(EmotionVector::one_hot));
    thought
}

/// Canonical view order: newest timestamp first, exact ties by ascending id.
pub fn newest_first(a: &Thought, b: &Thought) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| a.id.cmp(&b.id))
}

/// Current instant truncated to milliseconds.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// First `TITLE_PREFIX_CHARS` characters of the trimmed text, `...` when cut.
pub fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    let mut title: String = trimmed.chars().take(TITLE_PREFIX_CHARS).collect();
    if trimmed.chars().count() > TITLE_PREFIX_CHARS {
        title.push_str("...");
    }
    title
}

/// Lowercased whitespace tokens longer than four characters, first three
/// distinct ones.
pub fn derive_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in text.to_lowercase().split_whitespace() {
        if token.chars().count() <= KEYWORD_MIN_EXCLUSIVE_CHARS {
            continue;
        }
        if keywords.iter().any(|existing| existing == token) {
            continue;
        }
        keywords.push(token.to_string());
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

/// `60 + min(len / 4, 50)` over the character count.
pub fn derive_node_size(text: &str) -> f64 {
    let bonus = (text.chars().count() / 4).min(50);
    (MIN_NODE_SIZE + bonus as f64).min(MAX_TEXT_NODE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::{
        create_thought, derive_keywords, derive_node_size, derive_title, Position, Thought,
        ThoughtId, ThoughtTag, ThoughtValidationError,
    };
    use crate::emotion::{EmotionKey, EmotionVector, NEUTRAL_COLOR};
    use chrono::{TimeZone, Utc};

    #[test]
    fn title_is_prefix_with_ellipsis_when_long() {
        assert_eq!(derive_title("  short  "), "short");
        let long = "a".repeat(60);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), 53);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn keywords_take_first_three_distinct_long_tokens() {
        let keywords = derive_keywords("Walking walking in the rain under heavy clouds tonight");
        assert_eq!(keywords, vec!["walking", "under", "heavy"]);
    }

    #[test]
    fn node_size_is_bounded() {
        assert_eq!(derive_node_size(""), 60.0);
        assert_eq!(derive_node_size(&"x".repeat(40)), 70.0);
        assert_eq!(derive_node_size(&"x".repeat(10_000)), 110.0);
    }

    #[test]
    fn create_thought_fills_defaults_and_derived_fields() {
        let thought = create_thought(
            "  remember the quiet morning  ",
            [ThoughtTag::Reflection],
            42,
            Some(EmotionKey::Peace),
        );
        assert_eq!(thought.text, "remember the quiet morning");
        assert_eq!(thought.title, "remember the quiet morning");
        assert!(thought.tags.contains(&ThoughtTag::Reflection));
        assert!(!thought.pinned);
        assert_eq!(thought.duration_seconds, 42);
        assert_eq!(thought.emotion, Some(EmotionKey::Peace));
        assert_eq!(thought.color, EmotionKey::Peace.base_color());
        assert_eq!(thought.keywords, vec!["remember", "quiet", "morning"]);
        assert!(thought.validate().is_ok());
    }

    #[test]
    fn create_thought_generates_distinct_ids() {
        let a = create_thought("one", [], 0, None);
        let b = create_thought("one", [], 0, None);
        assert_ne!(a.id, b.id);
        assert_eq!(a.color, NEUTRAL_COLOR);
    }

    #[test]
    fn set_emotion_vector_renormalizes_and_clears_zero_vectors() {
        let mut thought = create_thought("text", [], 0, None);
        thought.set_emotion_vector(Some(EmotionVector::from_weights([
            (EmotionKey::Joy, 2.0),
            (EmotionKey::Hope, 2.0),
        ])));
        let vector = thought.emotion_vector.clone().unwrap();
        assert!((vector.total() - 1.0).abs() < 1e-9);
        assert_eq!(thought.dominant_emotion(), EmotionKey::Joy);

        thought.set_emotion_vector(Some(EmotionVector::new()));
        assert!(thought.emotion_vector.is_none());
        assert_eq!(thought.color, NEUTRAL_COLOR);
    }

    #[test]
    fn legacy_emotion_is_used_when_vector_absent() {
        let mut thought = create_thought("text", [], 0, None);
        thought.emotion = Some(EmotionKey::Love);
        thought.refresh_color();
        assert_eq!(thought.dominant_emotion(), EmotionKey::Love);
        assert_eq!(thought.color, EmotionKey::Love.base_color());
    }

    #[test]
    fn update_helpers_mutate_in_place() {
        let mut thought = create_thought("a quick errand", [], 0, None);
        thought.rename("  Errand  ");
        assert_eq!(thought.title, "Errand");
        thought.rename("   ");
        assert_eq!(thought.title, "a quick errand");

        assert!(thought.toggle_tag(ThoughtTag::Task));
        assert!(!thought.toggle_tag(ThoughtTag::Task));
        assert!(thought.toggle_pin());
        thought.move_to(Position::new(3.0, 4.0));
        assert_eq!(thought.position, Some(Position::new(3.0, 4.0)));
    }

    #[test]
    fn validate_rejects_empty_id_and_bad_position() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut thought = Thought::with_id(ThoughtId::new(" "), timestamp, "x");
        assert_eq!(thought.validate(), Err(ThoughtValidationError::EmptyId));

        thought.id = ThoughtId::new("ok");
        thought.position = Some(Position::new(f64::NAN, 0.0));
        assert_eq!(thought.validate(), Err(ThoughtValidationError::InvalidPosition));
    }

    #[test]
    fn json_round_trip_preserves_record() {
        let mut thought = create_thought(
            "walk in the park",
            [ThoughtTag::Idea],
            7,
            Some(EmotionKey::Joy),
        );
        thought.move_to(Position::new(-12.5, 40.0));
        let json = serde_json::to_string(&thought).unwrap();
        assert!(json.contains("\"durationSeconds\":7"));
        let decoded: Thought = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, thought);
    }

    #[test]
    fn spiral_positions_move_outward() {
        let first = Position::spiral(0);
        let tenth = Position::spiral(10);
        assert_eq!(first, Position::new(80.0, 0.0));
        assert!(tenth.distance_to(&Position::default()) > first.distance_to(&Position::default()));
    }
}
