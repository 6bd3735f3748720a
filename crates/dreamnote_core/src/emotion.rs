//! Emotion vectors and display color blending.
//!
//! # Responsibility
//! - Define the fixed emotion enumeration and its base colors.
//! - Blend weighted emotion vectors into one display color.
//! - Merge two vectors pairwise for thought synthesis.
//!
//! # Invariants
//! - Stored weights are finite and strictly positive.
//! - A normalized vector sums to 1 or is empty.
//! - `EmotionKey` declaration order is the fixed precedence order used to
//!   break argmax ties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Fixed emotion enumeration, declared in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionKey {
    Joy,
    Sadness,
    Anxiety,
    Hope,
    Love,
    Curiosity,
    Peace,
    Neutral,
}

impl EmotionKey {
    /// All keys in precedence order.
    pub const ALL: [EmotionKey; 8] = [
        Self::Joy,
        Self::Sadness,
        Self::Anxiety,
        Self::Hope,
        Self::Love,
        Self::Curiosity,
        Self::Peace,
        Self::Neutral,
    ];

    /// Base RGB color used for weighted blending.
    pub fn base_color(self) -> Rgb {
        match self {
            Self::Joy => Rgb::new(255, 204, 0),
            Self::Sadness => Rgb::new(80, 120, 255),
            Self::Anxiety => Rgb::new(255, 80, 80),
            Self::Hope => Rgb::new(80, 255, 120),
            Self::Love => Rgb::new(255, 80, 180),
            Self::Curiosity => Rgb::new(160, 120, 255),
            Self::Peace => Rgb::new(80, 200, 255),
            Self::Neutral => NEUTRAL_COLOR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Sadness => "sadness",
            Self::Anxiety => "anxiety",
            Self::Hope => "hope",
            Self::Love => "love",
            Self::Curiosity => "curiosity",
            Self::Peace => "peace",
            Self::Neutral => "neutral",
        }
    }

    /// Parses a case-insensitive emotion name.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized.as_str())
    }
}

impl Display for EmotionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 8-bit RGB display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Color for absent or zero-weight vectors.
pub const NEUTRAL_COLOR: Rgb = Rgb::new(180, 180, 180);

/// Weighted distribution over [`EmotionKey`].
///
/// Serialized as a plain `{ "joy": 0.7, "sadness": 0.3 }` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionVector(BTreeMap<EmotionKey, f64>);

impl EmotionVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure single-emotion vector.
    pub fn one_hot(key: EmotionKey) -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(key, 1.0);
        Self(weights)
    }

    /// Builds a vector from raw weights and renormalizes it.
    ///
    /// Repeated keys accumulate. Non-finite and non-positive weights are
    /// discarded.
    pub fn from_weights(weights: impl IntoIterator<Item = (EmotionKey, f64)>) -> Self {
        let mut raw = BTreeMap::new();
        for (key, weight) in weights {
            *raw.entry(key).or_insert(0.0) += weight;
        }
        Self(raw).normalized()
    }

    /// Returns the weight for `key`, `0.0` when absent.
    pub fn weight(&self, key: EmotionKey) -> f64 {
        self.0.get(&key).copied().unwrap_or(0.0)
    }

    /// Sum of all positive finite weights.
    pub fn total(&self) -> f64 {
        self.0
            .values()
            .copied()
            .filter(|weight| weight.is_finite() && *weight > 0.0)
            .sum()
    }

    /// Whether the vector carries no usable weight.
    pub fn is_empty(&self) -> bool {
        self.total() <= 0.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionKey, f64)> + '_ {
        self.0.iter().map(|(key, weight)| (*key, *weight))
    }

    /// Drops unusable weights and rescales the rest to sum to 1.
    ///
    /// A vector with zero usable weight normalizes to an empty vector.
    pub fn normalized(self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return Self::default();
        }
        Self(
            self.0
                .into_iter()
                .filter(|(_, weight)| weight.is_finite() && *weight > 0.0)
                .map(|(key, weight)| (key, weight / total))
                .collect(),
        )
    }

    /// Argmax key; ties resolve to the earlier key in precedence order.
    pub fn dominant(&self) -> Option<EmotionKey> {
        let mut best: Option<(EmotionKey, f64)> = None;
        for (key, weight) in self.iter() {
            if !weight.is_finite() || weight <= 0.0 {
                continue;
            }
            match best {
                Some((_, best_weight)) if weight <= best_weight => {}
                _ => best = Some((key, weight)),
            }
        }
        best.map(|(key, _)| key)
    }
}

/// Blends a vector into a display color.
///
/// Each base color is weighted by its emotion weight and divided by the total
/// weight; `None` or a zero-weight vector yields [`NEUTRAL_COLOR`].
pub fn color_of(vector: Option<&EmotionVector>) -> Rgb {
    let Some(vector) = vector else {
        return NEUTRAL_COLOR;
    };

    let (mut r, mut g, mut b, mut total) = (0.0_f64, 0.0_f64, 0.0_f64, 0.0_f64);
    for (key, weight) in vector.iter() {
        if !weight.is_finite() || weight <= 0.0 {
            continue;
        }
        let base = key.base_color();
        r += f64::from(base.r) * weight;
        g += f64::from(base.g) * weight;
        b += f64::from(base.b) * weight;
        total += weight;
    }

    if total <= 0.0 {
        return NEUTRAL_COLOR;
    }

    Rgb::new(channel(r / total), channel(g / total), channel(b / total))
}

/// Pairwise vector merge: average each key (absent = 0), then renormalize.
///
/// Falls back to a pure neutral vector when both inputs carry no weight.
pub fn merge(a: &EmotionVector, b: &EmotionVector) -> EmotionVector {
    let averaged = EmotionKey::ALL
        .into_iter()
        .map(|key| (key, (a.weight(key) + b.weight(key)) / 2.0));
    let merged = EmotionVector::from_weights(averaged);
    if merged.is_empty() {
        EmotionVector::one_hot(EmotionKey::Neutral)
    } else {
        merged
    }
}

fn channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
