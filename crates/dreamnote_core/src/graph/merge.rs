//! Merge engine: synthesizes one thought from two and plans link rewiring.
//!
//! # Responsibility
//! - Build the merged thought from two inputs without touching storage.
//! - Describe which manual links disappear and which ones the merged node
//!   inherits, so persistence can apply both atomically.
//!
//! # Invariants
//! - The merged id differs from both input ids.
//! - The merged emotion vector is normalized.
//! - Every node linked to either input is linked to the merged node exactly
//!   once; links not touching the inputs are left alone.

use super::GraphConsistencyError;
use crate::emotion;
use crate::model::link::ManualLink;
use crate::model::thought::{
    now_millis, Position, Thought, ThoughtId, MAX_MERGED_NODE_SIZE, MIN_NODE_SIZE,
};
use std::collections::BTreeSet;

/// Placed between the two input texts.
pub const MERGED_TEXT_SEPARATOR: &str = " — ";
/// Combined size is scaled by this before capping.
pub const MERGED_SIZE_FACTOR: f64 = 0.6;

/// Everything needed to commit one merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub merged: Thought,
    /// The two input ids, in call order.
    pub retired: [ThoughtId; 2],
    pub links_removed: Vec<ManualLink>,
    pub links_added: Vec<ManualLink>,
}

impl MergePlan {
    pub fn merged_id(&self) -> &ThoughtId {
        &self.merged.id
    }

    /// Applies the rewiring to an in-memory link set.
    pub fn rewire<'a>(&self, links: impl IntoIterator<Item = &'a ManualLink>) -> Vec<ManualLink> {
        let rewired: BTreeSet<ManualLink> = links
            .into_iter()
            .filter(|link| !self.links_removed.contains(link))
            .cloned()
            .chain(self.links_added.iter().cloned())
            .collect();
        rewired.into_iter().collect()
    }
}

/// Synthesizes the merged thought from `a` and `b`.
///
/// Text and title keep `a` first. Tags and keywords are unions, durations
/// add up, pinned is sticky, and the emotion vectors are averaged.
pub fn merge_thoughts(a: &Thought, b: &Thought) -> Thought {
    let id = fresh_id(&a.id, &b.id);
    let text = format!("{}{MERGED_TEXT_SEPARATOR}{}", a.text, b.text);
    let mut merged = Thought::with_id(id, now_millis(), text);

    merged.title = merged_title(&a.title, &b.title);
    merged.tags = a.tags.union(&b.tags).copied().collect();
    merged.pinned = a.pinned || b.pinned;
    merged.duration_seconds = a.duration_seconds.saturating_add(b.duration_seconds);
    merged.position = merged_position(a.position, b.position);
    merged.size = merged_size(a.size, b.size);
    merged.keywords = merged_keywords(&a.keywords, &b.keywords);

    let vector = emotion::merge(&a.effective_emotion_vector(), &b.effective_emotion_vector());
    merged.emotion = vector.dominant();
    merged.set_emotion_vector(Some(vector));
    merged
}

/// Merges `a` and `b` and plans the link rewiring against `links`.
pub fn plan_merge(
    a: &Thought,
    b: &Thought,
    links: &[ManualLink],
) -> Result<MergePlan, GraphConsistencyError> {
    if a.id == b.id {
        return Err(GraphConsistencyError::SelfMerge(a.id.clone()));
    }

    let merged = merge_thoughts(a, b);
    let links_removed: Vec<ManualLink> = links
        .iter()
        .filter(|link| link.touches(&a.id) || link.touches(&b.id))
        .cloned()
        .collect();
    let inherited: BTreeSet<&ThoughtId> = links_removed
        .iter()
        .flat_map(|link| [link.low(), link.high()])
        .filter(|id| **id != a.id && **id != b.id)
        .collect();
    let links_added = inherited
        .into_iter()
        .filter_map(|other| ManualLink::new(merged.id.clone(), other.clone()))
        .collect();

    Ok(MergePlan {
        merged,
        retired: [a.id.clone(), b.id.clone()],
        links_removed,
        links_added,
    })
}

/// `"{lead of a} + {lead of b}"`, using each title's first word.
pub fn merged_title(a: &str, b: &str) -> String {
    format!("{} + {}", title_lead(a), title_lead(b))
}

fn title_lead(title: &str) -> &str {
    let lead = title
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches("...");
    if lead.is_empty() {
        "Untitled"
    } else {
        lead
    }
}

fn merged_size(a: f64, b: f64) -> f64 {
    ((a + b) * MERGED_SIZE_FACTOR).clamp(MIN_NODE_SIZE, MAX_MERGED_NODE_SIZE)
}

fn merged_position(a: Option<Position>, b: Option<Position>) -> Option<Position> {
    match (a, b) {
        (Some(first), Some(second)) => Some(first.midpoint(&second)),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

fn merged_keywords(a: &[String], b: &[String]) -> Vec<String> {
    let mut keywords = a.to_vec();
    for keyword in b {
        if !keywords.contains(keyword) {
            keywords.push(keyword.clone());
        }
    }
    keywords
}

fn fresh_id(a: &ThoughtId, b: &ThoughtId) -> ThoughtId {
    loop {
        let id = ThoughtId::generate();
        if &id != a && &id != b {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{merge_thoughts, merged_title, plan_merge};
    use crate::emotion::{EmotionKey, EmotionVector};
    use crate::graph::GraphConsistencyError;
    use crate::model::link::ManualLink;
    use crate::model::thought::{Position, Thought, ThoughtId, ThoughtTag};
    use chrono::Utc;

    fn thought(id: &str, text: &str, emotion: EmotionKey) -> Thought {
        let mut thought = Thought::with_id(ThoughtId::new(id), Utc::now(), text);
        thought.set_emotion_vector(Some(EmotionVector::one_hot(emotion)));
        thought
    }

    fn link(a: &str, b: &str) -> ManualLink {
        ManualLink::new(ThoughtId::new(a), ThoughtId::new(b)).expect("distinct ids")
    }

    #[test]
    fn merge_combines_content_and_averages_emotion() {
        let mut walk = thought("a", "walk", EmotionKey::Joy);
        walk.tags.insert(ThoughtTag::Idea);
        walk.duration_seconds = 10;
        walk.move_to(Position::new(0.0, 0.0));
        let mut rain = thought("b", "rain", EmotionKey::Sadness);
        rain.tags.insert(ThoughtTag::Reflection);
        rain.duration_seconds = 5;
        rain.pinned = true;
        rain.move_to(Position::new(40.0, 20.0));

        let merged = merge_thoughts(&walk, &rain);

        assert_ne!(merged.id, walk.id);
        assert_ne!(merged.id, rain.id);
        assert_eq!(merged.text, "walk — rain");
        assert_eq!(merged.title, "walk + rain");
        assert_eq!(merged.duration_seconds, 15);
        assert!(merged.pinned);
        assert_eq!(merged.position, Some(Position::new(20.0, 10.0)));
        assert!(merged.tags.contains(&ThoughtTag::Idea));
        assert!(merged.tags.contains(&ThoughtTag::Reflection));

        let vector = merged.emotion_vector.as_ref().expect("vector");
        assert!((vector.weight(EmotionKey::Joy) - 0.5).abs() < 1e-9);
        assert!((vector.weight(EmotionKey::Sadness) - 0.5).abs() < 1e-9);
        assert!((vector.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn merged_size_is_scaled_and_capped() {
        let small = merge_thoughts(
            &thought("a", "", EmotionKey::Joy),
            &thought("b", "", EmotionKey::Joy),
        );
        assert!((small.size - 72.0).abs() < 1e-9);

        let long = "x".repeat(1_000);
        let big = merge_thoughts(
            &thought("a", &long, EmotionKey::Joy),
            &thought("b", &long, EmotionKey::Joy),
        );
        assert!((big.size - 132.0).abs() < 1e-9);

        let mut huge_a = thought("a", "x", EmotionKey::Joy);
        huge_a.size = 160.0;
        let huge = merge_thoughts(&huge_a, &big);
        assert_eq!(huge.size, 160.0);
    }

    #[test]
    fn merged_title_uses_leading_words() {
        assert_eq!(merged_title("long walk home", "rain again"), "long + rain");
        assert_eq!(merged_title("", "rain"), "Untitled + rain");
    }

    #[test]
    fn plan_transfers_links_without_duplicates() {
        let a = thought("a", "first", EmotionKey::Hope);
        let b = thought("b", "second", EmotionKey::Hope);
        let links = vec![
            link("a", "c"),
            link("b", "c"),
            link("a", "b"),
            link("b", "d"),
            link("c", "d"),
        ];

        let plan = plan_merge(&a, &b, &links).expect("plan");
        let merged = plan.merged_id().clone();

        assert_eq!(plan.links_removed.len(), 4);
        assert_eq!(
            plan.links_added,
            vec![
                ManualLink::new(merged.clone(), ThoughtId::new("c")).expect("link"),
                ManualLink::new(merged.clone(), ThoughtId::new("d")).expect("link"),
            ]
        );

        let rewired = plan.rewire(links.iter());
        assert_eq!(rewired.len(), 3);
        assert!(rewired.contains(&link("c", "d")));
        assert!(rewired.iter().all(|link| !link.touches(&a.id) && !link.touches(&b.id)));
    }

    #[test]
    fn plan_rejects_self_merge() {
        let a = thought("a", "first", EmotionKey::Hope);
        assert_eq!(
            plan_merge(&a, &a, &[]),
            Err(GraphConsistencyError::SelfMerge(ThoughtId::new("a")))
        );
    }
}
