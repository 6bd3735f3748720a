//! Automatic bonds derived from node content and layout.
//!
//! Two nodes bond when they share at least one keyword, or when they share a
//! dominant emotion and sit closer than the configured bond distance.
//! Bonds are recomputed on every query and therefore follow drags, inserts
//! and deletes without bookkeeping.

use super::thought_graph::GraphNode;
use crate::config::GraphConfig;
use crate::model::thought::ThoughtId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondKind {
    SharedKeyword,
    SharedEmotion,
}

/// Derived, unpersisted edge between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Bond {
    pub a: ThoughtId,
    pub b: ThoughtId,
    pub kind: BondKind,
    pub shared_keywords: Vec<String>,
    pub distance: f64,
    /// `1 - distance / fade_distance`, floored at zero.
    pub strength: f64,
}

/// Bond between two nodes, if any. Shared keywords take precedence.
pub fn bond_between(a: &GraphNode, b: &GraphNode, config: &GraphConfig) -> Option<Bond> {
    let shared_keywords: Vec<String> = a
        .thought
        .keywords
        .iter()
        .filter(|keyword| b.thought.keywords.contains(keyword))
        .cloned()
        .collect();
    let distance = a.position.distance_to(&b.position);

    let kind = if !shared_keywords.is_empty() {
        BondKind::SharedKeyword
    } else if a.dominant == b.dominant && distance < config.bond_distance {
        BondKind::SharedEmotion
    } else {
        return None;
    };

    Some(Bond {
        a: a.id().clone(),
        b: b.id().clone(),
        kind,
        shared_keywords,
        distance,
        strength: (1.0 - distance / config.bond_fade_distance).max(0.0),
    })
}

/// Every automatic bond among `nodes`, each unordered pair at most once.
pub fn automatic_bonds(nodes: &[GraphNode], config: &GraphConfig) -> Vec<Bond> {
    let mut bonds = Vec::new();
    for (index, first) in nodes.iter().enumerate() {
        for second in &nodes[index + 1..] {
            if let Some(bond) = bond_between(first, second, config) {
                bonds.push(bond);
            }
        }
    }
    bonds
}
