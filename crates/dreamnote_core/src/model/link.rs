//! Manual link model.
//!
//! # Invariants
//! - A link is an unordered pair: `(a, b)` and `(b, a)` are the same link.
//! - Endpoints are stored in sorted order (`low < high`).
//! - Self-links are unrepresentable.

use crate::model::thought::ThoughtId;
use serde::{Deserialize, Serialize};

/// User-created edge between two thoughts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManualLink {
    low: ThoughtId,
    high: ThoughtId,
}

impl ManualLink {
    /// Builds the canonical form of the pair, `None` for a self-link.
    pub fn new(a: ThoughtId, b: ThoughtId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> &ThoughtId {
        &self.low
    }

    pub fn high(&self) -> &ThoughtId {
        &self.high
    }

    pub fn touches(&self, id: &ThoughtId) -> bool {
        &self.low == id || &self.high == id
    }

    /// Returns the endpoint opposite to `id`, `None` when `id` is not an endpoint.
    pub fn other(&self, id: &ThoughtId) -> Option<&ThoughtId> {
        if &self.low == id {
            Some(&self.high)
        } else if &self.high == id {
            Some(&self.low)
        } else {
            None
        }
    }
}
