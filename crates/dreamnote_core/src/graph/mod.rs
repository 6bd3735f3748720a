//! Thought graph: nodes, automatic bonds, manual links and merging.
//!
//! # Responsibility
//! - Project thoughts into positioned graph nodes.
//! - Derive automatic bonds purely from the current node set.
//! - Keep manual links consistent with the node set.
//! - Synthesize merged thoughts and plan the link rewiring.
//!
//! # Invariants
//! - Automatic bonds are never persisted.
//! - No link in a graph references a node outside that graph.

pub mod bonds;
pub mod merge;
pub mod thought_graph;

use crate::model::thought::ThoughtId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// A link or merge referenced a thought that cannot take part in it.
///
/// Non-fatal: callers treat the requested operation as a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphConsistencyError {
    UnknownThought(ThoughtId),
    SelfLink(ThoughtId),
    SelfMerge(ThoughtId),
}

impl Display for GraphConsistencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownThought(id) => write!(f, "thought not found in graph: {id}"),
            Self::SelfLink(id) => write!(f, "cannot link thought to itself: {id}"),
            Self::SelfMerge(id) => write!(f, "cannot merge thought with itself: {id}"),
        }
    }
}

impl Error for GraphConsistencyError {}
