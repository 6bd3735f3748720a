//! Domain model for captured thoughts and their manual links.
//!
//! # Responsibility
//! - Define the canonical `Thought` record shared by both stores.
//! - Define persisted manual links as unordered id pairs.
//! - Describe the deprecated legacy schema and its upgrade.
//!
//! # Invariants
//! - Every thought is identified by a stable, never reused `ThoughtId`.
//! - Derived fields (size, color, keywords) are recomputed from source fields.

pub mod legacy;
pub mod link;
pub mod thought;
