//! Use-case services over stores, reconciler and graph.
//!
//! # Responsibility
//! - Expose the thought-level API consumed by UI and capture collaborators.
//! - Run the one-time legacy migration on sign-in.

pub mod migration_service;
pub mod thought_service;
