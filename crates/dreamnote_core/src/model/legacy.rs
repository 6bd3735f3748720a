//! Versioned schema of deprecated on-device records and their upgrade.
//!
//! # Responsibility
//! - Describe the two legacy payload layouts explicitly.
//! - Transform legacy records into current `Thought`s with a pure function.
//!
//! # Invariants
//! - The transform performs no I/O and is deterministic for a given input and
//!   fallback instant, so a retried migration upserts the same ids.
//! - Fields missing in legacy data get current defaults: no tags, unpinned,
//!   zero duration, title derived from the text prefix.

use crate::model::thought::{derive_title, Thought, ThoughtId, ThoughtTag};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Namespace for ids synthesized from legacy positions.
const LEGACY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b9e_4d3a_4c8b_9e27_51a0_d4c3_b812);

/// V0: session-based layout; thoughts nested in recording sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySessionV0 {
    pub id: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub thoughts: Vec<LegacySessionThoughtV0>,
}

/// One thought nested in a V0 session. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySessionThoughtV0 {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time_offset_seconds: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// V1: flat thought list written before tags/pins/durations were required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyThoughtV1 {
    pub id: String,
    pub timestamp: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

/// A decoded legacy record tagged with its schema version.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyRecord {
    V0Session(LegacySessionV0),
    V1Thought(LegacyThoughtV1),
}

impl LegacyRecord {
    pub fn schema_version(&self) -> u32 {
        match self {
            Self::V0Session(_) => 0,
            Self::V1Thought(_) => 1,
        }
    }
}

/// Legacy data that cannot be expressed in the current schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyTransformError {
    MissingId { schema_version: u32 },
    InvalidTimestamp { record_id: String, value: String },
}

impl Display for LegacyTransformError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId { schema_version } => {
                write!(f, "legacy v{schema_version} record has an empty id")
            }
            Self::InvalidTimestamp { record_id, value } => {
                write!(f, "legacy record `{record_id}` has invalid timestamp `{value}`")
            }
        }
    }
}

impl Error for LegacyTransformError {}

/// Upgrades one legacy record into zero or more current thoughts.
///
/// `fallback_timestamp` is used only when neither the thought nor its session
/// carries a timestamp.
pub fn upgrade_legacy_record(
    record: &LegacyRecord,
    fallback_timestamp: DateTime<Utc>,
) -> Result<Vec<Thought>, LegacyTransformError> {
    match record {
        LegacyRecord::V0Session(session) => upgrade_session(session, fallback_timestamp),
        LegacyRecord::V1Thought(thought) => upgrade_flat(thought).map(|thought| vec![thought]),
    }
}

/// Upgrades a batch, failing on the first untransformable record.
pub fn upgrade_legacy_records(
    records: &[LegacyRecord],
    fallback_timestamp: DateTime<Utc>,
) -> Result<Vec<Thought>, LegacyTransformError> {
    let mut upgraded = Vec::new();
    for record in records {
        upgraded.extend(upgrade_legacy_record(record, fallback_timestamp)?);
    }
    Ok(upgraded)
}

fn upgrade_session(
    session: &LegacySessionV0,
    fallback_timestamp: DateTime<Utc>,
) -> Result<Vec<Thought>, LegacyTransformError> {
    if session.id.trim().is_empty() {
        return Err(LegacyTransformError::MissingId { schema_version: 0 });
    }
    let session_start = session
        .started_at
        .as_deref()
        .map(|value| parse_timestamp(&session.id, value))
        .transpose()?;

    session
        .thoughts
        .iter()
        .enumerate()
        .map(|(index, legacy)| {
            let id = match legacy.id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => ThoughtId::new(id),
                _ => synthesized_id(&session.id, index),
            };
            let timestamp = match legacy.timestamp.as_deref() {
                Some(value) => parse_timestamp(id.as_str(), value)?,
                None => session_start.unwrap_or(fallback_timestamp),
            };
            Ok(Thought::with_id(
                id,
                timestamp,
                legacy.text.clone().unwrap_or_default(),
            ))
        })
        .collect()
}

fn upgrade_flat(legacy: &LegacyThoughtV1) -> Result<Thought, LegacyTransformError> {
    if legacy.id.trim().is_empty() {
        return Err(LegacyTransformError::MissingId { schema_version: 1 });
    }
    let timestamp = parse_timestamp(&legacy.id, &legacy.timestamp)?;
    let mut thought = Thought::with_id(ThoughtId::new(legacy.id.trim()), timestamp, &legacy.text);

    thought.title = match legacy.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => derive_title(&thought.text),
    };
    thought.tags = legacy
        .tags
        .iter()
        .flatten()
        .filter_map(|tag| ThoughtTag::parse(tag))
        .collect();
    thought.pinned = legacy.pinned.unwrap_or(false);
    thought.duration_seconds = legacy
        .duration_seconds
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .map_or(0, |seconds| seconds.floor() as u64);
    Ok(thought)
}

fn synthesized_id(session_id: &str, index: usize) -> ThoughtId {
    let name = format!("{session_id}/{index}");
    ThoughtId::new(Uuid::new_v5(&LEGACY_ID_NAMESPACE, name.as_bytes()).to_string())
}

fn parse_timestamp(record_id: &str, value: &str) -> Result<DateTime<Utc>, LegacyTransformError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| LegacyTransformError::InvalidTimestamp {
            record_id: record_id.to_string(),
            value: value.to_string(),
        })
}
