//! Remote document codec.
//!
//! Remote records are keyed by id, so the id lives outside the field map, and
//! the creation instant travels as an ISO-8601 string.

use super::remote_store::SyncError;
use crate::model::thought::{Thought, ThoughtId};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};

const TIMESTAMP_FIELD: &str = "timestamp";
const ID_FIELD: &str = "id";

/// Record as stored remotely: document id plus a JSON field map.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub fields: Map<String, Value>,
}

/// Formats an instant as ISO-8601 / RFC 3339 in UTC.
///
/// Sub-second digits are emitted only as far as needed, so formatting is
/// lossless for any `DateTime<Utc>`.
pub fn timestamp_to_iso(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses an ISO-8601 / RFC 3339 string with any offset into UTC.
pub fn timestamp_from_iso(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Converts a thought into its remote document form.
pub fn encode(thought: &Thought) -> Result<RemoteDocument, SyncError> {
    let value = serde_json::to_value(thought).map_err(|err| codec_error(thought.id.as_str(), err))?;
    let Value::Object(mut fields) = value else {
        return Err(SyncError::Codec {
            id: thought.id.to_string(),
            message: "thought did not serialize to an object".to_string(),
        });
    };
    fields.remove(ID_FIELD);
    fields.insert(
        TIMESTAMP_FIELD.to_string(),
        Value::String(timestamp_to_iso(&thought.timestamp)),
    );
    Ok(RemoteDocument {
        id: thought.id.to_string(),
        fields,
    })
}

/// Converts a remote document back into a thought.
///
/// Accepts the timestamp either as an ISO-8601 string or as epoch
/// milliseconds, which older clients wrote.
pub fn decode(document: &RemoteDocument) -> Result<Thought, SyncError> {
    let mut fields = document.fields.clone();
    let timestamp = match fields.get(TIMESTAMP_FIELD) {
        Some(Value::String(text)) => timestamp_from_iso(text),
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
    .ok_or_else(|| SyncError::Codec {
        id: document.id.clone(),
        message: "missing or invalid timestamp".to_string(),
    })?;

    let normalized =
        serde_json::to_value(timestamp).map_err(|err| codec_error(&document.id, err))?;
    fields.insert(TIMESTAMP_FIELD.to_string(), normalized);
    fields.insert(ID_FIELD.to_string(), Value::String(document.id.clone()));

    let thought: Thought = serde_json::from_value(Value::Object(fields))
        .map_err(|err| codec_error(&document.id, err))?;
    if thought.id != ThoughtId::new(document.id.as_str()) {
        return Err(SyncError::Codec {
            id: document.id.clone(),
            message: "document id mismatch".to_string(),
        });
    }
    Ok(thought)
}

fn codec_error(id: &str, err: serde_json::Error) -> SyncError {
    SyncError::Codec {
        id: id.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, timestamp_from_iso, timestamp_to_iso, RemoteDocument};
    use crate::emotion::EmotionKey;
    use crate::model::thought::{create_thought, ThoughtTag};
    use chrono::{TimeZone, Timelike, Utc};
    use serde_json::{json, Value};

    #[test]
    fn iso_round_trip_is_lossless() {
        let instant = Utc
            .with_ymd_and_hms(2024, 6, 30, 23, 59, 58)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        let text = timestamp_to_iso(&instant);
        assert_eq!(text, "2024-06-30T23:59:58.123456789Z");
        assert_eq!(timestamp_from_iso(&text), Some(instant));
    }

    #[test]
    fn iso_parse_normalizes_offsets() {
        let parsed = timestamp_from_iso("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn document_round_trip_preserves_thought() {
        let thought = create_thought(
            "rain on the window",
            [ThoughtTag::Random],
            3,
            Some(EmotionKey::Sadness),
        );
        let document = encode(&thought).unwrap();
        assert_eq!(document.id, thought.id.as_str());
        assert!(!document.fields.contains_key("id"));
        assert!(matches!(document.fields.get("timestamp"), Some(Value::String(_))));
        assert_eq!(decode(&document).unwrap(), thought);
    }

    #[test]
    fn decode_accepts_epoch_millis_timestamp() {
        let thought = create_thought("old client", [], 0, None);
        let mut document = encode(&thought).unwrap();
        document.fields.insert(
            "timestamp".to_string(),
            json!(thought.timestamp.timestamp_millis()),
        );
        assert_eq!(decode(&document).unwrap().timestamp, thought.timestamp);
    }

    #[test]
    fn decode_rejects_missing_timestamp() {
        let document = RemoteDocument {
            id: "x".to_string(),
            fields: serde_json::Map::new(),
        };
        assert!(decode(&document).is_err());
    }
}
