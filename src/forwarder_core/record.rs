//! Lenient access to the handful of record fields the forwarder cares about.
//!
//! Records stay opaque byte buffers. Only `time`, `muid`, `id` and `linkback`
//! are looked at, and a field that is missing or has the wrong type simply
//! reads as `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Content fingerprint used as the dedup key
pub type Digest = [u8; 32];

pub fn digest(bytes: &[u8]) -> Digest {
    Sha256::digest(bytes).into()
}

/// Event time carried inside a record (epoch seconds, may be fractional)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordTime(pub f64);

impl RecordTime {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        RecordTime(dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9)
    }

    /// Convert to a wall-clock instant; `None` for values chrono can't represent.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if !self.0.is_finite() {
            return None;
        }
        let secs = self.0.floor();
        let nanos = ((self.0 - secs) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::from_timestamp(secs as i64, nanos)
    }
}

/// Typed view of the optional fields of a record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFields {
    pub time: Option<RecordTime>,
    pub muid: Option<String>,
    pub id: Option<String>,
    pub linkback: Option<String>,
}

impl RecordFields {
    /// Returns `None` when `bytes` is not a JSON object at all.
    pub fn peek(bytes: &[u8]) -> Option<Self> {
        let mut object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(bytes).ok()?;
        let mut take_string = |key: &str| match object.remove(key) {
            Some(serde_json::Value::String(s)) => Some(s),
            _ => None,
        };
        let muid = take_string("muid");
        let id = take_string("id");
        let linkback = take_string("linkback");
        Some(Self {
            time: object
                .get("time")
                .and_then(|v| v.as_f64())
                .filter(|t| t.is_finite())
                .map(RecordTime),
            muid,
            id,
            linkback,
        })
    }
}

pub fn is_valid_json(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(bytes).is_ok()
}

/// Appends `"key":value` to a serialized JSON object in place.
///
/// `value_json` must already be valid JSON. Returns false (and leaves `record`
/// untouched) when `record` does not end in `}`.
pub fn append_field(record: &mut Vec<u8>, key: &str, value_json: &str) -> bool {
    let end = match record.iter().rposition(|b| !b.is_ascii_whitespace()) {
        Some(pos) if record[pos] == b'}' => pos,
        _ => return false,
    };
    let body_end = record[..end]
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    let needs_comma = body_end > 0 && record[body_end - 1] != b'{';

    record.truncate(body_end);
    if needs_comma {
        record.push(b',');
    }
    record.push(b'"');
    record.extend_from_slice(key.as_bytes());
    record.extend_from_slice(b"\":");
    record.extend_from_slice(value_json.as_bytes());
    record.push(b'}');
    true
}

/// First `max` bytes of a record, for log messages.
pub fn snippet(bytes: &[u8], max: usize) -> String {
    if bytes.len() <= max {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        format!("{}...", String::from_utf8_lossy(&bytes[..max]))
    }
}
