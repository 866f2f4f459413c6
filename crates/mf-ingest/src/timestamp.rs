//! Timestamp normalization.
//!
//! Agents send timestamps in several shapes: canonical strings, strings with
//! blanks where digits belong, epoch milliseconds as numbers or numeric
//! strings, and the legacy `Timestamp` field name. [`normalize`] rewrites the
//! timestamp fields of a payload in place so that every stored record carries
//! `YYYY-MM-DDTHH:mm:ss.sss` strings.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{IngestError, Result};
use crate::types::{FieldValue, Payload};

/// `chrono` format string of the canonical timestamp form.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Primary timestamp field.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Field name used by older agents for the primary timestamp.
pub const LEGACY_TIMESTAMP_FIELD: &str = "Timestamp";

/// Time the gateway received the sample.
pub const SERVER_TIMESTAMP_FIELD: &str = "server_timestamp";

/// Capture time claimed by the agent.
pub const LOCAL_TIMESTAMP_FIELD: &str = "local_timestamp";

/// Formats an instant in canonical form.
#[must_use]
pub fn format_canonical(instant: DateTime<Utc>) -> String {
    instant.format(CANONICAL_FORMAT).to_string()
}

/// Returns the current time in canonical form.
#[must_use]
pub fn now_canonical() -> String {
    format_canonical(Utc::now())
}

/// Converts epoch milliseconds to canonical form.
///
/// Returns `None` when the value is outside the representable range.
#[must_use]
pub fn from_epoch_millis(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(format_canonical)
}

/// Parses a canonical timestamp.
///
/// # Errors
///
/// Returns [`IngestError::MalformedTimestamp`] if `value` is not exactly in
/// canonical form.
pub fn parse_canonical(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, CANONICAL_FORMAT).map_err(|_| {
        IngestError::MalformedTimestamp {
            value: value.to_string(),
        }
    })
}

/// Replaces every whitespace character with `0`.
///
/// Some devices emit blanks in place of leading zeros, for example
/// `2016-08-24T10:24:07.  6`.
#[must_use]
pub fn repair_whitespace(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_whitespace() { '0' } else { c })
        .collect()
}

fn numeric_epoch_millis(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Integer(ms) => Some(*ms),
        FieldValue::Float(ms) if ms.is_finite() => Some(*ms as i64),
        _ => None,
    }
}

fn epoch_millis(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Text(s) => {
            let digits = s.strip_prefix('-').unwrap_or(s);
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                s.parse().ok()
            } else {
                None
            }
        }
        other => numeric_epoch_millis(other),
    }
}

/// Normalizes the timestamp fields of `fields` in place.
///
/// - `Timestamp` is renamed to `@timestamp`.
/// - `@timestamp`: JSON numbers are read as epoch milliseconds, strings
///   have whitespace repaired (an all-digit string is not an epoch here),
///   an absent value stays absent.
/// - `server_timestamp` is always set to `now`.
/// - `local_timestamp` defaults to `server_timestamp`; epoch milliseconds,
///   as a number or an all-digit string, are converted, anything else is
///   kept as sent.
///
/// Returns a diagnosis when `@timestamp` is present but still not canonical
/// after repair. The value is stored regardless.
pub fn normalize(fields: &mut Payload, now: DateTime<Utc>) -> Option<IngestError> {
    if let Some(legacy) = fields.remove(LEGACY_TIMESTAMP_FIELD) {
        fields.insert(TIMESTAMP_FIELD.to_string(), legacy);
    }

    let issue = fields
        .get_mut(TIMESTAMP_FIELD)
        .and_then(normalize_primary);

    let server = format_canonical(now);
    let local = match fields.remove(LOCAL_TIMESTAMP_FIELD) {
        None => FieldValue::Text(server.clone()),
        Some(value) => epoch_millis(&value)
            .and_then(from_epoch_millis)
            .map_or(value, FieldValue::Text),
    };
    fields.insert(LOCAL_TIMESTAMP_FIELD.to_string(), local);
    fields.insert(SERVER_TIMESTAMP_FIELD.to_string(), FieldValue::Text(server));

    issue
}

fn normalize_primary(value: &mut FieldValue) -> Option<IngestError> {
    if let Some(canonical) = numeric_epoch_millis(value).and_then(from_epoch_millis) {
        *value = FieldValue::Text(canonical);
        return None;
    }

    match value {
        FieldValue::Text(s) => {
            let repaired = repair_whitespace(s);
            let issue = parse_canonical(&repaired).err();
            *s = repaired;
            issue
        }
        other => Some(IngestError::MalformedTimestamp {
            value: format!("{other:?}"),
        }),
    }
}
