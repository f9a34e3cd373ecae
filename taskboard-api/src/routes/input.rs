/// Request body field parsing shared by the resource handlers

use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use taskboard_shared::models::task::UNASSIGNED_NAME;
use uuid::Uuid;

/// Parses a path id, naming the resource in the error
pub fn parse_id(raw: &str, resource: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("Invalid {} ID format", resource)))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Accepts an RFC 3339 timestamp, a date-time or date without offset (UTC),
/// or milliseconds since the epoch
pub fn deadline<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("deadline is not a valid date: {}", raw))),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(Some)
            .ok_or_else(|| D::Error::custom("deadline is out of range")),
        Some(other) => Err(D::Error::custom(format!(
            "deadline must be a date string or a number, got {}",
            other
        ))),
    }
}

/// Distinguishes an absent `assignedUser` (outer `None`) from an explicit
/// clear (`Some(None)`, sent as `null`, `""` or `"unassigned"`)
pub fn assignee<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Some(None)),
        Value::String(raw) if raw.trim().is_empty() || raw.trim() == UNASSIGNED_NAME => {
            Ok(Some(None))
        }
        Value::String(raw) => Uuid::parse_str(raw.trim())
            .map(|id| Some(Some(id)))
            .map_err(|_| D::Error::custom(format!("assignedUser is not a valid id: {}", raw))),
        other => Err(D::Error::custom(format!(
            "assignedUser must be a string id or null, got {}",
            other
        ))),
    }
}

/// Accepts a boolean or the strings `"true"` / `"false"`
pub fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(value)),
        Some(Value::String(raw)) => match raw.trim() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(D::Error::custom(format!("expected a boolean, got {:?}", raw))),
        },
        Some(other) => Err(D::Error::custom(format!("expected a boolean, got {}", other))),
    }
}
