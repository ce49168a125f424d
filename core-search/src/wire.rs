//! Loose JSON decoding of provider replies.
//!
//! Providers outside this process publish replies as plain JSON objects.
//! Result items are duck-typed through [`MediaItem::from_value`] instead of
//! serde's tagged representation, so a bare `{"uri": ...}` object is
//! accepted as an entry.

use crate::error::Result;
use core_media::{MediaError, MediaItem};
use core_runtime::events::{LegacyResponse, QueryResponse};
use serde_json::{Map, Value};
use tracing::warn;

fn object<'a>(value: &'a Value, field: &'static str) -> std::result::Result<&'a Map<String, Value>, MediaError> {
    value.as_object().ok_or(MediaError::InvalidValue {
        field,
        message: "expected an object".to_string(),
    })
}

fn required_str(data: &Map<String, Value>, field: &'static str) -> std::result::Result<String, MediaError> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(MediaError::MissingField(field))
}

fn optional_str(data: &Map<String, Value>, field: &str) -> Option<String> {
    data.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Decode a reply to a `Query`.
///
/// Malformed result items are skipped with a warning; the reply itself is
/// only rejected when `skill_id` or `phrase` is missing.
pub fn parse_response(value: &Value) -> Result<QueryResponse> {
    let data = object(value, "response")?;
    let skill_id = required_str(data, "skill_id")?;
    let phrase = optional_str(data, "phrase").unwrap_or_default();

    let results = match data.get("results") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match MediaItem::from_value(item.clone()) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(skill_id = %skill_id, error = %e, "Dropping malformed result");
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(MediaError::InvalidValue {
                field: "results",
                message: "expected a list".to_string(),
            }
            .into())
        }
    };

    Ok(QueryResponse {
        search_id: optional_str(data, "search_id"),
        phrase,
        skill_id,
        searching: data.get("searching").and_then(Value::as_bool).unwrap_or(false),
        timeout: data.get("timeout").and_then(Value::as_f64),
        results,
    })
}

/// Decode a legacy reply, which carries a float `conf` and opaque
/// `callback_data`.
pub fn parse_legacy_response(value: &Value) -> Result<LegacyResponse> {
    let data = object(value, "response")?;

    Ok(LegacyResponse {
        search_id: optional_str(data, "search_id"),
        phrase: optional_str(data, "phrase").unwrap_or_default(),
        skill_id: required_str(data, "skill_id")?,
        searching: data.get("searching").and_then(Value::as_bool).unwrap_or(false),
        conf: data.get("conf").and_then(Value::as_f64).unwrap_or(0.0),
        callback_data: data.get("callback_data").cloned().unwrap_or(Value::Null),
    })
}
