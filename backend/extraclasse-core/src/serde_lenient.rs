// src/serde_lenient.rs
//! Deserialisers for the load boundary.
//!
//! Records come back from the spreadsheet backend (or from an old local
//! cache) in loosely-typed shapes: numbers stored as text, nested objects
//! stored as JSON inside a single cell, `null` where a string is expected.
//! These helpers normalise those shapes into the fixed record types of
//! `model` so nothing downstream has to care.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::{Deserialize, Serializer};
use serde_json::Value;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn value_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => match n.as_f64() {
            // Sheets hands integers back as 22.0
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Any scalar as text; `null` or a missing field becomes "".
pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(value_to_string(Value::deserialize(deserializer)?))
}

pub fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        other => Ok(Some(value_to_string(other))),
    }
}

/// Non-negative whole numbers given as numbers or numeric text.
pub fn opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let parsed = match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u32>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u32::MAX as f64)
                    .map(|f| f as u32)
            })
        }
        _ => None,
    };
    Ok(parsed)
}

pub fn year<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|y| i32::try_from(y).ok())
        .ok_or_else(|| D::Error::custom(format!("invalid report year: {}", value)))
}

/// `YYYY-MM-DD`, a full ISO timestamp (date part is kept) or empty.
pub fn date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    let text = match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => return Ok(None),
    };
    let text = text.trim();
    let day_part = text.get(..10).unwrap_or(text);
    Ok(NaiveDate::parse_from_str(day_part, DATE_FORMAT).ok())
}

pub fn serialize_date<S: Serializer>(
    date: &Option<NaiveDate>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match date {
        Some(d) => serializer.serialize_str(&d.format(DATE_FORMAT).to_string()),
        None => serializer.serialize_str(""),
    }
}

/// RFC 3339 text or epoch milliseconds; anything else falls back to the epoch.
pub fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let parsed = match Value::deserialize(deserializer)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };
    Ok(parsed.unwrap_or_default())
}

/// A nested object given inline or JSON-encoded inside a string cell.
pub fn embedded<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(v) => v,
            Err(e) => {
                warn!("Ignoring embedded value that is not JSON ({}): {}", e, s);
                return Ok(None);
            }
        },
        other => other,
    };
    match serde_json::from_value::<T>(value) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!(
                "Ignoring malformed embedded {}: {}",
                std::any::type_name::<T>(),
                e
            );
            Ok(None)
        }
    }
}

/// A list whose elements are decoded one by one (see [`decode_records`]).
/// Accepts a JSON array, a JSON-encoded array in a string, or `null`.
pub fn records<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        Value::String(s) => serde_json::from_str::<Vec<Value>>(&s).unwrap_or_else(|e| {
            warn!("Ignoring list cell that is not a JSON array: {}", e);
            Vec::new()
        }),
        other => {
            warn!("Expected a list, found {}", other);
            Vec::new()
        }
    };
    Ok(decode_records(items))
}

/// Undecodable elements are logged and dropped; one bad row never sinks
/// the whole collection.
pub fn decode_records<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    "Dropping malformed {} record: {}",
                    std::any::type_name::<T>(),
                    e
                );
                None
            }
        })
        .collect()
}

/// Exactly `N` text slots: shorter lists are padded with "", longer ones truncated.
pub fn slots<'de, D, const N: usize>(deserializer: D) -> Result<[String; N], D::Error>
where
    D: Deserializer<'de>,
{
    let mut values: Vec<String> = match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(value_to_string).collect(),
        Value::String(s) => serde_json::from_str::<Vec<Value>>(&s)
            .map(|items| items.into_iter().map(value_to_string).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    values.resize(N, String::new());
    Ok(std::array::from_fn(|i| std::mem::take(&mut values[i])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Row {
        #[serde(default, deserialize_with = "string")]
        id: String,
        #[serde(default, deserialize_with = "opt_u32")]
        count: Option<u32>,
        #[serde(default, deserialize_with = "date")]
        day: Option<NaiveDate>,
        #[serde(default, deserialize_with = "slots")]
        lines: [String; 3],
    }

    #[test]
    fn numbers_stored_as_text_are_accepted() {
        let row: Row = serde_json::from_value(json!({ "id": 17, "count": "22" })).unwrap();
        assert_eq!(row.id, "17");
        assert_eq!(row.count, Some(22));

        let row: Row = serde_json::from_value(json!({ "id": "a", "count": 20.0 })).unwrap();
        assert_eq!(row.count, Some(20));

        let row: Row = serde_json::from_value(json!({ "count": "abc" })).unwrap();
        assert_eq!(row.count, None);
        assert_eq!(row.id, "");
    }

    #[test]
    fn dates_keep_only_the_day_part() {
        let row: Row = serde_json::from_value(json!({ "day": "2025-03-03T03:00:00.000Z" })).unwrap();
        assert_eq!(row.day, NaiveDate::from_ymd_opt(2025, 3, 3));

        let row: Row = serde_json::from_value(json!({ "day": "" })).unwrap();
        assert_eq!(row.day, None);

        let row: Row = serde_json::from_value(json!({ "day": "03/03/2025" })).unwrap();
        assert_eq!(row.day, None);
    }

    #[test]
    fn slots_are_padded_and_truncated() {
        let row: Row = serde_json::from_value(json!({ "lines": ["A"] })).unwrap();
        assert_eq!(row.lines, ["A".to_string(), String::new(), String::new()]);

        let row: Row = serde_json::from_value(json!({ "lines": ["A", null, "C", "D"] })).unwrap();
        assert_eq!(row.lines, ["A".to_string(), String::new(), "C".to_string()]);

        let row: Row = serde_json::from_value(json!({})).unwrap();
        assert_eq!(row.lines, [String::new(), String::new(), String::new()]);
    }

    #[test]
    fn malformed_records_are_dropped_individually() {
        let rows: Vec<Row> = decode_records(vec![
            json!({ "id": "1" }),
            json!({ "id": "2", "lines": 5, "day": 7 }),
            json!("not an object"),
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, "2");
    }
}
