//! Lenient readers for loosely typed wire JSON.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::clock::Timestamp;

pub type Object = Map<String, Value>;

/// The value as a JSON object, if it is one.
pub fn as_object(value: &Value) -> Option<&Object> {
    value.as_object()
}

/// Trimmed non-empty string.
pub fn read_text(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Integer from an integer, an integral float, or an integer string.
pub fn read_integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                return Some(int);
            }
            let float = number.as_f64()?;
            if float.is_finite() && float.fract() == 0.0 && float.abs() <= i64::MAX as f64 {
                Some(float as i64)
            } else {
                None
            }
        }
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Epoch millis from an integer form or an RFC 3339 string.
///
/// Pre-epoch instants are rejected.
pub fn read_timestamp(value: Option<&Value>) -> Option<Timestamp> {
    let value = value?;
    if let Value::String(text) = value {
        if let Ok(instant) = DateTime::parse_from_rfc3339(text.trim()) {
            return Timestamp::try_from(instant.timestamp_millis()).ok();
        }
    }
    read_integer(Some(value)).and_then(|millis| Timestamp::try_from(millis).ok())
}

/// Finite float from a number or numeric string.
pub fn read_float(value: Option<&Value>) -> Option<f64> {
    let float = match value? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    float.is_finite().then_some(float)
}

/// `[x, z]` pair of finite floats.
pub fn read_pair(value: Option<&Value>) -> Option<[f64; 2]> {
    let items = value?.as_array()?;
    if items.len() != 2 {
        return None;
    }
    Some([read_float(items.first())?, read_float(items.get(1))?])
}

/// First present key among `keys`.
pub fn first_of<'a>(object: &'a Object, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key).filter(|value| !value.is_null()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_integer_accepts_loose_forms() {
        assert_eq!(read_integer(Some(&json!(4))), Some(4));
        assert_eq!(read_integer(Some(&json!(4.0))), Some(4));
        assert_eq!(read_integer(Some(&json!(" 12 "))), Some(12));
        assert_eq!(read_integer(Some(&json!(4.5))), None);
        assert_eq!(read_integer(Some(&json!("x"))), None);
        assert_eq!(read_integer(Some(&json!(null))), None);
        assert_eq!(read_integer(None), None);
    }

    #[test]
    fn test_read_timestamp_forms() {
        assert_eq!(read_timestamp(Some(&json!(1_704_067_200_000_i64))), Some(1_704_067_200_000));
        assert_eq!(read_timestamp(Some(&json!("1704067200000"))), Some(1_704_067_200_000));
        assert_eq!(read_timestamp(Some(&json!("2024-01-01T00:00:00Z"))), Some(1_704_067_200_000));
        assert_eq!(read_timestamp(Some(&json!("2024-01-01T02:00:00.250+02:00"))), Some(1_704_067_200_250));
        assert_eq!(read_timestamp(Some(&json!("1969-12-31T23:59:59Z"))), None);
        assert_eq!(read_timestamp(Some(&json!(-5))), None);
        assert_eq!(read_timestamp(Some(&json!("yesterday"))), None);
        assert_eq!(read_timestamp(None), None);
    }

    #[test]
    fn test_read_text_trims_and_rejects_blank() {
        assert_eq!(read_text(Some(&json!("  a "))), Some("a".to_string()));
        assert_eq!(read_text(Some(&json!("   "))), None);
        assert_eq!(read_text(Some(&json!(3))), None);
    }

    #[test]
    fn test_read_pair() {
        assert_eq!(read_pair(Some(&json!([1, 2.5]))), Some([1.0, 2.5]));
        assert_eq!(read_pair(Some(&json!([1]))), None);
        assert_eq!(read_pair(Some(&json!(["a", 1]))), None);
    }

    #[test]
    fn test_first_of_skips_null() {
        let value = json!({ "details": null, "message": "boom" });
        let object = as_object(&value).unwrap();
        assert_eq!(first_of(object, &["details", "message"]), Some(&json!("boom")));
    }
}
