//! Typed comparison and coercion over `serde_json::Value`.
//!
//! Records store DateTime columns as RFC 3339 strings and BigInt columns as numbers or
//! decimal strings, so comparisons take the declared field type into account.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde_json::{Number, Value};
use std::cmp::Ordering;

pub fn is_null(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

pub fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now() -> Value {
    Value::String(format_datetime(Utc::now()))
}

pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Epoch millis of a date-like value
pub fn to_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => parse_datetime(s).map(|dt| dt.timestamp_millis()),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

pub fn to_bigint(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// String ordering in the style of a locale collator: case-folded first,
/// lower case before upper case when the folded forms tie.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    let folded = a.to_lowercase().cmp(&b.to_lowercase());
    if folded != Ordering::Equal {
        return folded;
    }
    b.cmp(a)
}

/// Order two non-null values, coercing by the declared field type.
/// `None` when the values are not comparable.
pub fn compare(a: &Value, b: &Value, field_type: Option<&str>) -> Option<Ordering> {
    match field_type {
        Some("DateTime") => return Some(to_timestamp(a)?.cmp(&to_timestamp(b)?)),
        Some("BigInt") => return Some(to_bigint(a)?.cmp(&to_bigint(b)?)),
        _ => {}
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(locale_cmp(x, y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Equality between a stored value and an operand, coercing by the declared field type
pub fn equals(a: &Value, b: &Value, field_type: Option<&str>, insensitive: bool) -> bool {
    match field_type {
        Some("DateTime") => {
            return matches!((to_timestamp(a), to_timestamp(b)), (Some(x), Some(y)) if x == y)
        }
        Some("BigInt") => {
            return matches!((to_bigint(a), to_bigint(b)), (Some(x), Some(y)) if x == y)
        }
        _ => {}
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::String(x), Value::String(y)) if insensitive => {
            x.to_lowercase() == y.to_lowercase()
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dates_compare_by_instant() {
        let a = json!("2024-01-01T00:00:00.000Z");
        let b = json!("2024-01-01T02:00:00+02:00");
        assert!(equals(&a, &b, Some("DateTime"), false));
        assert_eq!(
            compare(&json!("2023-12-31"), &a, Some("DateTime")),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_non_date_never_equals_date() {
        assert!(!equals(&json!(true), &json!("2024-01-01"), Some("DateTime"), false));
    }

    #[test]
    fn test_bigint_coercion() {
        assert!(equals(&json!(9007199254740993i64), &json!("9007199254740993"), Some("BigInt"), false));
        assert_eq!(compare(&json!("10"), &json!(9), Some("BigInt")), Some(Ordering::Greater));
    }

    #[test]
    fn test_int_and_float_equal() {
        assert!(equals(&json!(1), &json!(1.0), None, false));
    }

    #[test]
    fn test_locale_cmp() {
        assert_eq!(locale_cmp("apple", "Banana"), Ordering::Less);
        assert_eq!(locale_cmp("a", "A"), Ordering::Less);
        assert_eq!(locale_cmp("b", "b"), Ordering::Equal);
    }

    #[test]
    fn test_mismatched_types_not_comparable() {
        assert_eq!(compare(&json!("1"), &json!(1), None), None);
    }
}
