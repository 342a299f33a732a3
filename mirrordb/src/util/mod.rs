pub mod value;

use crate::Record;
use serde_json::{Map, Value};

const LOWER_ALNUM: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h',
    'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

const HEX: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

pub fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A collision-resistant id shaped like a cuid: `c` followed by 24 lower-case alphanumerics
pub fn cuid() -> String {
    format!("c{}", nanoid::nanoid!(24, &LOWER_ALNUM))
}

pub fn ulid() -> String {
    ulid::Ulid::new().to_string()
}

pub fn nanoid(size: Option<usize>) -> String {
    let size = size.unwrap_or(21);
    nanoid::nanoid!(size)
}

/// 24 hex characters, the first 8 encoding the creation second like a document-store ObjectId
pub fn object_id() -> String {
    let seconds = chrono::Utc::now().timestamp() as u32;
    format!("{seconds:08x}{}", nanoid::nanoid!(16, &HEX))
}

/// True if every key of `subset` holds an equal value in `item`
pub fn shallow_compare(item: &Record, subset: &Map<String, Value>) -> bool {
    subset.iter().all(|(key, expected)| match item.get(key) {
        Some(actual) => value::equals(actual, expected, None, false),
        None => expected.is_null(),
    })
}

/// Normalize "one object or an array of objects" into a list
pub fn as_objects(value: &Value) -> Vec<&Map<String, Value>> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(map) => vec![map],
        _ => Vec::new(),
    }
}

/// Normalize "one string or an array of strings" into a list
pub fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Combine an optional caller filter with a scoping filter
pub fn and_filter(filter: Option<&Map<String, Value>>, scope: Map<String, Value>) -> Map<String, Value> {
    match filter {
        Some(f) if !f.is_empty() => {
            let mut combined = Map::new();
            combined.insert(
                "AND".into(),
                Value::Array(vec![Value::Object(f.clone()), Value::Object(scope)]),
            );
            combined
        }
        _ => scope,
    }
}

/// True if the object is explicitly enabled in a select/include-style map
pub fn is_enabled(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_generated_id_shapes() {
        assert_eq!(uuid().len(), 36);
        let c = cuid();
        assert!(c.starts_with('c'));
        assert_eq!(c.len(), 25);
        assert_eq!(ulid().len(), 26);
        assert_eq!(nanoid(Some(10)).len(), 10);
        let oid = object_id();
        assert_eq!(oid.len(), 24);
        assert!(oid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_shallow_compare() {
        let item = record(json!({ "a": 1, "b": "x", "c": null }));
        assert!(shallow_compare(&item, &record(json!({ "a": 1.0, "b": "x" }))));
        assert!(shallow_compare(&item, &record(json!({ "c": null, "d": null }))));
        assert!(!shallow_compare(&item, &record(json!({ "b": "y" }))));
    }

    #[test]
    fn test_and_filter() {
        let scope = record(json!({ "authorId": 1 }));
        assert_eq!(and_filter(None, scope.clone()), scope);
        let combined = and_filter(Some(&record(json!({ "published": true }))), scope);
        assert_eq!(
            Value::Object(combined),
            json!({ "AND": [{ "published": true }, { "authorId": 1 }] })
        );
    }
}
