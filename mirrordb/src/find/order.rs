//! `orderBy` handling: parsing sort keys and the stable multi-key sort.

use crate::find;
use crate::schema::Model;
use crate::store::Store;
use crate::util::{self, value};
use crate::Record;
use serde_json::Value;
use std::cmp::Ordering;

/// What a sort key reads from a record
#[derive(Debug, Clone, PartialEq)]
pub enum SortTarget {
    /// A scalar (or synthetic) field of the record itself
    Field(String),
    /// Number of related rows through a relation field
    RelationCount(String),
    /// A field of a to-one related record, or of a nested object such as `_sum`
    Nested { parent: String, field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub target: SortTarget,
    pub descending: bool,
    pub nulls_first: bool,
}

/// Direction from `"asc"`/`"desc"` or `{ sort, nulls }`
fn direction(spec: &Value) -> Option<(bool, bool)> {
    match spec {
        Value::String(dir) => Some((dir.eq_ignore_ascii_case("desc"), false)),
        Value::Object(map) => {
            let sort = map.get("sort")?.as_str()?;
            let nulls_first = map.get("nulls").and_then(Value::as_str) == Some("first");
            Some((sort.eq_ignore_ascii_case("desc"), nulls_first))
        }
        _ => None,
    }
}

/// Parse `orderBy` (one object or an array of objects) into sort keys, in priority order
pub fn sort_keys(order_by: &Value) -> Vec<SortKey> {
    let mut keys = Vec::new();
    for entry in util::as_objects(order_by) {
        for (key, spec) in entry {
            if let Some((descending, nulls_first)) = direction(spec) {
                keys.push(SortKey {
                    target: SortTarget::Field(key.clone()),
                    descending,
                    nulls_first,
                });
                continue;
            }
            let Value::Object(nested) = spec else {
                log::warn!("ignoring orderBy entry '{key}'");
                continue;
            };
            if let Some(count_dir) = nested.get("_count").filter(|_| nested.len() == 1) {
                if let Some((descending, nulls_first)) = direction(count_dir) {
                    keys.push(SortKey {
                        target: SortTarget::RelationCount(key.clone()),
                        descending,
                        nulls_first,
                    });
                    continue;
                }
            }
            for (field, dir) in nested {
                let Some((descending, nulls_first)) = direction(dir) else {
                    log::warn!("ignoring orderBy entry '{key}.{field}'");
                    continue;
                };
                keys.push(SortKey {
                    target: SortTarget::Nested {
                        parent: key.clone(),
                        field: field.clone(),
                    },
                    descending,
                    nulls_first,
                });
            }
        }
    }
    keys
}

/// The value a key sorts on, plus the declared type used to compare it
fn sort_value(store: &Store, model: &Model, item: &Record, key: &SortKey) -> (Value, Option<String>) {
    match &key.target {
        SortTarget::Field(name) => (
            item.get(name).cloned().unwrap_or(Value::Null),
            model.field(name).map(|f| f.field_type.clone()),
        ),
        SortTarget::RelationCount(name) => {
            let count = model
                .field(name)
                .filter(|f| f.is_relation())
                .map(|f| find::related_items(store, model, f, item).len())
                .unwrap_or(0);
            (Value::from(count), None)
        }
        SortTarget::Nested { parent, field } => {
            let relation = model.field(parent).filter(|f| f.is_relation());
            match relation {
                Some(relation) => {
                    let related = find::related_items(store, model, relation, item);
                    let field_type = store
                        .schema()
                        .model(&relation.field_type)
                        .and_then(|m| m.field(field))
                        .map(|f| f.field_type.clone());
                    let val = related
                        .first()
                        .and_then(|r| r.get(field))
                        .cloned()
                        .unwrap_or(Value::Null);
                    (val, field_type)
                }
                None => {
                    // Nested aggregate views (`_sum.warnings`) keep the field's type
                    let val = item
                        .get(parent)
                        .and_then(|p| p.get(field))
                        .cloned()
                        .unwrap_or(Value::Null);
                    let field_type = match parent.as_str() {
                        "_count" | "_avg" => None,
                        _ => model.field(field).map(|f| f.field_type.clone()),
                    };
                    (val, field_type)
                }
            }
        }
    }
}

/// Compare two sort values under one key. Nulls go last unless `nulls_first`,
/// whatever the direction.
pub fn compare_values(a: &Value, b: &Value, key: &SortKey, field_type: Option<&str>) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) if key.nulls_first => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, true) if key.nulls_first => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = value::compare(a, b, field_type).unwrap_or(Ordering::Equal);
            if key.descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

/// Stable lexicographic sort, first key primary. Ties keep insertion order.
pub fn sort_records(store: &Store, model: &Model, records: &mut Vec<Record>, order_by: &Value) {
    sort_by_view(store, model, records, order_by, record_view);
}

fn record_view(record: &Record) -> &Record {
    record
}

/// Sort arbitrary entries by the record each one exposes through `view`
pub fn sort_by_view<T>(
    store: &Store,
    model: &Model,
    entries: &mut Vec<T>,
    order_by: &Value,
    view: impl Fn(&T) -> &Record,
) {
    let keys = sort_keys(order_by);
    if keys.is_empty() {
        return;
    }

    let mut decorated: Vec<(Vec<(Value, Option<String>)>, T)> = entries
        .drain(..)
        .map(|entry| {
            let values = keys
                .iter()
                .map(|k| sort_value(store, model, view(&entry), k))
                .collect();
            (values, entry)
        })
        .collect();

    decorated.sort_by(|(a, _), (b, _)| {
        for (key, ((av, ty), (bv, _))) in keys.iter().zip(a.iter().zip(b.iter())) {
            let ord = compare_values(av, bv, key, ty.as_deref());
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    entries.extend(decorated.into_iter().map(|(_, entry)| entry));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::blog_store;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn records(values: Value) -> Vec<Record> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    #[test]
    fn test_parse_sort_keys() {
        let keys = sort_keys(&json!([
            { "name": "desc" },
            { "score": { "sort": "asc", "nulls": "first" } },
            { "posts": { "_count": "desc" } },
            { "author": { "name": "asc" } }
        ]));
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[0].target, SortTarget::Field("name".into()));
        assert!(keys[0].descending);
        assert!(keys[1].nulls_first);
        assert_eq!(keys[2].target, SortTarget::RelationCount("posts".into()));
        assert_eq!(
            keys[3].target,
            SortTarget::Nested { parent: "author".into(), field: "name".into() }
        );
    }

    #[test]
    fn test_multi_key_ordering() {
        let store = blog_store();
        let model = store.schema().model("User").unwrap();
        let mut items = records(json!([
            { "id": 1, "friends": 1, "warnings": 5 },
            { "id": 2, "friends": 2, "warnings": 9 },
            { "id": 3, "friends": 1, "warnings": 2 },
            { "id": 4, "friends": 2, "warnings": 1 },
        ]));
        sort_records(&store, model, &mut items, &json!([{ "friends": "desc" }, { "warnings": "asc" }]));
        assert_eq!(ids(&items), vec![4, 2, 3, 1]);
    }

    #[test]
    fn test_nulls_last_by_default_either_direction() {
        let store = blog_store();
        let model = store.schema().model("User").unwrap();
        let base = records(json!([
            { "id": 1, "score": null },
            { "id": 2, "score": 2.0 },
            { "id": 3, "score": 1.0 },
        ]));

        let mut asc = base.clone();
        sort_records(&store, model, &mut asc, &json!({ "score": "asc" }));
        assert_eq!(ids(&asc), vec![3, 2, 1]);

        let mut desc = base.clone();
        sort_records(&store, model, &mut desc, &json!({ "score": "desc" }));
        assert_eq!(ids(&desc), vec![2, 3, 1]);

        let mut first = base;
        sort_records(
            &store,
            model,
            &mut first,
            &json!({ "score": { "sort": "desc", "nulls": "first" } }),
        );
        assert_eq!(ids(&first), vec![1, 2, 3]);
    }

    #[test]
    fn test_strings_use_locale_order() {
        let store = blog_store();
        let model = store.schema().model("User").unwrap();
        let mut items = records(json!([
            { "id": 1, "name": "bob" },
            { "id": 2, "name": "Alice" },
            { "id": 3, "name": "alice" },
        ]));
        sort_records(&store, model, &mut items, &json!({ "name": "asc" }));
        assert_eq!(ids(&items), vec![3, 2, 1]);
    }

    #[test]
    fn test_dates_sort_by_instant() {
        let store = blog_store();
        let model = store.schema().model("User").unwrap();
        let mut items = records(json!([
            { "id": 1, "birthday": "2001-01-01T00:00:00.000Z" },
            { "id": 2, "birthday": "2000-12-31T23:00:00-02:00" },
        ]));
        sort_records(&store, model, &mut items, &json!({ "birthday": "asc" }));
        assert_eq!(ids(&items), vec![1, 2]);
    }
}
