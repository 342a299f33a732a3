//! `aggregate` and `groupBy`.
//!
//! Statistics are computed over non-null values only. `groupBy` evaluates `having`
//! through the record matcher by flattening `having.f._sum` into a synthetic `fSum` key.

use crate::args::{AggregateArgs, AggregateSelection, Filter, GroupByArgs};
use crate::error::{MirrorDbError, Result};
use crate::find::{self, order};
use crate::matcher;
use crate::schema::Model;
use crate::store::Store;
use crate::util::{self, value};
use crate::Record;
use serde_json::{Map, Value};
use std::cmp::Ordering;

const AGGREGATES: &[&str] = &["_count", "_avg", "_sum", "_min", "_max"];

/// Run `aggregate` over the records selected by the find arguments
pub fn aggregate(store: &Store, model: &Model, args: &AggregateArgs) -> Result<Record> {
    let rows = find::find_many(store, model, &args.find_args())?;
    Ok(compute(model, &rows, &args.selection))
}

/// One group: the `by` tuple and its member records
struct Group {
    key: Record,
    rows: Vec<Record>,
}

/// A surviving group on its way out: the view `orderBy` reads and the emitted record
struct GroupView {
    order: Record,
    output: Record,
}

pub fn group_by(store: &Store, model: &Model, args: &GroupByArgs) -> Result<Vec<Record>> {
    let by = util::string_list(&args.by);
    if by.is_empty() {
        return Err(MirrorDbError::Validation(
            "groupBy requires at least one `by` field".into(),
        ));
    }

    let rows = find::filter_items(store, model, store.items(&model.name), args.filter.as_ref());
    let groups = partition(rows, &by);

    let having = args.having.as_ref().map(|h| {
        let mut wanted = Vec::new();
        let flat = flatten_having(h, &mut wanted);
        (flat, wanted)
    });
    let order_wanted = args
        .order_by
        .as_ref()
        .map(order_aggregates)
        .unwrap_or_default();

    let mut views = Vec::new();
    for group in groups {
        if let Some((filter, wanted)) = &having {
            let mut having_value = group.key.clone();
            for (agg, field) in wanted {
                having_value.insert(synthetic_key(field, agg), aggregate_field(model, &group.rows, agg, field));
            }
            if !matcher::matches(store, model, &having_value, filter) {
                continue;
            }
        }

        let mut order_view = group.key.clone();
        for (agg, field) in &order_wanted {
            let slot = order_view
                .entry(agg.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(slot) = slot {
                slot.insert(field.clone(), aggregate_field(model, &group.rows, agg, field));
            }
        }

        let mut output = group.key;
        output.extend(compute(model, &group.rows, &args.selection));
        views.push(GroupView {
            order: order_view,
            output,
        });
    }

    if let Some(order_by) = &args.order_by {
        order::sort_by_view(store, model, &mut views, order_by, |v: &GroupView| &v.order);
    }

    let skip = args.skip.unwrap_or(0);
    let take = args.take.unwrap_or(usize::MAX);
    Ok(views
        .into_iter()
        .skip(skip)
        .take(take)
        .map(|v| v.output)
        .collect())
}

/// Stable grouping by the exact `by` tuple, in first-seen order
fn partition(rows: Vec<Record>, by: &[String]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for row in rows {
        let key: Record = by
            .iter()
            .map(|f| (f.clone(), row.get(f).cloned().unwrap_or(Value::Null)))
            .collect();
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.rows.push(row),
            None => groups.push(Group {
                key,
                rows: vec![row],
            }),
        }
    }
    groups
}

/// `warnings` + `_sum` -> `warningsSum`
fn synthetic_key(field: &str, agg: &str) -> String {
    let suffix = agg.trim_start_matches('_');
    let mut chars = suffix.chars();
    match chars.next() {
        Some(first) => format!("{field}{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => field.to_string(),
    }
}

/// Rewrite `{ f: { _sum: { gt: 5 } } }` into `{ fSum: { gt: 5 } }`, recursing through
/// `AND` / `OR` / `NOT`, and note every (aggregate, field) pair the filter reads.
fn flatten_having(having: &Filter, wanted: &mut Vec<(String, String)>) -> Filter {
    let mut flat = Map::new();
    for (key, condition) in having {
        if matches!(key.as_str(), "AND" | "OR" | "NOT") {
            let nested: Vec<Value> = util::as_objects(condition)
                .into_iter()
                .map(|f| Value::Object(flatten_having(f, wanted)))
                .collect();
            flat.insert(key.clone(), Value::Array(nested));
            continue;
        }

        let Value::Object(ops) = condition else {
            flat.insert(key.clone(), condition.clone());
            continue;
        };
        let mut plain = Map::new();
        for (op, operand) in ops {
            if AGGREGATES.contains(&op.as_str()) {
                let pair = (op.clone(), key.clone());
                if !wanted.contains(&pair) {
                    wanted.push(pair);
                }
                flat.insert(synthetic_key(key, op), operand.clone());
            } else {
                plain.insert(op.clone(), operand.clone());
            }
        }
        if !plain.is_empty() {
            flat.insert(key.clone(), Value::Object(plain));
        }
    }
    flat
}

/// Every (aggregate, field) pair an `orderBy` refers to, e.g. `{ _sum: { warnings: "asc" } }`
fn order_aggregates(order_by: &Value) -> Vec<(String, String)> {
    let mut wanted = Vec::new();
    for entry in util::as_objects(order_by) {
        for (key, spec) in entry {
            if !AGGREGATES.contains(&key.as_str()) {
                continue;
            }
            if let Value::Object(fields) = spec {
                for field in fields.keys() {
                    wanted.push((key.clone(), field.clone()));
                }
            }
        }
    }
    wanted
}

/// The statistics requested by `_count` / `_avg` / `_sum` / `_min` / `_max`
fn compute(model: &Model, rows: &[Record], selection: &AggregateSelection) -> Record {
    let mut out = Map::new();

    match &selection.count {
        Some(Value::Object(fields)) => {
            let counts = enabled_fields(fields)
                .map(|f| (f.to_string(), aggregate_field(model, rows, "_count", f)))
                .collect();
            out.insert("_count".into(), Value::Object(counts));
        }
        Some(flag) if util::is_enabled(flag) => {
            out.insert("_count".into(), Value::from(rows.len()));
        }
        _ => {}
    }

    for (agg, fields) in [
        ("_avg", &selection.avg),
        ("_sum", &selection.sum),
        ("_min", &selection.min),
        ("_max", &selection.max),
    ] {
        if let Some(fields) = fields {
            let stats = enabled_fields(fields)
                .map(|f| (f.to_string(), aggregate_field(model, rows, agg, f)))
                .collect();
            out.insert(agg.into(), Value::Object(stats));
        }
    }
    out
}

fn enabled_fields(fields: &Map<String, Value>) -> impl Iterator<Item = &str> {
    fields
        .iter()
        .filter(|(_, v)| util::is_enabled(v))
        .map(|(k, _)| k.as_str())
}

/// One statistic of one field over `rows`. `_count` of `_all` counts rows.
fn aggregate_field(model: &Model, rows: &[Record], agg: &str, field: &str) -> Value {
    if agg == "_count" && field == "_all" {
        return Value::from(rows.len());
    }

    let schema_field = model.field(field);
    let field_type = schema_field.map(|f| f.field_type.as_str());
    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|r| r.get(field))
        .filter(|v| !v.is_null())
        .collect();

    match agg {
        "_count" => Value::from(values.len()),
        _ if values.is_empty() => Value::Null,
        "_sum" if schema_field.is_some_and(|f| f.is_integer()) => {
            let total: i128 = values.iter().filter_map(|v| value::to_bigint(v)).sum();
            i64::try_from(total)
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(total.to_string()))
        }
        "_sum" => value::float_value(values.iter().filter_map(|v| value::to_f64(v)).sum()),
        "_avg" => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| value::to_f64(v)).collect();
            if numbers.is_empty() {
                return Value::Null;
            }
            value::float_value(numbers.iter().sum::<f64>() / numbers.len() as f64)
        }
        "_min" | "_max" => {
            let wanted = if agg == "_min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            values
                .into_iter()
                .reduce(|best, v| {
                    if value::compare(v, best, field_type) == Some(wanted) {
                        v
                    } else {
                        best
                    }
                })
                .cloned()
                .unwrap_or(Value::Null)
        }
        other => {
            log::warn!("unknown aggregate '{other}' on {}.{field}", model.name);
            Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::blog_store;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn seed(store: &Store) {
        let users = store.delegate("User").unwrap();
        for (email, friends, warnings, score) in [
            ("a@test.com", 0, 0, Some(1.0)),
            ("b@test.com", 0, 10, None),
            ("c@test.com", 1, 0, Some(4.0)),
            ("d@test.com", 2, 3, Some(2.0)),
        ] {
            users
                .create(json!({ "data": { "email": email, "friends": friends, "warnings": warnings, "score": score } }))
                .unwrap();
        }
    }

    fn objects(rows: Vec<Record>) -> Vec<Value> {
        rows.into_iter().map(Value::Object).collect()
    }

    #[test]
    fn test_synthetic_key() {
        assert_eq!(synthetic_key("warnings", "_sum"), "warningsSum");
        assert_eq!(synthetic_key("id", "_count"), "idCount");
    }

    #[test]
    fn test_aggregate_statistics() {
        let store = blog_store();
        seed(&store);
        let result = store
            .delegate("User")
            .unwrap()
            .aggregate(json!({
                "_count": { "_all": true, "score": true },
                "_avg": { "score": true },
                "_sum": { "warnings": true, "score": true },
                "_min": { "email": true },
                "_max": { "warnings": true }
            }))
            .unwrap();
        assert_eq!(
            Value::Object(result),
            json!({
                "_count": { "_all": 4, "score": 3 },
                "_avg": { "score": 7.0 / 3.0 },
                "_sum": { "warnings": 13, "score": 7.0 },
                "_min": { "email": "a@test.com" },
                "_max": { "warnings": 10 }
            })
        );
    }

    #[test]
    fn test_aggregate_respects_where_and_empty_sets() {
        let store = blog_store();
        seed(&store);
        let users = store.delegate("User").unwrap();
        let result = users
            .aggregate(json!({ "where": { "friends": 0 }, "_count": true, "_sum": { "warnings": true } }))
            .unwrap();
        assert_eq!(Value::Object(result), json!({ "_count": 2, "_sum": { "warnings": 10 } }));

        let empty = users
            .aggregate(json!({ "where": { "id": 99 }, "_avg": { "score": true }, "_sum": { "warnings": true } }))
            .unwrap();
        assert_eq!(Value::Object(empty), json!({ "_avg": { "score": null }, "_sum": { "warnings": null } }));
    }

    #[test]
    fn test_group_by_first_seen_order_and_aggregates() {
        let store = blog_store();
        seed(&store);
        let groups = store
            .delegate("User")
            .unwrap()
            .group_by(json!({ "by": ["friends"], "_sum": { "warnings": true } }))
            .unwrap();
        assert_eq!(
            objects(groups),
            vec![
                json!({ "friends": 0, "_sum": { "warnings": 10 } }),
                json!({ "friends": 1, "_sum": { "warnings": 0 } }),
                json!({ "friends": 2, "_sum": { "warnings": 3 } }),
            ]
        );
    }

    #[test]
    fn test_group_by_having_with_logic() {
        let store = blog_store();
        seed(&store);
        let groups = store
            .delegate("User")
            .unwrap()
            .group_by(json!({
                "by": "friends",
                "_count": { "_all": true },
                "having": { "OR": [
                    { "warnings": { "_sum": { "gt": 5 } } },
                    { "friends": { "gte": 2 } }
                ] }
            }))
            .unwrap();
        assert_eq!(
            objects(groups),
            vec![
                json!({ "friends": 0, "_count": { "_all": 2 } }),
                json!({ "friends": 2, "_count": { "_all": 1 } }),
            ]
        );
    }

    #[test]
    fn test_group_by_order_skip_take() {
        let store = blog_store();
        seed(&store);
        let users = store.delegate("User").unwrap();
        let groups = users
            .group_by(json!({
                "by": ["friends"],
                "_count": true,
                "orderBy": [{ "_sum": { "warnings": "desc" } }, { "friends": "asc" }]
            }))
            .unwrap();
        let keys: Vec<Value> = groups.iter().map(|g| g["friends"].clone()).collect();
        assert_eq!(keys, vec![json!(0), json!(2), json!(1)]);

        let page = users
            .group_by(json!({
                "by": ["friends"],
                "orderBy": { "_count": { "friends": "desc" } },
                "skip": 1,
                "take": 1
            }))
            .unwrap();
        assert_eq!(objects(page), vec![json!({ "friends": 1 })]);
    }

    #[test]
    fn test_group_by_requires_by() {
        let store = blog_store();
        let err = store
            .delegate("User")
            .unwrap()
            .group_by(json!({ "by": [] }))
            .unwrap_err();
        assert!(matches!(err, MirrorDbError::Validation(_)));
    }
}
