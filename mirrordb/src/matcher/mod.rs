//! Decides whether one record satisfies a filter tree.
//!
//! A filter maps field names (or `AND` / `OR` / `NOT`) to a literal, which is an
//! equality shorthand, or to an operator object. Every top-level key must hold.

use crate::args::Filter;
use crate::find;
use crate::schema::{self, Field, Model};
use crate::store::Store;
use crate::util::{self, value};
use crate::Record;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cmp::Ordering;

const SCALAR_OPERATORS: &[&str] = &[
    "equals", "startsWith", "endsWith", "contains", "gt", "gte", "lt", "lte", "in", "not",
    "notIn", "mode",
];

const LIST_OPERATORS: &[&str] = &["equals", "has", "hasSome", "hasEvery", "isEmpty"];

const RELATION_OPERATORS: &[&str] = &["some", "every", "none", "is", "isNot"];

/// True if `item` (a record of `model`) satisfies every condition of `filter`
pub fn matches(store: &Store, model: &Model, item: &Record, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(key, condition)| match_key(store, model, item, key, condition))
}

fn match_key(store: &Store, model: &Model, item: &Record, key: &str, condition: &Value) -> bool {
    match key {
        "AND" => {
            return util::as_objects(condition)
                .into_iter()
                .all(|f| matches(store, model, item, f))
        }
        "OR" => {
            return util::as_objects(condition)
                .into_iter()
                .any(|f| matches(store, model, item, f))
        }
        "NOT" => {
            return !util::as_objects(condition)
                .into_iter()
                .any(|f| matches(store, model, item, f))
        }
        "is" => {
            if let Value::Object(inner) = condition {
                return matches(store, model, item, inner);
            }
        }
        _ => {}
    }

    if let Some(field) = model.field(key) {
        if field.is_relation() {
            return match_relation(store, model, item, field, condition);
        }
        if field.is_list {
            return match_list(item.get(key), condition, field);
        }
        return match_scalar(item.get(key), condition, Some(field));
    }

    // `{ postId_userId: { postId, userId } }`
    if model.compound_key(key).is_some() {
        return match condition {
            Value::Object(subset) => util::shallow_compare(item, subset),
            _ => false,
        };
    }

    match_scalar(item.get(key), condition, None)
}

// ── Scalars ─────────────────────────────────────────────────────────

fn is_operator_object(condition: &Map<String, Value>, operators: &[&str]) -> bool {
    !condition.is_empty() && condition.keys().all(|k| operators.contains(&k.as_str()))
}

/// Match one stored value against a literal or an operator object.
/// `field` supplies the declared type for DateTime/BigInt coercion.
pub fn match_scalar(stored: Option<&Value>, condition: &Value, field: Option<&Field>) -> bool {
    match condition {
        Value::Null => value::is_null(stored),
        Value::Object(ops) if ops.is_empty() => true,
        Value::Object(ops) if is_operator_object(ops, SCALAR_OPERATORS) => {
            match_operators(stored, ops, field)
        }
        literal => match stored {
            Some(v) if !v.is_null() => {
                value::equals(v, literal, field.map(|f| f.field_type.as_str()), false)
            }
            _ => false,
        },
    }
}

/// Lower-case strings when the filter asks for `mode: insensitive`
fn fold(v: &Value, insensitive: bool) -> Cow<'_, Value> {
    match v {
        Value::String(s) if insensitive => Cow::Owned(Value::String(s.to_lowercase())),
        _ => Cow::Borrowed(v),
    }
}

fn fold_list(v: &Value, insensitive: bool) -> Vec<Value> {
    match v {
        Value::Array(items) => items.iter().map(|i| fold(i, insensitive).into_owned()).collect(),
        other => vec![fold(other, insensitive).into_owned()],
    }
}

/// Operators run in a fixed order and stop at the first that fails.
/// A null stored value satisfies only `equals: null`, as in SQL comparisons.
fn match_operators(stored: Option<&Value>, ops: &Map<String, Value>, field: Option<&Field>) -> bool {
    let field_type = field.map(|f| f.field_type.as_str());
    let insensitive = ops.get("mode").and_then(Value::as_str) == Some("insensitive");
    let stored = stored.filter(|v| !v.is_null());
    let folded = stored.map(|v| fold(v, insensitive));
    let current = folded.as_deref();

    let text = || current.and_then(Value::as_str);
    let ordered = |operand: &Value, accept: fn(Ordering) -> bool| {
        let Some(v) = current else {
            return false;
        };
        if operand.is_null() {
            return false;
        }
        let operand = fold(operand, insensitive);
        value::compare(v, &operand, field_type).is_some_and(accept)
    };
    let member = |list: &Value| {
        let Some(v) = current else {
            return false;
        };
        fold_list(list, insensitive)
            .iter()
            .any(|candidate| value::equals(v, candidate, field_type, false))
    };

    for op in ["equals", "startsWith", "endsWith", "contains", "gt", "gte", "lt", "lte", "in", "not", "notIn"] {
        let Some(operand) = ops.get(op) else {
            continue;
        };
        let ok = match op {
            "equals" => match (current, operand) {
                (None, Value::Null) => true,
                (Some(v), operand) if !operand.is_null() => {
                    value::equals(v, &fold(operand, insensitive), field_type, false)
                }
                _ => false,
            },
            "startsWith" | "endsWith" | "contains" => {
                let needle = fold(operand, insensitive);
                match (text(), needle.as_str()) {
                    (Some(haystack), Some(needle)) => match op {
                        "startsWith" => haystack.starts_with(needle),
                        "endsWith" => haystack.ends_with(needle),
                        _ => haystack.contains(needle),
                    },
                    _ => false,
                }
            }
            "gt" => ordered(operand, |o| o == Ordering::Greater),
            "gte" => ordered(operand, |o| o != Ordering::Less),
            "lt" => ordered(operand, |o| o == Ordering::Less),
            "lte" => ordered(operand, |o| o != Ordering::Greater),
            "in" => member(operand),
            "notIn" => current.is_some() && !member(operand),
            "not" => match operand {
                Value::Null => current.is_some(),
                Value::Object(inner) if is_operator_object(inner, SCALAR_OPERATORS) => {
                    let mut inner = inner.clone();
                    if insensitive && !inner.contains_key("mode") {
                        inner.insert("mode".into(), Value::String("insensitive".into()));
                    }
                    current.is_some() && !match_operators(stored, &inner, field)
                }
                literal => match current {
                    Some(v) => !value::equals(v, &fold(literal, insensitive), field_type, false),
                    None => false,
                },
            },
            _ => true,
        };
        if !ok {
            return false;
        }
    }
    true
}

// ── Scalar lists ────────────────────────────────────────────────────

fn match_list(stored: Option<&Value>, condition: &Value, field: &Field) -> bool {
    let field_type = Some(field.field_type.as_str());
    let items: &[Value] = match stored {
        Some(Value::Array(items)) => items,
        _ => &[],
    };
    let contains = |needle: &Value| items.iter().any(|i| value::equals(i, needle, field_type, false));

    let ops = match condition {
        Value::Null => return value::is_null(stored),
        Value::Object(ops) if is_operator_object(ops, LIST_OPERATORS) => ops,
        literal => return stored == Some(literal),
    };

    ops.iter().all(|(op, operand)| match op.as_str() {
        "equals" => stored == Some(operand),
        "has" => !operand.is_null() && contains(operand),
        "hasSome" => operand
            .as_array()
            .is_some_and(|wanted| wanted.iter().any(|w| contains(w))),
        "hasEvery" => operand
            .as_array()
            .is_some_and(|wanted| wanted.iter().all(|w| contains(w))),
        "isEmpty" => operand.as_bool() == Some(items.is_empty()),
        _ => true,
    })
}

// ── Relations ───────────────────────────────────────────────────────

fn match_relation(store: &Store, model: &Model, item: &Record, field: &Field, condition: &Value) -> bool {
    let Some(related_model) = store.schema().model(&field.field_type) else {
        return false;
    };

    if let Some(decided) = match_tracked(store, model, item, field, related_model, condition) {
        return decided;
    }

    if condition.is_null() {
        return match store.schema().linkage(model, field) {
            Some(linkage) if linkage.owned => linkage
                .local
                .iter()
                .any(|column| value::is_null(item.get(column))),
            _ => find::related_items(store, model, field, item).is_empty(),
        };
    }

    let Value::Object(ops) = condition else {
        return false;
    };
    let related = find::related_items(store, model, field, item);
    let satisfies = |record: &Record, inner: &Value| match inner {
        Value::Object(filter) => matches(store, related_model, record, filter),
        _ => true,
    };

    // To-one shorthand: `author: { name: "x" }` means `author: { is: { name: "x" } }`
    if !is_operator_object(ops, RELATION_OPERATORS) {
        return match related.first() {
            Some(record) => matches(store, related_model, record, ops),
            None => false,
        };
    }

    ops.iter().all(|(op, inner)| match op.as_str() {
        "some" => related.iter().any(|r| satisfies(r, inner)),
        "every" => related.iter().all(|r| satisfies(r, inner)),
        "none" => !related.iter().any(|r| satisfies(r, inner)),
        "is" if inner.is_null() => related.is_empty(),
        "is" => related.first().is_some_and(|r| satisfies(r, inner)),
        "isNot" if inner.is_null() => !related.is_empty(),
        "isNot" => !related.iter().any(|r| satisfies(r, inner)),
        _ => true,
    })
}

/// Let the relationship store decide id-shaped quantifiers on pure joins
fn match_tracked(
    store: &Store,
    model: &Model,
    item: &Record,
    field: &Field,
    related_model: &Model,
    condition: &Value,
) -> Option<bool> {
    let id_fields = related_model.id_fields();
    let [id_field] = id_fields.as_slice() else {
        return None;
    };
    let item_id = schema::record_id(model, item);
    if item_id.is_null() {
        return None;
    }
    store
        .relationships()
        .match_relation(&model.name, &field.name, &item_id, id_field, condition)
}
