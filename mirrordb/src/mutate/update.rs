use super::nested::{self, OwnedChange};
use super::{default_value, delete, unique};
use crate::args::Filter;
use crate::error::{MirrorDbError, NotFoundCause, Result};
use crate::find;
use crate::schema::{self, Field, Model};
use crate::store::Store;
use crate::util::value;
use crate::Record;
use serde_json::{Map, Value};

const SCALAR_UPDATES: &[&str] = &["set", "increment", "decrement", "multiply", "divide", "push"];

/// Apply `data` to every record matching `filter`. Returns the updated records.
pub fn update_records(store: &Store, model: &Model, filter: Option<&Filter>, data: &Filter) -> Result<Vec<Record>> {
    let targets = find::filter_items(store, model, store.items(&model.name), filter);
    let mut updated = Vec::with_capacity(targets.len());
    for target in &targets {
        // Nested writes on earlier targets may have rewritten or removed this one
        let Some(current) = reload(store, model, target) else {
            continue;
        };
        updated.push(update_record(store, model, &current, data)?);
    }
    Ok(updated)
}

/// The stored version of `target`, found by identity, or by equality for id-less models
fn reload(store: &Store, model: &Model, target: &Record) -> Option<Record> {
    let id = schema::record_id(model, target);
    store.items(&model.name).into_iter().find(|item| {
        if id.is_null() {
            item == target
        } else {
            schema::record_id(model, item) == id
        }
    })
}

/// Apply the nested-update interpreter to one stored record.
/// Returns the stored result, unprojected.
pub fn update_record(store: &Store, model: &Model, current: &Record, data: &Filter) -> Result<Record> {
    log::trace!("updating {} record", model.name);

    let mut next = current.clone();
    let mut deferred: Vec<(&Field, &Map<String, Value>)> = Vec::new();
    let mut orphaned: Vec<(&Field, Record)> = Vec::new();

    for (key, val) in data {
        let Some(field) = model.field(key) else {
            log::warn!("ignoring unknown field '{}.{key}' on update", model.name);
            continue;
        };
        if !field.is_relation() {
            let updated = apply_scalar(field, next.get(key), val)?;
            next.insert(key.clone(), updated);
            continue;
        }
        let Value::Object(ops) = val else {
            log::warn!("ignoring non-object relation payload '{}.{key}'", model.name);
            continue;
        };
        match store.schema().linkage(model, field) {
            Some(linkage) if linkage.owned => {
                match nested::write_owned(store, field, &linkage, ops, &next)? {
                    OwnedChange::Keep => {}
                    OwnedChange::Bind(target) => linkage.bind(&mut next, &target),
                    OwnedChange::Unbind => unbind(&mut next, &linkage.local),
                    OwnedChange::UnbindAndDelete(target) => {
                        unbind(&mut next, &linkage.local);
                        orphaned.push((field, target));
                    }
                }
            }
            _ => deferred.push((field, ops)),
        }
    }

    for field in model.scalar_fields() {
        let written = data.contains_key(&field.name);
        if field.is_updated_at && !written {
            next.insert(field.name.clone(), value::now());
        } else if value::is_null(next.get(&field.name)) {
            if let Some(default) = default_value(store, model, field) {
                next.insert(field.name.clone(), default);
            }
        }
    }

    if next != *current {
        unique::check_unique(store, model, &next, Some(current))?;
        if !store.replace_item(&model.name, current, next.clone()) {
            return Err(MirrorDbError::not_found(
                &model.name,
                NotFoundCause::UpdateTargetMissing,
            ));
        }
    }

    for (field, target) in orphaned {
        delete::delete_record(store, store.schema().related_model(field)?, &target)?;
    }
    for (field, ops) in deferred {
        nested::write_related(store, model, field, ops, &next)?;
    }
    Ok(next)
}

fn unbind(record: &mut Record, columns: &[String]) {
    for column in columns {
        record.insert(column.clone(), Value::Null);
    }
}

/// New value of a scalar field given its current value and the update payload
fn apply_scalar(field: &Field, current: Option<&Value>, update: &Value) -> Result<Value> {
    let Value::Object(ops) = update else {
        return Ok(update.clone());
    };
    if field.is_json() || ops.len() != 1 {
        return Ok(update.clone());
    }
    let Some((op, operand)) = ops.iter().next() else {
        return Ok(update.clone());
    };
    if !SCALAR_UPDATES.contains(&op.as_str()) {
        return Ok(update.clone());
    }

    match op.as_str() {
        "set" => Ok(operand.clone()),
        "push" => {
            let mut items = match current {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            match operand {
                Value::Array(more) => items.extend(more.iter().cloned()),
                single => items.push(single.clone()),
            }
            Ok(Value::Array(items))
        }
        arithmetic => {
            let current = current.filter(|v| !v.is_null());
            let Some(current) = current else {
                return Ok(Value::Null);
            };
            if field.is_integer() {
                integer_arithmetic(field, current, arithmetic, operand)
            } else {
                float_arithmetic(field, current, arithmetic, operand)
            }
        }
    }
}

fn invalid_operand(field: &Field, op: &str) -> MirrorDbError {
    MirrorDbError::Validation(format!("Invalid `{op}` operand for field '{}'", field.name))
}

fn integer_arithmetic(field: &Field, current: &Value, op: &str, operand: &Value) -> Result<Value> {
    let (Some(a), Some(b)) = (value::to_bigint(current), value::to_bigint(operand)) else {
        return Err(invalid_operand(field, op));
    };
    let result = match op {
        "increment" => a.checked_add(b),
        "decrement" => a.checked_sub(b),
        "multiply" => a.checked_mul(b),
        _ => a.checked_div(b),
    }
    .ok_or_else(|| invalid_operand(field, op))?;

    // BigInt columns stored as decimal strings stay strings
    if current.is_string() {
        return Ok(Value::String(result.to_string()));
    }
    Ok(i64::try_from(result)
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(result.to_string())))
}

fn float_arithmetic(field: &Field, current: &Value, op: &str, operand: &Value) -> Result<Value> {
    let (Some(a), Some(b)) = (value::to_f64(current), value::to_f64(operand)) else {
        return Err(invalid_operand(field, op));
    };
    let result = match op {
        "increment" => a + b,
        "decrement" => a - b,
        "multiply" => a * b,
        _ => a / b,
    };
    Ok(value::float_value(result))
}
