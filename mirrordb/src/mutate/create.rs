use super::nested::{self, OwnedChange};
use super::{default_value, unique};
use crate::args::Filter;
use crate::error::Result;
use crate::schema::{Field, Model};
use crate::store::Store;
use crate::Record;
use serde_json::{Map, Value};

/// Materialize and insert one record of `model` from a create payload.
///
/// Relations whose FK lives on this record are resolved first so the FK can be bound.
/// Writes that touch dependents or the relationship store run after the insert.
/// Returns the stored record, unprojected.
pub fn create_record(store: &Store, model: &Model, data: &Filter) -> Result<Record> {
    log::trace!("creating {} record", model.name);

    let mut explicit: Map<String, Value> = Map::new();
    let mut deferred: Vec<(&Field, &Map<String, Value>)> = Vec::new();

    for (key, val) in data {
        let Some(field) = model.field(key) else {
            log::warn!("ignoring unknown field '{}.{key}' on create", model.name);
            continue;
        };
        if !field.is_relation() {
            explicit.insert(key.clone(), scalar_input(field, val));
            continue;
        }
        let Value::Object(ops) = val else {
            log::warn!("ignoring non-object relation payload '{}.{key}'", model.name);
            continue;
        };
        match store.schema().linkage(model, field) {
            Some(linkage) if linkage.owned => {
                match nested::write_owned(store, field, &linkage, ops, &explicit)? {
                    OwnedChange::Bind(target) => linkage.bind(&mut explicit, &target),
                    OwnedChange::Unbind | OwnedChange::UnbindAndDelete(_) => {
                        for column in &linkage.local {
                            explicit.insert(column.clone(), Value::Null);
                        }
                    }
                    OwnedChange::Keep => {}
                }
            }
            _ => deferred.push((field, ops)),
        }
    }

    let record = materialize(store, model, explicit);
    unique::check_unique(store, model, &record, None)?;
    store.append_item(&model.name, record.clone());

    for (field, ops) in deferred {
        nested::write_related(store, model, field, ops, &record)?;
    }
    Ok(record)
}

/// Lay out every scalar field in schema order, filling defaults for absent or null values
fn materialize(store: &Store, model: &Model, mut explicit: Map<String, Value>) -> Record {
    let mut record = Record::new();
    for field in model.scalar_fields() {
        let val = match explicit.remove(&field.name) {
            Some(v) if !v.is_null() => v,
            _ => default_value(store, model, field).unwrap_or(Value::Null),
        };
        record.insert(field.name.clone(), val);
    }
    record
}

/// Scalar lists accept `{ set: [...] }` on create; everything else is taken literally
fn scalar_input(field: &Field, val: &Value) -> Value {
    match val {
        Value::Object(ops) if field.is_list && ops.len() == 1 => {
            ops.get("set").cloned().unwrap_or_else(|| val.clone())
        }
        _ => val.clone(),
    }
}
