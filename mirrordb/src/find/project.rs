use crate::args::{self, FindArgs, Filter};
use crate::error::{MirrorDbError, Result};
use crate::find;
use crate::schema::{Field, Model};
use crate::store::Store;
use crate::util;
use crate::Record;
use serde_json::{Map, Value};

/// `select` and `include` cannot be combined on the same level
pub fn check_projection(select: Option<&Filter>, include: Option<&Filter>) -> Result<()> {
    if select.is_some() && include.is_some() {
        return Err(MirrorDbError::Validation(
            "Please either use `include` or `select`, but not both at the same time.".into(),
        ));
    }
    Ok(())
}

/// Shape one record for output.
/// `include` keeps every scalar and adds relations, `select` keeps only what it names.
pub fn project(
    store: &Store,
    model: &Model,
    item: &Record,
    select: Option<&Filter>,
    include: Option<&Filter>,
) -> Result<Record> {
    check_projection(select, include)?;

    let (selection, mut out) = match (select, include) {
        (Some(select), _) => (select, Map::new()),
        (None, Some(include)) => (include, item.clone()),
        (None, None) => return Ok(item.clone()),
    };

    for (key, arg) in selection {
        if !util::is_enabled(arg) {
            continue;
        }
        if key == "_count" {
            out.insert(key.clone(), relation_counts(store, model, item, arg)?);
            continue;
        }
        match model.field(key) {
            Some(field) if field.is_relation() => {
                out.insert(key.clone(), resolve_relation(store, model, item, field, arg)?);
            }
            Some(_) => {
                out.insert(key.clone(), item.get(key).cloned().unwrap_or(Value::Null));
            }
            None if select.is_some() => {
                if let Some(v) = item.get(key) {
                    out.insert(key.clone(), v.clone());
                }
            }
            None => log::warn!("include on unknown relation '{}.{key}'", model.name),
        }
    }
    Ok(out)
}

/// Related records of `item` shaped by the nested find args in `arg`
fn resolve_relation(store: &Store, model: &Model, item: &Record, field: &Field, arg: &Value) -> Result<Value> {
    let related_model = store.schema().related_model(field)?;
    let nested: FindArgs = match arg {
        Value::Object(_) => args::parse(arg.clone())?,
        _ => FindArgs::default(),
    };
    let related = find::related_items(store, model, field, item);

    if field.is_list {
        let rows = find::query(store, related_model, related, &nested)?;
        return Ok(Value::Array(rows.into_iter().map(Value::Object).collect()));
    }
    match related.first() {
        Some(record) => Ok(Value::Object(project(
            store,
            related_model,
            record,
            nested.select.as_ref(),
            nested.include.as_ref(),
        )?)),
        None => Ok(Value::Null),
    }
}

/// Number of rows linked through `field`, optionally narrowed by `filter`
pub fn relation_count(store: &Store, model: &Model, item: &Record, field: &Field, filter: Option<&Filter>) -> usize {
    let related = find::related_items(store, model, field, item);
    match (filter, store.schema().model(&field.field_type)) {
        (Some(f), Some(related_model)) => {
            find::filter_items(store, related_model, related, Some(f)).len()
        }
        _ => related.len(),
    }
}

/// `_count: true` counts every list relation; `_count: { select: { posts: true } }` picks them
fn relation_counts(store: &Store, model: &Model, item: &Record, arg: &Value) -> Result<Value> {
    let mut counts = Map::new();
    let wanted = arg.get("select").and_then(Value::as_object);

    match wanted {
        Some(wanted) => {
            for (name, spec) in wanted {
                if !util::is_enabled(spec) {
                    continue;
                }
                let field = model
                    .field(name)
                    .filter(|f| f.is_relation())
                    .ok_or_else(|| {
                        MirrorDbError::Validation(format!(
                            "Unknown relation '{name}' in _count on {}",
                            model.name
                        ))
                    })?;
                let filter = spec.get("where").and_then(Value::as_object);
                counts.insert(name.clone(), relation_count(store, model, item, field, filter).into());
            }
        }
        None => {
            for field in model.relation_fields().filter(|f| f.is_list) {
                counts.insert(
                    field.name.clone(),
                    relation_count(store, model, item, field, None).into(),
                );
            }
        }
    }
    Ok(Value::Object(counts))
}
