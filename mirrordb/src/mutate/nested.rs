//! Nested relation writes (`connect`, `create`, `update`, ...) shared by create and update.

use super::{create, delete, member, object_arg, update};
use crate::args::Filter;
use crate::error::{MirrorDbError, NotFoundCause, Result};
use crate::find;
use crate::schema::{self, Field, Linkage, Model};
use crate::store::Store;
use crate::util;
use crate::Record;
use serde_json::{Map, Value};

/// What a write through an owned relation does to this record's FK columns
pub(crate) enum OwnedChange {
    Keep,
    Bind(Record),
    Unbind,
    /// Null the FK, then delete the previously linked record
    UnbindAndDelete(Record),
}

fn connect_target(store: &Store, related: &Model, filter: &Filter) -> Result<Record> {
    find::first_match(store, related, Some(filter))
        .ok_or_else(|| MirrorDbError::not_found(&related.name, NotFoundCause::ConnectTargetMissing))
}

/// `{ data, where }` or plain data
fn update_payload(arg: &Value) -> Result<(Option<&Filter>, &Filter)> {
    match arg.get("data").and_then(Value::as_object) {
        Some(data) => Ok((arg.get("where").and_then(Value::as_object), data)),
        None => Ok((None, object_arg(arg, "update")?)),
    }
}

fn with_scope(data: &Filter, scope: &Filter) -> Filter {
    let mut merged = data.clone();
    for (k, v) in scope {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Create each payload, skipping unique violations when `skipDuplicates` is set
fn create_each(store: &Store, related: &Model, arg: &Value, scope: &Filter) -> Result<Vec<Record>> {
    let skip_duplicates = arg
        .get("skipDuplicates")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mut created = Vec::new();
    for data in util::as_objects(arg.get("data").unwrap_or(&Value::Null)) {
        match create::create_record(store, related, &with_scope(data, scope)) {
            Ok(record) => created.push(record),
            Err(MirrorDbError::UniqueConstraint { .. }) if skip_duplicates => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}

// ── Owned side: the FK lives on the record being written ────────────

/// Resolve writes through a relation whose FK columns live on `item`.
/// The caller applies the returned change to `item`.
pub(crate) fn write_owned(
    store: &Store,
    field: &Field,
    linkage: &Linkage,
    ops: &Map<String, Value>,
    item: &Record,
) -> Result<OwnedChange> {
    let related = store.schema().related_model(field)?;
    let current = linkage
        .scope(item)
        .and_then(|scope| find::first_match(store, related, Some(&scope)));
    let mut change = OwnedChange::Keep;

    for (op, arg) in ops {
        log::trace!("nested {op} through {}", field.name);
        match op.as_str() {
            "connect" => {
                change = OwnedChange::Bind(connect_target(store, related, object_arg(arg, op)?)?);
            }
            "connectOrCreate" => {
                let filter = member(arg, "where", op)?;
                let target = match find::first_match(store, related, Some(filter)) {
                    Some(found) => found,
                    None => create::create_record(store, related, member(arg, "create", op)?)?,
                };
                change = OwnedChange::Bind(target);
            }
            "create" => {
                change = OwnedChange::Bind(create::create_record(store, related, object_arg(arg, op)?)?);
            }
            "disconnect" if util::is_enabled(arg) => change = OwnedChange::Unbind,
            "update" => {
                let (_, data) = update_payload(arg)?;
                let target = current.as_ref().ok_or_else(|| {
                    MirrorDbError::not_found(&related.name, NotFoundCause::UpdateTargetMissing)
                })?;
                update::update_record(store, related, target, data)?;
            }
            "upsert" => match &current {
                Some(target) => {
                    update::update_record(store, related, target, member(arg, "update", op)?)?;
                }
                None => {
                    let created = create::create_record(store, related, member(arg, "create", op)?)?;
                    change = OwnedChange::Bind(created);
                }
            },
            "delete" if util::is_enabled(arg) => {
                let target = current.clone().ok_or_else(|| {
                    MirrorDbError::not_found(&related.name, NotFoundCause::DeleteTargetMissing)
                })?;
                change = OwnedChange::UnbindAndDelete(target);
            }
            "disconnect" | "delete" => {}
            other => log::warn!("ignoring nested '{other}' on {}", field.name),
        }
    }
    Ok(change)
}

/// Apply nested writes whose effects live outside `item`: dependents holding an FK to it,
/// or relationship store entries. `item` must already be stored.
pub(crate) fn write_related(
    store: &Store,
    model: &Model,
    field: &Field,
    ops: &Map<String, Value>,
    item: &Record,
) -> Result<()> {
    match store.schema().linkage(model, field) {
        Some(linkage) => write_dependents(store, field, &linkage, ops, item),
        None => write_relationship(store, model, field, ops, item),
    }
}

// ── Dependents: the FK lives on the related records ─────────────────

fn write_dependents(
    store: &Store,
    field: &Field,
    linkage: &Linkage,
    ops: &Map<String, Value>,
    item: &Record,
) -> Result<()> {
    let related = store.schema().related_model(field)?;
    let Some(scope) = linkage.scope(item) else {
        log::warn!("cannot write {} without a referenced value", field.name);
        return Ok(());
    };
    let detached = linkage.detached();
    let in_scope = |filter: Option<&Filter>| util::and_filter(filter, scope.clone());

    let connect = |arg: &Value| -> Result<()> {
        for filter in util::as_objects(arg) {
            let target = connect_target(store, related, filter)?;
            update::update_record(store, related, &target, &scope)?;
        }
        Ok(())
    };

    for (op, arg) in ops {
        log::trace!("nested {op} through {}", field.name);
        match op.as_str() {
            "connect" => connect(arg)?,
            "connectOrCreate" => {
                for entry in util::as_objects(arg) {
                    let entry = Value::Object(entry.clone());
                    let filter = member(&entry, "where", op)?;
                    match find::first_match(store, related, Some(filter)) {
                        Some(target) => {
                            update::update_record(store, related, &target, &scope)?;
                        }
                        None => {
                            let data = with_scope(member(&entry, "create", op)?, &scope);
                            create::create_record(store, related, &data)?;
                        }
                    }
                }
            }
            "create" => {
                for data in util::as_objects(arg) {
                    create::create_record(store, related, &with_scope(data, &scope))?;
                }
            }
            "createMany" => {
                create_each(store, related, arg, &scope)?;
            }
            "set" => {
                update::update_records(store, related, Some(&scope), &detached)?;
                connect(arg)?;
            }
            "disconnect" => match arg {
                Value::Bool(true) => {
                    update::update_records(store, related, Some(&scope), &detached)?;
                }
                _ => {
                    for filter in util::as_objects(arg) {
                        update::update_records(store, related, Some(&in_scope(Some(filter))), &detached)?;
                    }
                }
            },
            "update" | "updateMany" => {
                let entries: Vec<&Value> = match arg {
                    Value::Array(entries) => entries.iter().collect(),
                    single => vec![single],
                };
                for entry in entries {
                    let (filter, data) = update_payload(entry)?;
                    let updated = update::update_records(store, related, Some(&in_scope(filter)), data)?;
                    if op == "update" && updated.is_empty() {
                        return Err(MirrorDbError::not_found(
                            &related.name,
                            NotFoundCause::UpdateTargetMissing,
                        ));
                    }
                }
            }
            "upsert" => {
                for entry in util::as_objects(arg) {
                    let entry = Value::Object(entry.clone());
                    let filter = in_scope(entry.get("where").and_then(Value::as_object));
                    match find::first_match(store, related, Some(&filter)) {
                        Some(target) => {
                            update::update_record(store, related, &target, member(&entry, "update", op)?)?;
                        }
                        None => {
                            let data = with_scope(member(&entry, "create", op)?, &scope);
                            create::create_record(store, related, &data)?;
                        }
                    }
                }
            }
            "delete" => {
                let filters: Vec<Filter> = match arg {
                    Value::Bool(true) => vec![scope.clone()],
                    _ => util::as_objects(arg)
                        .into_iter()
                        .map(|f| in_scope(Some(f)))
                        .collect(),
                };
                for filter in filters {
                    if delete::delete_records(store, related, Some(&filter))?.is_empty() {
                        return Err(MirrorDbError::not_found(
                            &related.name,
                            NotFoundCause::DeleteTargetMissing,
                        ));
                    }
                }
            }
            "deleteMany" => match arg {
                Value::Bool(true) => {
                    delete::delete_records(store, related, Some(&scope))?;
                }
                _ => {
                    for filter in util::as_objects(arg) {
                        delete::delete_records(store, related, Some(&in_scope(Some(filter))))?;
                    }
                }
            },
            other => log::warn!("ignoring nested '{other}' on {}", field.name),
        }
    }
    Ok(())
}

// ── Pure joins: entries live in the relationship store ──────────────

fn write_relationship(
    store: &Store,
    model: &Model,
    field: &Field,
    ops: &Map<String, Value>,
    item: &Record,
) -> Result<()> {
    let related = store.schema().related_model(field)?;
    let name = field.relation_name.as_deref().ok_or_else(|| {
        MirrorDbError::Schema(format!("{}.{} has no relation name", model.name, field.name))
    })?;
    let id_fields = related.id_fields();
    let [id_field] = id_fields.as_slice() else {
        return Err(MirrorDbError::Validation(format!(
            "{} needs a single id field to join through {name}",
            related.name
        )));
    };
    let id = schema::record_id(model, item);
    let symmetric = store
        .relationships()
        .get(name)
        .is_some_and(|r| r.is_symmetric());

    let linked_ids = || store.relationships().relationship_ids(name, &model.name, &id);
    let linked = |filter: Option<&Filter>| {
        let mut scope = Map::new();
        scope.insert(
            id_field.to_string(),
            serde_json::json!({ "in": Value::Array(linked_ids()) }),
        );
        util::and_filter(filter, scope)
    };
    let link = |target: &Record| {
        let target_id = schema::record_id(related, target);
        store
            .relationships_mut()
            .connect(name, &model.name, &field.name, &id, &target_id);
    };
    let unlink = |target_id: &Value| {
        let mut relationships = store.relationships_mut();
        relationships.disconnect(name, &model.name, &field.name, &id, target_id);
        if symmetric {
            relationships.disconnect(name, &model.name, &field.name, target_id, &id);
        }
    };
    let connect = |arg: &Value| -> Result<()> {
        for filter in util::as_objects(arg) {
            let target = connect_target(store, related, filter)?;
            link(&target);
        }
        Ok(())
    };

    for (op, arg) in ops {
        log::trace!("nested {op} through {name}");
        match op.as_str() {
            "connect" => connect(arg)?,
            "connectOrCreate" => {
                for entry in util::as_objects(arg) {
                    let entry = Value::Object(entry.clone());
                    let target = match find::first_match(store, related, Some(member(&entry, "where", op)?)) {
                        Some(found) => found,
                        None => create::create_record(store, related, member(&entry, "create", op)?)?,
                    };
                    link(&target);
                }
            }
            "create" => {
                for data in util::as_objects(arg) {
                    let created = create::create_record(store, related, data)?;
                    link(&created);
                }
            }
            "createMany" => {
                for created in create_each(store, related, arg, &Map::new())? {
                    link(&created);
                }
            }
            "set" => {
                for target_id in linked_ids() {
                    unlink(&target_id);
                }
                connect(arg)?;
            }
            "disconnect" => {
                let filters: Vec<Filter> = match arg {
                    Value::Bool(true) => vec![linked(None)],
                    _ => util::as_objects(arg)
                        .into_iter()
                        .map(|f| linked(Some(f)))
                        .collect(),
                };
                for filter in filters {
                    for target in find::filter_items(store, related, store.items(&related.name), Some(&filter)) {
                        unlink(&schema::record_id(related, &target));
                    }
                }
            }
            "update" | "updateMany" => {
                let entries: Vec<&Value> = match arg {
                    Value::Array(entries) => entries.iter().collect(),
                    single => vec![single],
                };
                for entry in entries {
                    let (filter, data) = update_payload(entry)?;
                    let updated = update::update_records(store, related, Some(&linked(filter)), data)?;
                    if op == "update" && updated.is_empty() {
                        return Err(MirrorDbError::not_found(
                            &related.name,
                            NotFoundCause::UpdateTargetMissing,
                        ));
                    }
                }
            }
            "upsert" => {
                for entry in util::as_objects(arg) {
                    let entry = Value::Object(entry.clone());
                    let filter = linked(entry.get("where").and_then(Value::as_object));
                    match find::first_match(store, related, Some(&filter)) {
                        Some(target) => {
                            update::update_record(store, related, &target, member(&entry, "update", op)?)?;
                        }
                        None => {
                            let created = create::create_record(store, related, member(&entry, "create", op)?)?;
                            link(&created);
                        }
                    }
                }
            }
            "delete" | "deleteMany" => {
                let filters: Vec<Filter> = match arg {
                    Value::Bool(true) => vec![linked(None)],
                    _ => util::as_objects(arg)
                        .into_iter()
                        .map(|f| linked(Some(f)))
                        .collect(),
                };
                for filter in filters {
                    let deleted = delete::delete_records(store, related, Some(&filter))?;
                    if op == "delete" && deleted.is_empty() {
                        return Err(MirrorDbError::not_found(
                            &related.name,
                            NotFoundCause::DeleteTargetMissing,
                        ));
                    }
                }
            }
            other => log::warn!("ignoring nested '{other}' on {}", field.name),
        }
    }
    Ok(())
}
