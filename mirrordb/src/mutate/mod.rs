//! Write paths: create, update and delete, including nested relation writes.

pub mod create;
pub mod delete;
pub mod update;

mod nested;
mod unique;

use crate::error::{MirrorDbError, Result};
use crate::schema::{DefaultKind, Field, Model};
use crate::store::Store;
use crate::util::{self, value};
use serde_json::Value;

/// Generate the default of a field, consuming a counter value for autoincrement.
/// `None` when the field declares no usable default.
pub(crate) fn default_value(store: &Store, model: &Model, field: &Field) -> Option<Value> {
    let Some(default) = &field.default else {
        return field.is_updated_at.then(value::now);
    };
    let generated = match default.kind() {
        DefaultKind::Autoincrement => Value::from(store.next_increment(&model.name, &field.name)),
        DefaultKind::Now => value::now(),
        DefaultKind::Uuid => Value::String(util::uuid()),
        DefaultKind::Cuid => Value::String(util::cuid()),
        DefaultKind::Ulid => Value::String(util::ulid()),
        DefaultKind::Nanoid(size) => Value::String(util::nanoid(size)),
        DefaultKind::ObjectId => Value::String(util::object_id()),
        DefaultKind::Literal(Value::String(raw)) if field.is_json() => {
            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
        }
        DefaultKind::Literal(literal) => literal,
        DefaultKind::Unknown(name) => {
            log::warn!(
                "unsupported default '{name}' on {}.{}, leaving it null",
                model.name,
                field.name
            );
            return None;
        }
    };
    Some(generated)
}

/// The object payload of a nested operation
pub(crate) fn object_arg<'a>(arg: &'a Value, op: &str) -> Result<&'a serde_json::Map<String, Value>> {
    arg.as_object()
        .ok_or_else(|| MirrorDbError::Validation(format!("`{op}` expects an object")))
}

/// A required key of a nested operation payload, e.g. `where` of `connectOrCreate`
pub(crate) fn member<'a>(arg: &'a Value, key: &str, op: &str) -> Result<&'a serde_json::Map<String, Value>> {
    arg.get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| MirrorDbError::Validation(format!("`{op}` requires `{key}`")))
}
