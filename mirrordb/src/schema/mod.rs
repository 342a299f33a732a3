mod parser;
mod types;

pub use parser::{parse_schema, parse_schema_str};
pub use types::{
    CompoundKey, DefaultFunction, DefaultKind, DefaultValue, Field, FieldKind, Model,
    OnDeletePolicy, SchemaDefinition, StoreOptions,
};

use crate::error::{MirrorDbError, Result};
use crate::Record;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A loaded, indexed schema. Immutable once built.
#[derive(Debug, Clone)]
pub struct Schema {
    models: Vec<Model>,
    by_name: HashMap<String, usize>,
    options: StoreOptions,
}

/// How records of two models are joined through foreign-key columns.
///
/// A related record belongs to `item` when `related[foreign[i]] == item[local[i]]`
/// for every `i`. `owned` is set when the model on the `local` side stores the FK.
#[derive(Debug, Clone, PartialEq)]
pub struct Linkage {
    pub local: Vec<String>,
    pub foreign: Vec<String>,
    pub owned: bool,
}

impl Linkage {
    /// Equality filter selecting the related records of `item`.
    /// `None` when any local column is null, since nothing can be linked then.
    pub fn scope(&self, item: &Record) -> Option<Map<String, Value>> {
        let mut filter = Map::new();
        for (local, foreign) in self.local.iter().zip(&self.foreign) {
            let val = item.get(local).filter(|v| !v.is_null())?;
            filter.insert(foreign.clone(), val.clone());
        }
        Some(filter)
    }

    /// Copy the referenced values of `target` into the FK columns of `item`
    pub fn bind(&self, item: &mut Record, target: &Record) {
        for (local, foreign) in self.local.iter().zip(&self.foreign) {
            let val = target.get(foreign).cloned().unwrap_or(Value::Null);
            item.insert(local.clone(), val);
        }
    }

    /// The dependent-side FK columns set to null
    pub fn detached(&self) -> Map<String, Value> {
        self.foreign
            .iter()
            .map(|f| (f.clone(), Value::Null))
            .collect()
    }
}

impl Schema {
    /// Index a schema definition. Fails on duplicate models or relations to unknown models.
    pub fn new(definition: SchemaDefinition) -> Result<Self> {
        let SchemaDefinition { options, models } = definition;
        let mut models = models;
        let mut by_name = HashMap::new();

        for (i, model) in models.iter_mut().enumerate() {
            model.build_index();
            if by_name.insert(model.name.clone(), i).is_some() {
                return Err(MirrorDbError::Schema(format!(
                    "Model '{}' is defined more than once",
                    model.name
                )));
            }
        }

        for model in &models {
            for field in model.relation_fields() {
                if !by_name.contains_key(&field.field_type) {
                    return Err(MirrorDbError::Schema(format!(
                        "Field '{}.{}' references unknown model '{}'",
                        model.name, field.name, field.field_type
                    )));
                }
            }
        }

        Ok(Schema {
            models,
            by_name,
            options,
        })
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.by_name.get(name).map(|&i| &self.models[i])
    }

    pub fn model_or_err(&self, name: &str) -> Result<&Model> {
        self.model(name).ok_or_else(|| {
            MirrorDbError::Schema(format!("Model '{name}' not found in schema"))
        })
    }

    /// The model a relation field points at
    pub fn related_model(&self, field: &Field) -> Result<&Model> {
        self.model_or_err(&field.field_type)
    }

    /// The field on the other end of a relation
    pub fn reciprocal(&self, model: &Model, field: &Field) -> Option<&Field> {
        let relation = field.relation_name.as_deref()?;
        let related = self.model(&field.field_type)?;
        related.relation_fields().find(|f| {
            f.relation_name.as_deref() == Some(relation)
                && f.field_type == model.name
                && !(related.name == model.name && f.name == field.name)
        })
    }

    /// FK linkage for a relation field; `None` for pure many-to-many joins.
    pub fn linkage(&self, model: &Model, field: &Field) -> Option<Linkage> {
        if field.owns_foreign_key() {
            return Some(Linkage {
                local: field.relation_from_fields.clone(),
                foreign: field.relation_to_fields.clone(),
                owned: true,
            });
        }
        let reciprocal = self.reciprocal(model, field)?;
        if !reciprocal.owns_foreign_key() {
            return None;
        }
        Some(Linkage {
            local: reciprocal.relation_to_fields.clone(),
            foreign: reciprocal.relation_from_fields.clone(),
            owned: false,
        })
    }
}

/// Identity of a record: its single id value, or an array for composite keys.
pub fn record_id(model: &Model, item: &Record) -> Value {
    let ids = model.id_fields();
    match ids.as_slice() {
        [] => Value::Null,
        [single] => item.get(*single).cloned().unwrap_or(Value::Null),
        many => Value::Array(
            many.iter()
                .map(|f| item.get(*f).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
    }
}
