use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level schema document: store options plus the model list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub options: StoreOptions,
    #[serde(default)]
    pub models: Vec<Model>,
}

/// Store-wide behavior switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Rewind autoincrement counters when the store is reset
    #[serde(default)]
    pub reset_counters: bool,
    /// Reject creates/updates that collide on an id or unique field
    #[serde(default = "default_true")]
    pub enforce_unique: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            reset_counters: false,
            enforce_unique: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Definition of a single model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub primary_key: Option<CompoundKey>,
    #[serde(default)]
    pub unique_fields: Vec<Vec<String>>,
    #[serde(default)]
    pub unique_indexes: Vec<CompoundKey>,
    #[serde(skip)]
    field_index: HashMap<String, usize>,
}

/// A named or anonymous group of fields (composite id or unique index)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundKey {
    #[serde(default)]
    pub name: Option<String>,
    pub fields: Vec<String>,
}

impl CompoundKey {
    /// The name filters address the key by: explicit name, else fields joined by `_`.
    pub fn key_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.fields.join("_"))
    }
}

/// Definition of a single field in a model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_id: bool,
    #[serde(default)]
    pub is_updated_at: bool,
    #[serde(default)]
    pub has_default_value: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub relation_name: Option<String>,
    #[serde(default)]
    pub relation_from_fields: Vec<String>,
    #[serde(default)]
    pub relation_to_fields: Vec<String>,
    #[serde(default)]
    pub relation_on_delete: Option<OnDeletePolicy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Scalar,
    Object,
    Enum,
    Unsupported,
}

/// Default-value descriptor: a generator function or a literal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Function(DefaultFunction),
    Literal(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultFunction {
    pub name: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

/// What a default descriptor asks the store to generate
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultKind {
    Autoincrement,
    Now,
    Uuid,
    Cuid,
    Ulid,
    Nanoid(Option<usize>),
    ObjectId,
    Literal(serde_json::Value),
    Unknown(String),
}

impl DefaultValue {
    pub fn kind(&self) -> DefaultKind {
        match self {
            DefaultValue::Literal(value) => DefaultKind::Literal(value.clone()),
            DefaultValue::Function(function) => match function.name.as_str() {
                "autoincrement" | "sequence" => DefaultKind::Autoincrement,
                "now" => DefaultKind::Now,
                "uuid" => DefaultKind::Uuid,
                "cuid" => DefaultKind::Cuid,
                "ulid" => DefaultKind::Ulid,
                "nanoid" => DefaultKind::Nanoid(
                    function
                        .args
                        .first()
                        .and_then(|a| a.as_u64())
                        .map(|n| n as usize),
                ),
                "auto" | "dbgenerated" => DefaultKind::ObjectId,
                other => DefaultKind::Unknown(other.to_string()),
            },
        }
    }
}

/// Referential action applied to dependents when their target is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnDeletePolicy {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
    SetDefault,
}

impl Field {
    pub fn is_relation(&self) -> bool {
        self.kind == FieldKind::Object
    }

    /// True if this side stores the foreign-key columns
    pub fn owns_foreign_key(&self) -> bool {
        !self.relation_from_fields.is_empty()
    }

    pub fn is_json(&self) -> bool {
        self.field_type == "Json"
    }

    /// True for scalar types that use integer arithmetic
    pub fn is_integer(&self) -> bool {
        matches!(self.field_type.as_str(), "Int" | "BigInt")
    }
}

impl Model {
    /// Build the name -> field lookup. Called once at load time.
    pub(crate) fn build_index(&mut self) {
        self.field_index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.field_index.get(name).map(|&i| &self.fields[i])
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_relation())
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_relation())
    }

    /// Fields that identify a record: `isId` fields, else the composite primary key.
    pub fn id_fields(&self) -> Vec<&str> {
        let ids: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.is_id)
            .map(|f| f.name.as_str())
            .collect();
        if !ids.is_empty() {
            return ids;
        }
        self.primary_key
            .as_ref()
            .map(|pk| pk.fields.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Resolve a compound key name (e.g. `postId_userId`) to its member fields
    pub fn compound_key(&self, name: &str) -> Option<&[String]> {
        if let Some(pk) = &self.primary_key {
            if pk.key_name() == name {
                return Some(&pk.fields);
            }
        }
        if let Some(group) = self.unique_fields.iter().find(|g| g.join("_") == name) {
            return Some(group);
        }
        self.unique_indexes
            .iter()
            .find(|index| index.key_name() == name)
            .map(|index| index.fields.as_slice())
    }

    /// Every field group whose combined value must be unique within the collection
    pub fn unique_constraints(&self) -> Vec<Vec<String>> {
        let mut constraints: Vec<Vec<String>> = self
            .fields
            .iter()
            .filter(|f| f.is_id || f.is_unique)
            .map(|f| vec![f.name.clone()])
            .collect();
        if let Some(pk) = &self.primary_key {
            constraints.push(pk.fields.clone());
        }
        constraints.extend(self.unique_fields.iter().cloned());
        constraints.extend(self.unique_indexes.iter().map(|i| i.fields.clone()));
        constraints.dedup();
        constraints
    }
}
