//! Tracks many-to-many and self-referencing associations that have no
//! foreign-key columns on either side.

use crate::schema::Model;
use crate::util::value;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// One end of a relationship: the field and the model declaring it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Side {
    pub field: String,
    pub model: String,
}

/// A directed pair. `a` is a record id of side a's model, `b` of side b's.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub a: Value,
    pub b: Value,
}

#[derive(Debug, Clone)]
pub struct Relationship {
    pub name: String,
    pub a: Side,
    pub b: Side,
    pub values: Vec<Entry>,
}

impl Relationship {
    /// Both sides live on the same model, so pairs are read in both directions
    pub fn is_symmetric(&self) -> bool {
        self.a.model == self.b.model
    }

    fn is_side_a(&self, model: &str, field: &str) -> bool {
        self.a.model == model && self.a.field == field
    }

    /// Counterpart ids of `id` as seen from `model`'s side(s)
    fn counterparts(&self, model: &str, id: &Value, out: &mut Vec<Value>) {
        for entry in &self.values {
            if self.a.model == model && value::equals(&entry.a, id, None, false) {
                push_unique(out, &entry.b);
            }
            if self.b.model == model && value::equals(&entry.b, id, None, false) {
                push_unique(out, &entry.a);
            }
        }
    }

    fn oriented(&self, model: &str, field: &str, id: &Value, target: &Value) -> Entry {
        if self.is_side_a(model, field) {
            Entry {
                a: id.clone(),
                b: target.clone(),
            }
        } else {
            Entry {
                a: target.clone(),
                b: id.clone(),
            }
        }
    }
}

fn push_unique(out: &mut Vec<Value>, id: &Value) {
    if !out.iter().any(|v| value::equals(v, id, None, false)) {
        out.push(id.clone());
    }
}

fn targets(values: &Value) -> Vec<&Value> {
    match values {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

/// All pure relationships of a schema and their entries
#[derive(Debug, Clone, Default)]
pub struct RelationshipStore {
    relationships: BTreeMap<String, Relationship>,
    /// `(model, field)` -> relationship name, for both sides
    by_side: HashMap<(String, String), String>,
}

impl RelationshipStore {
    /// Derive relationships from relation fields grouped by relation name.
    /// A group qualifies only when no field in it carries FK columns.
    pub fn new(models: &[Model]) -> Self {
        let mut groups: BTreeMap<&str, Vec<Side>> = BTreeMap::new();
        let mut disqualified: Vec<&str> = Vec::new();

        for model in models {
            for field in model.relation_fields() {
                let Some(name) = field.relation_name.as_deref() else {
                    continue;
                };
                if !field.relation_from_fields.is_empty() || !field.relation_to_fields.is_empty() {
                    disqualified.push(name);
                }
                groups.entry(name).or_default().push(Side {
                    field: field.name.clone(),
                    model: model.name.clone(),
                });
            }
        }

        let mut relationships = BTreeMap::new();
        let mut by_side = HashMap::new();
        for (name, mut sides) in groups {
            if disqualified.contains(&name) || sides.len() != 2 {
                continue;
            }
            sides.sort_by(|x, y| x.field.cmp(&y.field).then_with(|| x.model.cmp(&y.model)));
            let mut sides = sides.into_iter();
            let (Some(a), Some(b)) = (sides.next(), sides.next()) else {
                continue;
            };
            for side in [&a, &b] {
                by_side.insert((side.model.clone(), side.field.clone()), name.to_string());
            }
            relationships.insert(
                name.to_string(),
                Relationship {
                    name: name.to_string(),
                    a,
                    b,
                    values: Vec::new(),
                },
            );
        }

        RelationshipStore {
            relationships,
            by_side,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    /// The relationship tracking `model.field`, if it is a pure join
    pub fn find(&self, model: &str, field: &str) -> Option<&Relationship> {
        let name = self.by_side.get(&(model.to_string(), field.to_string()))?;
        self.relationships.get(name)
    }

    /// Record `id` (a record of `model`) as linked through `field` to every target.
    /// Pairs that already exist are not added again.
    pub fn connect(&mut self, name: &str, model: &str, field: &str, id: &Value, values: &Value) {
        let Some(relationship) = self.relationships.get_mut(name) else {
            log::warn!("connect on unknown relationship '{name}'");
            return;
        };
        for target in targets(values) {
            let entry = relationship.oriented(model, field, id, target);
            let exists = relationship.values.iter().any(|e| {
                value::equals(&e.a, &entry.a, None, false) && value::equals(&e.b, &entry.b, None, false)
            });
            if !exists {
                relationship.values.push(entry);
            }
        }
    }

    /// Remove exactly the oriented pairs between `id` and the targets
    pub fn disconnect(&mut self, name: &str, model: &str, field: &str, id: &Value, values: &Value) {
        let Some(relationship) = self.relationships.get_mut(name) else {
            return;
        };
        for target in targets(values) {
            let entry = relationship.oriented(model, field, id, target);
            relationship.values.retain(|e| {
                !(value::equals(&e.a, &entry.a, None, false)
                    && value::equals(&e.b, &entry.b, None, false))
            });
        }
    }

    /// Decide an id-shaped `some`/`none` filter on a pure relation field.
    ///
    /// Returns `None` when no relationship tracks `model.field` or when the filter
    /// needs more than the stored ids, leaving the caller to match generically.
    pub fn match_relation(
        &self,
        model: &str,
        field: &str,
        item_id: &Value,
        id_field: &str,
        filter: &Value,
    ) -> Option<bool> {
        let relationship = self.find(model, field)?;
        let conditions = filter.as_object()?;
        if conditions.is_empty() {
            return None;
        }

        let mut wanted = Vec::new();
        for (op, inner) in conditions {
            if op != "some" && op != "none" {
                return None;
            }
            wanted.push((op.as_str(), id_operand(inner, id_field)?));
        }

        let mut ids = Vec::new();
        relationship.counterparts(model, item_id, &mut ids);
        let result = wanted.into_iter().all(|(op, target)| {
            let linked = ids.iter().any(|id| value::equals(id, target, None, false));
            if op == "some" {
                linked
            } else {
                !linked
            }
        });
        Some(result)
    }

    /// Ids connected to `id_or_filter` from `model`'s perspective.
    /// `{ in: [...] }` returns the deduplicated union over all given ids.
    pub fn relationship_ids(&self, name: &str, model: &str, id_or_filter: &Value) -> Vec<Value> {
        let Some(relationship) = self.relationships.get(name) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        match id_or_filter.get("in").and_then(Value::as_array) {
            Some(ids) => {
                for id in ids {
                    relationship.counterparts(model, id, &mut out);
                }
            }
            None => relationship.counterparts(model, id_or_filter, &mut out),
        }
        out
    }

    /// Strip every entry where `id` sits on a side declared by `model`
    pub fn cleanup(&mut self, model: &str, id: &Value) {
        for relationship in self.relationships.values_mut() {
            let (on_a, on_b) = (relationship.a.model == model, relationship.b.model == model);
            if !on_a && !on_b {
                continue;
            }
            relationship.values.retain(|e| {
                !(on_a && value::equals(&e.a, id, None, false))
                    && !(on_b && value::equals(&e.b, id, None, false))
            });
        }
    }

    /// Forget all entries, keep the definitions
    pub fn reset_values(&mut self) {
        for relationship in self.relationships.values_mut() {
            relationship.values.clear();
        }
    }
}

/// The target id of `{ <id_field>: x }` or `{ <id_field>: { equals: x } }`
fn id_operand<'a>(filter: &'a Value, id_field: &str) -> Option<&'a Value> {
    let map = filter.as_object()?;
    if map.len() != 1 {
        return None;
    }
    let operand = map.get(id_field)?;
    let operand = match operand {
        Value::Object(ops) if ops.len() == 1 => ops.get("equals")?,
        other => other,
    };
    value::is_scalar(operand).then_some(operand).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::blog_schema;
    use serde_json::json;

    fn store() -> RelationshipStore {
        RelationshipStore::new(blog_schema().models())
    }

    #[test]
    fn test_only_pure_joins_are_tracked() {
        let rs = store();
        assert!(rs.get("PostTags").is_some());
        assert!(rs.get("Follows").is_some());
        assert!(rs.get("PostAuthor").is_none());
        assert!(rs.get("UserProfile").is_none());
    }

    #[test]
    fn test_find_by_either_side() {
        let rs = store();
        assert_eq!(rs.find("Post", "tags").map(|r| r.name.as_str()), Some("PostTags"));
        assert_eq!(rs.find("Tag", "posts").map(|r| r.name.as_str()), Some("PostTags"));
        assert_eq!(rs.find("User", "following").map(|r| r.name.as_str()), Some("Follows"));
        assert!(rs.find("Post", "author").is_none());
        assert!(rs.find("Tag", "tags").is_none());
    }

    #[test]
    fn test_sides_sorted_by_field_name() {
        let rs = store();
        let tags = rs.get("PostTags").unwrap();
        assert_eq!(tags.a, Side { field: "posts".into(), model: "Tag".into() });
        assert_eq!(tags.b, Side { field: "tags".into(), model: "Post".into() });
        assert!(!tags.is_symmetric());
        assert!(rs.get("Follows").unwrap().is_symmetric());
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut rs = store();
        rs.connect("PostTags", "Post", "tags", &json!(1), &json!("t1"));
        rs.connect("PostTags", "Post", "tags", &json!(1), &json!("t1"));
        let values = &rs.get("PostTags").unwrap().values;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], Entry { a: json!("t1"), b: json!(1) });
    }

    #[test]
    fn test_connect_many_targets() {
        let mut rs = store();
        rs.connect("PostTags", "Post", "tags", &json!(1), &json!(["t1", "t2"]));
        assert_eq!(rs.relationship_ids("PostTags", "Post", &json!(1)), vec![json!("t1"), json!("t2")]);
        assert_eq!(rs.relationship_ids("PostTags", "Tag", &json!("t2")), vec![json!(1)]);
    }

    #[test]
    fn test_symmetric_lookup() {
        let mut rs = store();
        rs.connect("Follows", "User", "followers", &json!(1), &json!(2));
        assert_eq!(rs.relationship_ids("Follows", "User", &json!(1)), vec![json!(2)]);
        assert_eq!(rs.relationship_ids("Follows", "User", &json!(2)), vec![json!(1)]);
    }

    #[test]
    fn test_ids_for_in_filter_are_deduplicated() {
        let mut rs = store();
        rs.connect("PostTags", "Post", "tags", &json!(1), &json!(["t1", "t2"]));
        rs.connect("PostTags", "Post", "tags", &json!(2), &json!(["t2", "t3"]));
        let ids = rs.relationship_ids("PostTags", "Post", &json!({ "in": [1, 2] }));
        assert_eq!(ids, vec![json!("t1"), json!("t2"), json!("t3")]);
    }

    #[test]
    fn test_disconnect_is_directional() {
        let mut rs = store();
        rs.connect("Follows", "User", "followers", &json!(1), &json!(2));
        rs.connect("Follows", "User", "followers", &json!(2), &json!(1));
        rs.disconnect("Follows", "User", "followers", &json!(1), &json!(2));
        let values = &rs.get("Follows").unwrap().values;
        assert_eq!(values, &vec![Entry { a: json!(2), b: json!(1) }]);
    }

    #[test]
    fn test_cleanup_removes_every_reference() {
        let mut rs = store();
        rs.connect("Follows", "User", "followers", &json!(1), &json!([2, 3]));
        rs.connect("Follows", "User", "followers", &json!(3), &json!(1));
        rs.connect("Follows", "User", "followers", &json!(2), &json!(3));
        rs.cleanup("User", &json!(1));
        let values = &rs.get("Follows").unwrap().values;
        assert_eq!(values, &vec![Entry { a: json!(2), b: json!(3) }]);
    }

    #[test]
    fn test_match_relation() {
        let mut rs = store();
        rs.connect("PostTags", "Post", "tags", &json!(1), &json!("t1"));

        let some = json!({ "some": { "id": "t1" } });
        let none = json!({ "none": { "id": "t1" } });
        assert_eq!(rs.match_relation("Post", "tags", &json!(1), "id", &some), Some(true));
        assert_eq!(rs.match_relation("Post", "tags", &json!(1), "id", &none), Some(false));
        assert_eq!(rs.match_relation("Post", "tags", &json!(2), "id", &none), Some(true));
        // not tracked, or not decidable from ids alone
        assert_eq!(rs.match_relation("Post", "author", &json!(1), "id", &some), None);
        let by_name = json!({ "some": { "name": "rust" } });
        assert_eq!(rs.match_relation("Post", "tags", &json!(1), "id", &by_name), None);
    }

    #[test]
    fn test_reset_keeps_definitions() {
        let mut rs = store();
        rs.connect("PostTags", "Post", "tags", &json!(1), &json!("t1"));
        rs.reset_values();
        assert!(rs.get("PostTags").unwrap().values.is_empty());
    }
}
