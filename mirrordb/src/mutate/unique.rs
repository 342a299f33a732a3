use crate::error::{MirrorDbError, Result};
use crate::schema::Model;
use crate::store::Store;
use crate::util::value;
use crate::Record;
use serde_json::Value;

/// Reject `candidate` if it collides with another stored record on an id or unique group.
/// `previous` is the stored version of the record being updated, which never collides
/// with itself. Groups holding a null never collide.
pub(crate) fn check_unique(store: &Store, model: &Model, candidate: &Record, previous: Option<&Record>) -> Result<()> {
    if !store.schema().options().enforce_unique {
        return Ok(());
    }

    let items = store.items(&model.name);
    for fields in model.unique_constraints() {
        let key: Vec<&Value> = fields
            .iter()
            .map(|f| candidate.get(f).unwrap_or(&Value::Null))
            .collect();
        if key.iter().any(|v| v.is_null()) {
            continue;
        }

        let clash = items
            .iter()
            .filter(|item| previous != Some(*item))
            .any(|item| {
                fields.iter().zip(&key).all(|(f, expected)| {
                    item.get(f)
                        .is_some_and(|actual| value::equals(actual, expected, None, false))
                })
            });
        if clash {
            return Err(MirrorDbError::UniqueConstraint {
                model: model.name.clone(),
                fields,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blog_store, BLOG_SCHEMA};
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_unique_field_collision() {
        let store = blog_store();
        let user = store.schema().model("User").unwrap();
        store.append_item("User", record(json!({ "id": 1, "email": "a@test.com" })));

        let err = check_unique(&store, user, &record(json!({ "id": 2, "email": "a@test.com" })), None)
            .unwrap_err();
        match err {
            MirrorDbError::UniqueConstraint { model, fields } => {
                assert_eq!(model, "User");
                assert_eq!(fields, vec!["email".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(check_unique(&store, user, &record(json!({ "id": 2, "email": "b@test.com" })), None).is_ok());
    }

    #[test]
    fn test_record_does_not_collide_with_itself() {
        let store = blog_store();
        let user = store.schema().model("User").unwrap();
        let stored = record(json!({ "id": 1, "email": "a@test.com" }));
        store.append_item("User", stored.clone());
        let renamed = record(json!({ "id": 1, "email": "a@test.com", "name": "x" }));
        assert!(check_unique(&store, user, &renamed, Some(&stored)).is_ok());
    }

    #[test]
    fn test_composite_key_and_nulls() {
        let store = blog_store();
        let reaction = store.schema().model("Reaction").unwrap();
        store.append_item("Reaction", record(json!({ "postId": 1, "userId": 1, "kind": "a" })));
        assert!(check_unique(&store, reaction, &record(json!({ "postId": 1, "userId": 2 })), None).is_ok());
        assert!(check_unique(&store, reaction, &record(json!({ "postId": 1, "userId": 1 })), None).is_err());

        let profile = store.schema().model("Profile").unwrap();
        store.append_item("Profile", record(json!({ "id": 1, "userId": null })));
        assert!(check_unique(&store, profile, &record(json!({ "id": 2, "userId": null })), None).is_ok());
    }

    #[test]
    fn test_enforcement_can_be_disabled() {
        let schema = BLOG_SCHEMA.replace("enforce_unique: true", "enforce_unique: false");
        let store = Store::from_schema_str(&schema).unwrap();
        let user = store.schema().model("User").unwrap();
        store.append_item("User", record(json!({ "id": 1, "email": "a@test.com" })));
        assert!(check_unique(&store, user, &record(json!({ "id": 1, "email": "a@test.com" })), None).is_ok());
    }
}
