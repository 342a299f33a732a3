use crate::args::Filter;
use crate::error::Result;
use crate::matcher;
use crate::schema::{self, Model, OnDeletePolicy};
use crate::store::Store;
use crate::util;
use crate::Record;

/// Remove every record matching `filter` and apply referential actions.
/// The unmatched records replace the stored collection. Returns the removed records.
pub fn delete_records(store: &Store, model: &Model, filter: Option<&Filter>) -> Result<Vec<Record>> {
    let (deleted, kept): (Vec<Record>, Vec<Record>) = store
        .items(&model.name)
        .into_iter()
        .partition(|item| filter.map_or(true, |f| matcher::matches(store, model, item, f)));
    if deleted.is_empty() {
        return Ok(deleted);
    }

    log::trace!("deleting {} {} record(s)", deleted.len(), model.name);
    store.replace_collection(&model.name, kept);
    for record in &deleted {
        after_delete(store, model, record)?;
    }
    Ok(deleted)
}

/// Remove one stored record and apply referential actions
pub fn delete_record(store: &Store, model: &Model, target: &Record) -> Result<()> {
    let mut items = store.items(&model.name);
    let Some(position) = items.iter().position(|item| item == target) else {
        return Ok(());
    };
    items.remove(position);
    store.replace_collection(&model.name, items);
    after_delete(store, model, target)
}

/// Drop relationship entries of a removed record and apply the `onDelete` policy
/// declared on each dependent relation.
fn after_delete(store: &Store, model: &Model, record: &Record) -> Result<()> {
    let id = schema::record_id(model, record);
    if !id.is_null() {
        store.relationships_mut().cleanup(&model.name, &id);
    }

    for field in model.relation_fields() {
        let Some(linkage) = store.schema().linkage(model, field) else {
            continue;
        };
        if linkage.owned {
            continue;
        }
        let Some(policy) = store
            .schema()
            .reciprocal(model, field)
            .and_then(|r| r.relation_on_delete)
        else {
            continue;
        };
        let Some(scope) = linkage.scope(record) else {
            continue;
        };
        let dependents = store.schema().related_model(field)?;

        match policy {
            OnDeletePolicy::Cascade => {
                delete_records(store, dependents, Some(&scope))?;
            }
            OnDeletePolicy::SetNull => {
                let detached = linkage.detached();
                let mut changed = false;
                let items: Vec<Record> = store
                    .items(&dependents.name)
                    .into_iter()
                    .map(|mut item| {
                        if util::shallow_compare(&item, &scope) {
                            item.extend(detached.clone());
                            changed = true;
                        }
                        item
                    })
                    .collect();
                if changed {
                    store.replace_collection(&dependents.name, items);
                }
            }
            OnDeletePolicy::Restrict | OnDeletePolicy::NoAction | OnDeletePolicy::SetDefault => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::{MirrorDbError, NotFoundCause};
    use crate::store::Store;
    use crate::test_support::blog_store;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn seed(store: &Store) {
        let users = store.delegate("User").unwrap();
        users
            .create(json!({ "data": {
                "email": "a@test.com",
                "posts": { "create": [{ "title": "one" }, { "title": "two" }] },
                "profile": { "create": { "bio": "hi" } }
            } }))
            .unwrap();
        users.create(json!({ "data": { "email": "b@test.com" } })).unwrap();
        store
            .delegate("Post")
            .unwrap()
            .create(json!({ "data": { "title": "three", "authorId": 2 } }))
            .unwrap();
        store
            .delegate("Reaction")
            .unwrap()
            .create(json!({ "data": { "postId": 1, "userId": 2, "kind": "like" } }))
            .unwrap();
    }

    #[test]
    fn test_cascade_and_set_null() {
        let store = blog_store();
        seed(&store);
        let deleted = store
            .delegate("User")
            .unwrap()
            .delete(json!({ "where": { "id": 1 } }))
            .unwrap();
        assert_eq!(deleted["email"], json!("a@test.com"));

        let posts = store.delegate("Post").unwrap().get_items();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["title"], json!("three"));

        // reactions on cascaded posts go too
        assert!(store.delegate("Reaction").unwrap().get_items().is_empty());

        let profiles = store.delegate("Profile").unwrap().get_items();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0]["userId"], Value::Null);
    }

    #[test]
    fn test_delete_returns_projection_taken_before_removal() {
        let store = blog_store();
        seed(&store);
        let deleted = store
            .delegate("User")
            .unwrap()
            .delete(json!({ "where": { "id": 1 }, "include": { "posts": true } }))
            .unwrap();
        assert_eq!(deleted["posts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_many() {
        let store = blog_store();
        seed(&store);
        let posts = store.delegate("Post").unwrap();
        let payload = posts
            .delete_many(json!({ "where": { "title": { "startsWith": "t" } } }))
            .unwrap();
        assert_eq!(payload.count, 2);
        assert_eq!(posts.get_items().len(), 1);
        assert_eq!(posts.delete_many(Value::Null).unwrap().count, 1);
    }

    #[test]
    fn test_delete_cleans_relationships() {
        let store = blog_store();
        let users = store.delegate("User").unwrap();
        users.create(json!({ "data": { "email": "a@test.com" } })).unwrap();
        users
            .create(json!({ "data": { "email": "b@test.com", "followers": { "connect": { "id": 1 } } } }))
            .unwrap();
        users
            .create(json!({ "data": { "email": "c@test.com", "following": { "connect": [{ "id": 1 }, { "id": 2 }] } } }))
            .unwrap();

        users.delete(json!({ "where": { "id": 1 } })).unwrap();
        let values = store.relationships().get("Follows").unwrap().values.clone();
        assert_eq!(values.len(), 1);
        assert!(values
            .iter()
            .all(|e| e.a != json!(1) && e.b != json!(1)));
    }

    #[test]
    fn test_delete_missing_rejects_and_keeps_store() {
        let store = blog_store();
        seed(&store);
        let before = store.snapshot();
        let err = store
            .delegate("Post")
            .unwrap()
            .delete(json!({ "where": { "id": 42 } }))
            .unwrap_err();
        assert!(matches!(
            err,
            MirrorDbError::NotFound { cause: NotFoundCause::DeleteTargetMissing, .. }
        ));
        assert_eq!(store.snapshot(), before);
    }
}
