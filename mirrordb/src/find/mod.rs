//! The read pipeline: filter, order, cursor, skip/take, distinct, project.

pub mod order;
mod project;

pub use project::{check_projection, project, relation_count};

use crate::args::{FindArgs, Filter};
use crate::error::Result;
use crate::matcher;
use crate::schema::{self, Field, Model};
use crate::store::Store;
use crate::util::{self, value};
use crate::Record;
use serde_json::Value;

/// Run the read pipeline over a model's whole collection
pub fn find_many(store: &Store, model: &Model, args: &FindArgs) -> Result<Vec<Record>> {
    query(store, model, store.items(&model.name), args)
}

/// Run the read pipeline over a given set of records of `model`
pub fn query(store: &Store, model: &Model, items: Vec<Record>, args: &FindArgs) -> Result<Vec<Record>> {
    check_projection(args.select.as_ref(), args.include.as_ref())?;

    let mut records = filter_items(store, model, items, args.filter.as_ref());
    if let Some(order_by) = &args.order_by {
        order::sort_records(store, model, &mut records, order_by);
    }
    if let Some(cursor) = &args.cursor {
        apply_cursor(store, model, &mut records, cursor, args.take);
    }
    let mut records = paginate(records, args.skip, args.take);
    if let Some(distinct) = &args.distinct {
        records = distinct_by(records, &util::string_list(distinct));
    }

    records
        .iter()
        .map(|r| project(store, model, r, args.select.as_ref(), args.include.as_ref()))
        .collect()
}

/// Records of `items` matching `filter`, in their current order
pub fn filter_items(store: &Store, model: &Model, items: Vec<Record>, filter: Option<&Filter>) -> Vec<Record> {
    match filter {
        Some(f) if !f.is_empty() => items
            .into_iter()
            .filter(|item| matcher::matches(store, model, item, f))
            .collect(),
        _ => items,
    }
}

/// The first stored record matching `filter`, unprojected
pub fn first_match(store: &Store, model: &Model, filter: Option<&Filter>) -> Option<Record> {
    store.items(&model.name).into_iter().find(|item| match filter {
        Some(f) => matcher::matches(store, model, item, f),
        None => true,
    })
}

/// Records linked to `item` through `field`, unprojected and in insertion order
pub fn related_items(store: &Store, model: &Model, field: &Field, item: &Record) -> Vec<Record> {
    let Some(related) = store.schema().model(&field.field_type) else {
        return Vec::new();
    };

    if let Some(linkage) = store.schema().linkage(model, field) {
        return match linkage.scope(item) {
            Some(scope) => filter_items(store, related, store.items(&related.name), Some(&scope)),
            None => Vec::new(),
        };
    }

    let Some(name) = field.relation_name.as_deref() else {
        return Vec::new();
    };
    let id = schema::record_id(model, item);
    let ids = store
        .relationships()
        .relationship_ids(name, &model.name, &id);
    if ids.is_empty() {
        return Vec::new();
    }
    store
        .items(&related.name)
        .into_iter()
        .filter(|r| {
            let rid = schema::record_id(related, r);
            ids.iter().any(|id| value::equals(&rid, id, None, false))
        })
        .collect()
}

/// Start the window at the first record matching the cursor.
/// With a negative `take` the window ends at the cursor instead.
fn apply_cursor(store: &Store, model: &Model, records: &mut Vec<Record>, cursor: &Filter, take: Option<i64>) {
    let position = records
        .iter()
        .position(|r| matcher::matches(store, model, r, cursor));
    match (position, take) {
        (Some(pos), Some(t)) if t < 0 => records.truncate(pos + 1),
        (Some(pos), _) => {
            records.drain(..pos);
        }
        (None, _) => records.clear(),
    }
}

/// `skip` then `take`. A negative `take` counts from the end of the window.
fn paginate(records: Vec<Record>, skip: Option<usize>, take: Option<i64>) -> Vec<Record> {
    let skip = skip.unwrap_or(0);
    match take {
        Some(t) if t < 0 => {
            let end = records.len().saturating_sub(skip);
            let start = end.saturating_sub(t.unsigned_abs() as usize);
            records.into_iter().skip(start).take(end - start).collect()
        }
        Some(t) => records.into_iter().skip(skip).take(t as usize).collect(),
        None => records.into_iter().skip(skip).collect(),
    }
}

/// Keep the first record for every combination of `fields`
fn distinct_by(records: Vec<Record>, fields: &[String]) -> Vec<Record> {
    if fields.is_empty() {
        return records;
    }
    let mut seen: Vec<Vec<Value>> = Vec::new();
    records
        .into_iter()
        .filter(|r| {
            let key: Vec<Value> = fields
                .iter()
                .map(|f| r.get(f).cloned().unwrap_or(Value::Null))
                .collect();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::blog_store;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn seed(store: &Store) {
        let users = store.delegate("User").unwrap();
        for (email, name, friends) in [
            ("a@test.com", "Alice", 2),
            ("b@test.com", "Bob", 1),
            ("c@test.com", "Cleo", 2),
            ("d@test.com", "Dan", 3),
        ] {
            users
                .create(json!({ "data": { "email": email, "name": name, "friends": friends } }))
                .unwrap();
        }
    }

    fn names(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r["name"].as_str().unwrap()).collect()
    }

    fn run(store: &Store, args: Value) -> Vec<Record> {
        store.delegate("User").unwrap().find_many(args).unwrap()
    }

    #[test]
    fn test_skip_and_take() {
        let store = blog_store();
        seed(&store);
        assert_eq!(names(&run(&store, json!({ "skip": 1, "take": 2 }))), vec!["Bob", "Cleo"]);
        assert_eq!(names(&run(&store, json!({ "take": -2 }))), vec!["Cleo", "Dan"]);
        assert_eq!(names(&run(&store, json!({ "skip": 1, "take": -2 }))), vec!["Bob", "Cleo"]);
        assert!(run(&store, json!({ "skip": 10 })).is_empty());
    }

    #[test]
    fn test_cursor() {
        let store = blog_store();
        seed(&store);
        let page = run(&store, json!({ "cursor": { "id": 2 }, "take": 2 }));
        assert_eq!(names(&page), vec!["Bob", "Cleo"]);
        let skipped = run(&store, json!({ "cursor": { "id": 2 }, "skip": 1, "take": 1 }));
        assert_eq!(names(&skipped), vec!["Cleo"]);
        let backwards = run(&store, json!({ "cursor": { "id": 3 }, "take": -2 }));
        assert_eq!(names(&backwards), vec!["Bob", "Cleo"]);
        assert!(run(&store, json!({ "cursor": { "id": 99 } })).is_empty());
    }

    #[test]
    fn test_distinct_keeps_first_in_order() {
        let store = blog_store();
        seed(&store);
        let rows = run(
            &store,
            json!({ "distinct": ["friends"], "orderBy": { "name": "desc" } }),
        );
        assert_eq!(names(&rows), vec!["Dan", "Cleo", "Bob"]);
    }

    #[test]
    fn test_results_are_copies() {
        let store = blog_store();
        seed(&store);
        let mut rows = run(&store, Value::Null);
        rows[0].insert("name".into(), json!("Mallory"));
        assert_eq!(names(&run(&store, Value::Null))[0], "Alice");
    }

    #[test]
    fn test_related_items_by_linkage_and_relationship() {
        let store = blog_store();
        seed(&store);
        let posts = store.delegate("Post").unwrap();
        posts.create(json!({ "data": { "title": "p1", "authorId": 1 } })).unwrap();
        posts.create(json!({ "data": { "title": "p2", "authorId": 2 } })).unwrap();
        store
            .relationships_mut()
            .connect("Follows", "User", "followers", &json!(1), &json!([3, 4]));

        let user = store.schema().model("User").unwrap();
        let alice = first_match(&store, user, Some(&json!({ "id": 1 }).as_object().unwrap().clone())).unwrap();

        let authored = related_items(&store, user, user.field("posts").unwrap(), &alice);
        assert_eq!(authored.len(), 1);
        assert_eq!(authored[0]["title"], json!("p1"));

        let followers = related_items(&store, user, user.field("followers").unwrap(), &alice);
        assert_eq!(names(&followers), vec!["Cleo", "Dan"]);
    }

    #[test]
    fn test_order_by_relation_count_and_relation_field() {
        let store = blog_store();
        seed(&store);
        let posts = store.delegate("Post").unwrap();
        for author in [2, 2, 3] {
            posts.create(json!({ "data": { "title": "t", "authorId": author } })).unwrap();
        }
        let rows = run(&store, json!({ "orderBy": [{ "posts": { "_count": "desc" } }, { "id": "asc" }] }));
        assert_eq!(names(&rows), vec!["Bob", "Cleo", "Alice", "Dan"]);

        let by_author = posts
            .find_many(json!({ "orderBy": { "author": { "name": "desc" } }, "select": { "authorId": true } }))
            .unwrap();
        let authors: Vec<Value> = by_author.iter().map(|r| r["authorId"].clone()).collect();
        assert_eq!(authors, vec![json!(3), json!(2), json!(2)]);
    }
}
