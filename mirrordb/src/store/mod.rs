use crate::aggregate;
use crate::args::{
    self, AggregateArgs, BatchPayload, CreateArgs, CreateManyArgs, DeleteArgs, FindArgs,
    GroupByArgs, UpdateArgs, UpsertArgs,
};
use crate::error::{MirrorDbError, NotFoundCause, Result};
use crate::find;
use crate::mutate;
use crate::relationships::RelationshipStore;
use crate::schema::{parse_schema, parse_schema_str, DefaultKind, Model, Schema, SchemaDefinition};
use crate::util;
use crate::Record;
use serde::Serialize;
use serde_json::Value;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

type ChangeListener = Box<dyn Fn(&str, &[Record])>;

/// Autoincrement counters of one model: field name -> next value to assign.
/// Counters only move forward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Properties {
    pub increment: BTreeMap<String, i64>,
}

impl Properties {
    fn for_model(model: &Model) -> Self {
        let increment = model
            .scalar_fields()
            .filter(|f| {
                f.default
                    .as_ref()
                    .is_some_and(|d| d.kind() == DefaultKind::Autoincrement)
            })
            .map(|f| (f.name.clone(), 1))
            .collect();
        Properties { increment }
    }
}

/// The in-memory store.
/// Owns the canonical per-model collections, the autoincrement counters
/// and the relationship store; delegates are views over it.
pub struct Store {
    schema: Schema,
    data: RefCell<HashMap<String, Vec<Record>>>,
    properties: RefCell<HashMap<String, Properties>>,
    relationships: RefCell<RelationshipStore>,
    listeners: RefCell<Vec<ChangeListener>>,
}

impl Store {
    /// Build an empty store for a schema definition
    pub fn new(definition: SchemaDefinition) -> Result<Self> {
        let schema = Schema::new(definition)?;
        let relationships = RelationshipStore::new(schema.models());
        let data = schema
            .models()
            .iter()
            .map(|m| (m.name.clone(), Vec::new()))
            .collect();
        let properties = schema
            .models()
            .iter()
            .map(|m| (m.name.clone(), Properties::for_model(m)))
            .collect();

        Ok(Store {
            schema,
            data: RefCell::new(data),
            properties: RefCell::new(properties),
            relationships: RefCell::new(relationships),
            listeners: RefCell::new(Vec::new()),
        })
    }

    /// Open a store from a schema file (YAML or JSON)
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MirrorDbError::Schema(format!(
                "Schema file not found: {}",
                path.display()
            )));
        }
        Self::new(parse_schema(path)?)
    }

    /// Open a store from a schema document held in memory
    pub fn from_schema_str(content: &str) -> Result<Self> {
        Self::new(parse_schema_str(content)?)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Get the delegate (operation surface) of a model
    pub fn delegate(&self, name: &str) -> Result<Delegate<'_>> {
        let model = self.schema.model_or_err(name)?;
        Ok(Delegate { store: self, model })
    }

    /// Empty every collection and every relationship.
    /// Counters survive unless `options.reset_counters` is set.
    pub fn reset(&self) {
        let names: Vec<String> = self.data.borrow().keys().cloned().collect();
        for name in names {
            self.replace_collection(&name, Vec::new());
        }
        self.relationships.borrow_mut().reset_values();

        if self.schema.options().reset_counters {
            let mut properties = self.properties.borrow_mut();
            for model in self.schema.models() {
                properties.insert(model.name.clone(), Properties::for_model(model));
            }
        }
    }

    /// Deep copy of every collection, keyed by model name
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Record>> {
        self.data
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Run a group of operations against this store.
    /// There is no isolation and no rollback: writes made before a failure stay applied.
    pub fn transaction<T>(&self, f: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        f(self)
    }

    /// Register a callback invoked with the full collection after every write to it.
    /// Callbacks must not write to the store.
    pub fn on_change(&self, listener: impl Fn(&str, &[Record]) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    // ── Collection access (single writer path) ──────────────────────

    /// Deep copy of a model's collection in insertion order
    pub(crate) fn items(&self, model: &str) -> Vec<Record> {
        self.data.borrow().get(model).cloned().unwrap_or_default()
    }

    /// Replace a model's whole collection
    pub(crate) fn replace_collection(&self, model: &str, items: Vec<Record>) {
        self.data.borrow_mut().insert(model.to_string(), items);
        self.notify(model);
    }

    pub(crate) fn append_item(&self, model: &str, item: Record) {
        self.data
            .borrow_mut()
            .entry(model.to_string())
            .or_default()
            .push(item);
        self.notify(model);
    }

    /// Swap the first record equal to `current` for `next`. Returns false if it is gone.
    pub(crate) fn replace_item(&self, model: &str, current: &Record, next: Record) -> bool {
        let replaced = {
            let mut data = self.data.borrow_mut();
            let items = data.entry(model.to_string()).or_default();
            match items.iter().position(|i| i == current) {
                Some(pos) => {
                    items[pos] = next;
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.notify(model);
        }
        replaced
    }

    /// Take the next autoincrement value of `model.field`
    pub(crate) fn next_increment(&self, model: &str, field: &str) -> i64 {
        let mut properties = self.properties.borrow_mut();
        let counter = properties
            .entry(model.to_string())
            .or_default()
            .increment
            .entry(field.to_string())
            .or_insert(1);
        let next = *counter;
        *counter += 1;
        next
    }

    pub(crate) fn properties(&self, model: &str) -> Properties {
        self.properties
            .borrow()
            .get(model)
            .cloned()
            .unwrap_or_default()
    }

    /// Move counters past the largest value present in the collection
    fn advance_counters(&self, model: &str) {
        let data = self.data.borrow();
        let Some(items) = data.get(model) else {
            return;
        };
        let mut properties = self.properties.borrow_mut();
        let Some(props) = properties.get_mut(model) else {
            return;
        };
        for (field, counter) in props.increment.iter_mut() {
            let max = items
                .iter()
                .filter_map(|i| i.get(field).and_then(Value::as_i64))
                .max();
            if let Some(max) = max {
                *counter = (*counter).max(max + 1);
            }
        }
    }

    pub(crate) fn relationships(&self) -> Ref<'_, RelationshipStore> {
        self.relationships.borrow()
    }

    pub(crate) fn relationships_mut(&self) -> RefMut<'_, RelationshipStore> {
        self.relationships.borrow_mut()
    }

    fn notify(&self, model: &str) {
        let listeners = self.listeners.borrow();
        if listeners.is_empty() {
            return;
        }
        let data = self.data.borrow();
        let items = data.get(model).map(Vec::as_slice).unwrap_or_default();
        for listener in listeners.iter() {
            listener(model, items);
        }
    }
}

/// The operation surface of one model.
/// A cheap view over the store: all state lives in the `Store`.
#[derive(Clone, Copy)]
pub struct Delegate<'a> {
    store: &'a Store,
    model: &'a Model,
}

impl<'a> Delegate<'a> {
    pub fn name(&self) -> &'a str {
        &self.model.name
    }

    pub fn model(&self) -> &'a Model {
        self.model
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn find_many(&self, args: Value) -> Result<Vec<Record>> {
        let args: FindArgs = args::parse(args)?;
        log::debug!("{}.findMany", self.model.name);
        find::find_many(self.store, self.model, &args)
    }

    pub fn find_first(&self, args: Value) -> Result<Option<Record>> {
        let mut args: FindArgs = args::parse(args)?;
        log::debug!("{}.findFirst", self.model.name);
        if args.take.is_none() {
            args.take = Some(1);
        }
        Ok(find::find_many(self.store, self.model, &args)?.into_iter().next())
    }

    /// Same pipeline as `find_first`: the first match wins, no cardinality check.
    pub fn find_unique(&self, args: Value) -> Result<Option<Record>> {
        self.find_first(args)
    }

    pub fn find_first_or_throw(&self, args: Value) -> Result<Record> {
        self.find_first(args)?.ok_or_else(|| {
            MirrorDbError::not_found(&self.model.name, NotFoundCause::FindTargetMissing)
        })
    }

    pub fn find_unique_or_throw(&self, args: Value) -> Result<Record> {
        self.find_first_or_throw(args)
    }

    pub fn count(&self, args: Value) -> Result<usize> {
        let mut args: FindArgs = args::parse(args)?;
        log::debug!("{}.count", self.model.name);
        args.select = None;
        args.include = None;
        Ok(find::find_many(self.store, self.model, &args)?.len())
    }

    pub fn aggregate(&self, args: Value) -> Result<Record> {
        let args: AggregateArgs = args::parse(args)?;
        log::debug!("{}.aggregate", self.model.name);
        aggregate::aggregate(self.store, self.model, &args)
    }

    pub fn group_by(&self, args: Value) -> Result<Vec<Record>> {
        let args: GroupByArgs = args::parse(args)?;
        log::debug!("{}.groupBy", self.model.name);
        aggregate::group_by(self.store, self.model, &args)
    }

    // ── Writes ──────────────────────────────────────────────────────

    pub fn create(&self, args: Value) -> Result<Record> {
        let args: CreateArgs = args::parse(args)?;
        log::debug!("{}.create", self.model.name);
        find::check_projection(args.select.as_ref(), args.include.as_ref())?;
        let record = mutate::create::create_record(self.store, self.model, &args.data)?;
        find::project(
            self.store,
            self.model,
            &record,
            args.select.as_ref(),
            args.include.as_ref(),
        )
    }

    pub fn create_many(&self, args: Value) -> Result<BatchPayload> {
        let args: CreateManyArgs = args::parse(args)?;
        log::debug!("{}.createMany", self.model.name);
        let created = self.insert_many(&args)?;
        Ok(BatchPayload {
            count: created.len(),
        })
    }

    pub fn create_many_and_return(&self, args: Value) -> Result<Vec<Record>> {
        let args: CreateManyArgs = args::parse(args)?;
        log::debug!("{}.createManyAndReturn", self.model.name);
        find::check_projection(args.select.as_ref(), args.include.as_ref())?;
        self.insert_many(&args)?
            .iter()
            .map(|r| self.project(r, args.select.as_ref(), args.include.as_ref()))
            .collect()
    }

    pub fn update(&self, args: Value) -> Result<Record> {
        let args: UpdateArgs = args::parse(args)?;
        log::debug!("{}.update", self.model.name);
        find::check_projection(args.select.as_ref(), args.include.as_ref())?;
        let target = find::first_match(self.store, self.model, args.filter.as_ref())
            .ok_or_else(|| {
                MirrorDbError::not_found(&self.model.name, NotFoundCause::UpdateTargetMissing)
            })?;
        let updated = mutate::update::update_record(self.store, self.model, &target, &args.data)?;
        self.project(&updated, args.select.as_ref(), args.include.as_ref())
    }

    pub fn update_many(&self, args: Value) -> Result<BatchPayload> {
        let args: UpdateArgs = args::parse(args)?;
        log::debug!("{}.updateMany", self.model.name);
        let updated =
            mutate::update::update_records(self.store, self.model, args.filter.as_ref(), &args.data)?;
        Ok(BatchPayload {
            count: updated.len(),
        })
    }

    pub fn update_many_and_return(&self, args: Value) -> Result<Vec<Record>> {
        let args: UpdateArgs = args::parse(args)?;
        log::debug!("{}.updateManyAndReturn", self.model.name);
        find::check_projection(args.select.as_ref(), args.include.as_ref())?;
        mutate::update::update_records(self.store, self.model, args.filter.as_ref(), &args.data)?
            .iter()
            .map(|r| self.project(r, args.select.as_ref(), args.include.as_ref()))
            .collect()
    }

    pub fn upsert(&self, args: Value) -> Result<Record> {
        let args: UpsertArgs = args::parse(args)?;
        log::debug!("{}.upsert", self.model.name);
        find::check_projection(args.select.as_ref(), args.include.as_ref())?;
        let record = match find::first_match(self.store, self.model, args.filter.as_ref()) {
            Some(target) => {
                mutate::update::update_record(self.store, self.model, &target, &args.update)?
            }
            None => mutate::create::create_record(self.store, self.model, &args.create)?,
        };
        self.project(&record, args.select.as_ref(), args.include.as_ref())
    }

    pub fn delete(&self, args: Value) -> Result<Record> {
        let args: DeleteArgs = args::parse(args)?;
        log::debug!("{}.delete", self.model.name);
        find::check_projection(args.select.as_ref(), args.include.as_ref())?;
        let target = find::first_match(self.store, self.model, args.filter.as_ref())
            .ok_or_else(|| {
                MirrorDbError::not_found(&self.model.name, NotFoundCause::DeleteTargetMissing)
            })?;
        // Relations are resolved before the record and its links disappear
        let projected = self.project(&target, args.select.as_ref(), args.include.as_ref())?;
        mutate::delete::delete_record(self.store, self.model, &target)?;
        Ok(projected)
    }

    pub fn delete_many(&self, args: Value) -> Result<BatchPayload> {
        let args: DeleteArgs = args::parse(args)?;
        log::debug!("{}.deleteMany", self.model.name);
        let deleted = mutate::delete::delete_records(self.store, self.model, args.filter.as_ref())?;
        Ok(BatchPayload {
            count: deleted.len(),
        })
    }

    // ── Bulk access ─────────────────────────────────────────────────

    /// Deep copy of the whole collection
    pub fn get_items(&self) -> Vec<Record> {
        self.store.items(&self.model.name)
    }

    /// Replace the whole collection (seeding, snapshot restore).
    /// Autoincrement counters move past the largest seeded value.
    pub fn set_items(&self, items: Vec<Record>) {
        self.store.replace_collection(&self.model.name, items);
        self.store.advance_counters(&self.model.name);
    }

    pub fn get_properties(&self) -> Properties {
        self.store.properties(&self.model.name)
    }

    fn project(
        &self,
        record: &Record,
        select: Option<&args::Filter>,
        include: Option<&args::Filter>,
    ) -> Result<Record> {
        find::project(self.store, self.model, record, select, include)
    }

    fn insert_many(&self, args: &CreateManyArgs) -> Result<Vec<Record>> {
        let mut created = Vec::new();
        for data in util::as_objects(&args.data) {
            match mutate::create::create_record(self.store, self.model, data) {
                Ok(record) => created.push(record),
                Err(MirrorDbError::UniqueConstraint { fields, .. }) if args.skip_duplicates => {
                    log::debug!(
                        "{}.createMany skipped duplicate on ({})",
                        self.model.name,
                        fields.join(", ")
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }
}
