//! Argument shapes accepted by delegate operations.
//!
//! Operations receive a `serde_json::Value` using the ORM's camelCase keys;
//! these structs are what it deserializes into.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Filter = Map<String, Value>;

/// Deserialize operation arguments; `null` means "no arguments".
pub fn parse<T: DeserializeOwned + Default>(args: Value) -> Result<T> {
    if args.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(args)?)
}

/// Arguments of the read pipeline (findMany, findFirst, count, nested includes)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindArgs {
    #[serde(rename = "where")]
    pub filter: Option<Filter>,
    pub order_by: Option<Value>,
    pub cursor: Option<Filter>,
    pub skip: Option<usize>,
    pub take: Option<i64>,
    pub distinct: Option<Value>,
    pub select: Option<Filter>,
    pub include: Option<Filter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateArgs {
    pub data: Filter,
    pub select: Option<Filter>,
    pub include: Option<Filter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateManyArgs {
    pub data: Value,
    pub skip_duplicates: bool,
    pub select: Option<Filter>,
    pub include: Option<Filter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateArgs {
    #[serde(rename = "where")]
    pub filter: Option<Filter>,
    pub data: Filter,
    pub select: Option<Filter>,
    pub include: Option<Filter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpsertArgs {
    #[serde(rename = "where")]
    pub filter: Option<Filter>,
    pub create: Filter,
    pub update: Filter,
    pub select: Option<Filter>,
    pub include: Option<Filter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeleteArgs {
    #[serde(rename = "where")]
    pub filter: Option<Filter>,
    pub select: Option<Filter>,
    pub include: Option<Filter>,
}

/// The `_count` / `_avg` / `_sum` / `_min` / `_max` part of aggregate and groupBy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AggregateSelection {
    #[serde(rename = "_count")]
    pub count: Option<Value>,
    #[serde(rename = "_avg")]
    pub avg: Option<Filter>,
    #[serde(rename = "_sum")]
    pub sum: Option<Filter>,
    #[serde(rename = "_min")]
    pub min: Option<Filter>,
    #[serde(rename = "_max")]
    pub max: Option<Filter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateArgs {
    #[serde(rename = "where")]
    pub filter: Option<Filter>,
    pub order_by: Option<Value>,
    pub cursor: Option<Filter>,
    pub skip: Option<usize>,
    pub take: Option<i64>,
    #[serde(flatten)]
    pub selection: AggregateSelection,
}

impl AggregateArgs {
    pub fn find_args(&self) -> FindArgs {
        FindArgs {
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            cursor: self.cursor.clone(),
            skip: self.skip,
            take: self.take,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupByArgs {
    pub by: Value,
    #[serde(rename = "where")]
    pub filter: Option<Filter>,
    pub having: Option<Filter>,
    pub order_by: Option<Value>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    #[serde(flatten)]
    pub selection: AggregateSelection,
}

/// Result of bulk writes that do not return records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchPayload {
    pub count: usize,
}
