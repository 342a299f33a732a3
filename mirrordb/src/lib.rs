pub mod aggregate;
pub mod args;
pub mod error;
pub mod find;
pub mod matcher;
pub mod mutate;
pub mod relationships;
pub mod schema;
pub mod store;
pub mod util;

#[cfg(test)]
mod test_support;

/// A stored or projected record: field name -> JSON value, in field order
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use args::BatchPayload;
pub use error::{MirrorDbError, NotFoundCause, Result};
pub use schema::{Schema, SchemaDefinition};
pub use store::{Delegate, Properties, Store};
