use crate::error::Result;
use super::types::SchemaDefinition;
use std::path::Path;

/// Parse a schema file (YAML or JSON) into a SchemaDefinition
pub fn parse_schema(path: &Path) -> Result<SchemaDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema string into a SchemaDefinition.
/// JSON documents are accepted too, since YAML is a superset.
pub fn parse_schema_str(content: &str) -> Result<SchemaDefinition> {
    let schema: SchemaDefinition = serde_yaml::from_str(content)?;
    Ok(schema)
}
