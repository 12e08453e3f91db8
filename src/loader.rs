//! Loading schema and payload documents from files and strings.

use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;
use crate::schema::{RootSchema, Schema};

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_schema(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), bytes = content.len(), "loaded document");
    load_schema_str(&content)
}

/// Load a JSON document from a string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_schema_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Interpret a JSON value as a schema.
///
/// # Errors
///
/// Returns `LoadError::InvalidSchema` when a keyword has the wrong shape
/// or a `pattern` is not a valid regular expression.
pub fn parse_schema(value: &Value) -> Result<Schema, LoadError> {
    Schema::from_value(value).map_err(|source| LoadError::InvalidSchema { source })
}

/// Load and parse a top-level schema document from a file.
pub fn load_root(path: &Path) -> Result<RootSchema, LoadError> {
    let value = load_schema(path)?;
    parse_schema(&value).map(RootSchema::new)
}
