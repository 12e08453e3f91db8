//! Boolean accept/reject checks.

use serde_json::Value;

use crate::engine::Evaluator;
use crate::error::RefError;
use crate::resolver::check_refs;
use crate::schema::{RootSchema, Schema};
use crate::types::ValidationOptions;

/// Check `value` against `schema` with the built-in format checks.
///
/// `root` is the document local `$ref` pointers resolve against; it may be
/// `None` for schemas without references.
///
/// # Errors
///
/// Returns `RefError` if any `$ref` in `schema` or `root` cannot be
/// resolved, whatever `value` is. Data that fails the schema is `Ok(false)`, never an error.
pub fn validate(value: &Value, schema: &Schema, root: Option<&RootSchema>) -> Result<bool, RefError> {
    validate_with(value, schema, root, &ValidationOptions::default())
}

/// Like [`validate`], with caller-supplied options.
pub fn validate_with(
    value: &Value,
    schema: &Schema,
    root: Option<&RootSchema>,
    options: &ValidationOptions,
) -> Result<bool, RefError> {
    check_refs(schema, root)?;
    Evaluator::new(root, &options.formats).is_valid(value, schema)
}
