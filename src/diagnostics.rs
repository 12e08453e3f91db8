//! Path-addressed diagnostics.
//!
//! Diagnostics are only computed when the boolean check rejects the value;
//! an accepted value always yields an empty list.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::engine::{Evaluator, Path};
use crate::error::{RefError, ValidationError};
use crate::resolver::check_refs;
use crate::schema::{RootSchema, Schema};
use crate::types::ValidationOptions;

/// Every validation error for `value`, in rule order.
///
/// A type mismatch reports one `TYPE_MISMATCH` and skips the checks below
/// it; all other failures accumulate.
///
/// # Errors
///
/// Returns `RefError` if any `$ref` in `schema` or `root` cannot be
/// resolved, whatever `value` is.
pub fn validation_errors(
    value: &Value,
    schema: &Schema,
    root: Option<&RootSchema>,
) -> Result<Vec<ValidationError>, RefError> {
    validation_errors_with(value, schema, root, &ValidationOptions::default())
}

/// Like [`validation_errors`], with caller-supplied options.
pub fn validation_errors_with(
    value: &Value,
    schema: &Schema,
    root: Option<&RootSchema>,
    options: &ValidationOptions,
) -> Result<Vec<ValidationError>, RefError> {
    check_refs(schema, root)?;
    Evaluator::new(root, &options.formats).errors(value, schema, &Path::Root)
}

/// Errors at `target` or nested beneath it.
///
/// `target` is normalized first, so `user.tags.0`, `/user/tags/0` and
/// `$.user.tags[0]` all select `user.tags[0]`. An empty target selects
/// everything.
pub fn specific_validation_errors(
    value: &Value,
    schema: &Schema,
    root: Option<&RootSchema>,
    target: &str,
) -> Result<Vec<ValidationError>, RefError> {
    let target = normalize_path(target);
    let errors = validation_errors(value, schema, root)?;
    Ok(errors
        .into_iter()
        .filter(|e| is_within(&e.path, &target))
        .collect())
}

/// Group errors by path for field-level display.
pub fn errors_by_path(errors: &[ValidationError]) -> BTreeMap<&str, Vec<&ValidationError>> {
    let mut grouped: BTreeMap<&str, Vec<&ValidationError>> = BTreeMap::new();
    for error in errors {
        grouped.entry(error.path.as_str()).or_default().push(error);
    }
    grouped
}

/// Normalize a user-supplied path to the `a.b[0].c` form used in errors.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);

    let mut out = String::new();
    for segment in trimmed.split(['.', '/']).filter(|s| !s.is_empty()) {
        if segment.bytes().all(|b| b.is_ascii_digit()) {
            out.push('[');
            out.push_str(segment);
            out.push(']');
        } else {
            if !out.is_empty() && !segment.starts_with('[') {
                out.push('.');
            }
            out.push_str(segment);
        }
    }
    out
}

/// Whether `path` equals `target` or lies beneath it on a `.` or `[` boundary.
pub fn is_within(path: &str, target: &str) -> bool {
    if target.is_empty() {
        return true;
    }
    match path.strip_prefix(target) {
        Some("") => true,
        Some(rest) => rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}
