//! Schema Gate
//!
//! Interprets JSON-Schema-style documents against arbitrary JSON values.
//!
//! The library offers three views of one schema:
//!
//! - a boolean accept/reject check ([`validate`]),
//! - path-addressed diagnostics ([`validation_errors`]),
//! - flattened per-path field descriptors ([`flatten`]) that can be compiled
//!   into closures driving any [`SchemaBuilder`] ([`compile_schema`]).
//!
//! Both evaluators walk the same rule set, so a value is accepted exactly
//! when it produces no diagnostics.
//!
//! # Example
//!
//! ```
//! use schema_gate::{ErrorCode, RootSchema};
//! use serde_json::json;
//!
//! let root = RootSchema::from_value(&json!({
//!     "type": "object",
//!     "properties": { "name": { "type": "string", "minLength": 3 } },
//!     "required": ["name"]
//! }))
//! .unwrap();
//!
//! let value = json!({ "name": "Jo" });
//! assert!(!root.is_valid(&value).unwrap());
//!
//! let errors = root.errors(&value).unwrap();
//! assert_eq!(errors.len(), 1);
//! assert_eq!(errors[0].path, "name");
//! assert_eq!(errors[0].code, ErrorCode::MinLength);
//! ```
//!
//! # References
//!
//! Only local JSON pointers (`#`, `#/definitions/...`, `#/$defs/...`,
//! `#/properties/...`) are followed. Anything else is an
//! [`RefError::UnsupportedReference`]; reference errors abort the call
//! instead of being reported as data errors.
//!
//! Every `$ref` in the schema and in the root's definitions is checked
//! ([`check_refs`]) before any value is looked at, so a broken pointer fails
//! both evaluators identically even on a branch the value never reaches.
//! The check runs once per [`RootSchema`].
//!
//! # Error Paths
//!
//! | Location | Path |
//! |----------|------|
//! | document root | `""` |
//! | property `b` of `a` | `a.b` |
//! | third element of `items` | `items[2]` |
//! | element of a root array | `[0]` |

mod builder;
mod compile;
mod diagnostics;
mod engine;
mod error;
mod flatten;
mod format;
mod loader;
mod resolver;
mod schema;
mod types;
mod validator;

pub use builder::{BoundOptions, Predicate, Capability, SchemaBuilder};
pub use compile::{by_path, compile_field, compile_schema, CompiledField, Compiler};
pub use diagnostics::{
    errors_by_path, normalize_path, specific_validation_errors, validation_errors,
    validation_errors_with,
};
pub use error::{ErrorCode, LoadError, RefError, ValidationError};
pub use flatten::{flatten, BaseType, Constraints, FieldDsl};
pub use format::{FormatCheck, FormatRegistry};
pub use loader::{load_root, load_schema, load_schema_str, parse_schema};
pub use resolver::{check_refs, resolve_all_refs, resolve_ref, resolve_schema_ref};
pub use schema::{
    ArrayKeywords, Bound, Composition, Conditional, ExclusiveBound, Items, NumberKeywords,
    ObjectKeywords, Pattern, RootSchema, Schema, SchemaMap, SchemaObject, StringKeywords,
};
pub use types::{json_type_name, SchemaType, TypeSet, ValidationOptions};
pub use validator::{validate, validate_with};
