//! Error types for schema loading, reference resolution and validation.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors while resolving local `$ref` pointers.
///
/// These signal a malformed schema rather than bad data and abort the
/// whole call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefError {
    #[error("unsupported reference \"{pointer}\": only local pointers starting with '#' are supported")]
    UnsupportedReference { pointer: String },

    #[error("unresolved reference \"{pointer}\": segment \"{segment}\" not found")]
    UnresolvedReference { pointer: String, segment: String },

    #[error("circular reference detected at \"{pointer}\"")]
    CircularReference { pointer: String },

    #[error("cannot resolve \"{pointer}\" without a root schema")]
    MissingRootSchema { pointer: String },
}

impl RefError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors while loading a schema or payload document.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid schema: {source}")]
    InvalidSchema {
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}

/// Machine-readable classification of a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TypeMismatch,
    FalseSchema,
    Const,
    Enum,
    MinLength,
    MaxLength,
    Pattern,
    Format,
    ContentEncoding,
    Minimum,
    Maximum,
    ExclusiveMinimum,
    ExclusiveMaximum,
    MultipleOf,
    MinItems,
    MaxItems,
    UniqueItems,
    AdditionalItems,
    Contains,
    MinProperties,
    MaxProperties,
    Required,
    AdditionalProperties,
    PropertyNames,
    DependentRequired,
    AllOf,
    AnyOf,
    OneOf,
    Not,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::FalseSchema => "FALSE_SCHEMA",
            ErrorCode::Const => "CONST",
            ErrorCode::Enum => "ENUM",
            ErrorCode::MinLength => "MIN_LENGTH",
            ErrorCode::MaxLength => "MAX_LENGTH",
            ErrorCode::Pattern => "PATTERN",
            ErrorCode::Format => "FORMAT",
            ErrorCode::ContentEncoding => "CONTENT_ENCODING",
            ErrorCode::Minimum => "MINIMUM",
            ErrorCode::Maximum => "MAXIMUM",
            ErrorCode::ExclusiveMinimum => "EXCLUSIVE_MINIMUM",
            ErrorCode::ExclusiveMaximum => "EXCLUSIVE_MAXIMUM",
            ErrorCode::MultipleOf => "MULTIPLE_OF",
            ErrorCode::MinItems => "MIN_ITEMS",
            ErrorCode::MaxItems => "MAX_ITEMS",
            ErrorCode::UniqueItems => "UNIQUE_ITEMS",
            ErrorCode::AdditionalItems => "ADDITIONAL_ITEMS",
            ErrorCode::Contains => "CONTAINS",
            ErrorCode::MinProperties => "MIN_PROPERTIES",
            ErrorCode::MaxProperties => "MAX_PROPERTIES",
            ErrorCode::Required => "REQUIRED",
            ErrorCode::AdditionalProperties => "ADDITIONAL_PROPERTIES",
            ErrorCode::PropertyNames => "PROPERTY_NAMES",
            ErrorCode::DependentRequired => "DEPENDENT_REQUIRED",
            ErrorCode::AllOf => "ALL_OF",
            ErrorCode::AnyOf => "ANY_OF",
            ErrorCode::OneOf => "ONE_OF",
            ErrorCode::Not => "NOT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single validation failure with path context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Dotted path to the offending value (`a.b`, `items[2].name`, `""` for the root).
    pub path: String,
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// The offending value, when there is one to show.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// The schema constraint that was violated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Value>,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code,
            message: message.into(),
            value: None,
            constraint: None,
        }
    }

    pub fn with_value(mut self, value: &Value) -> Self {
        self.value = Some(value.clone());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<Value>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}
