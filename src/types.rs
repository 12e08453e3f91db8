//! Core value-level types shared by the evaluators and the flattener.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::format::FormatRegistry;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Deep equality with numbers compared by value, so `1` equals `1.0`.
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map(|y| json_equal(x, y)).unwrap_or(false))
        }
        _ => a == b,
    }
}

/// Returns true for numbers with no fractional part.
pub fn is_integral(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.is_u64()
                || n.as_f64().map(|f| f.is_finite() && f.fract() == 0.0).unwrap_or(false)
        }
        _ => false,
    }
}

/// A primitive kind named by the `type` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Null,
    Boolean,
    Number,
    Integer,
    String,
    Array,
    Object,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Null => "null",
            SchemaType::Boolean => "boolean",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::String => "string",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
        }
    }

    /// Whether `value` is an instance of this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaType::Null => value.is_null(),
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Number => value.is_number(),
            SchemaType::Integer => is_integral(value),
            SchemaType::String => value.is_string(),
            SchemaType::Array => value.is_array(),
            SchemaType::Object => value.is_object(),
        }
    }

    /// The kind of a concrete value. Numbers always report `Number`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => SchemaType::Null,
            Value::Bool(_) => SchemaType::Boolean,
            Value::Number(_) => SchemaType::Number,
            Value::String(_) => SchemaType::String,
            Value::Array(_) => SchemaType::Array,
            Value::Object(_) => SchemaType::Object,
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `type` keyword: one kind or a list of kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSet {
    Single(SchemaType),
    Multiple(Vec<SchemaType>),
}

impl TypeSet {
    pub fn as_slice(&self) -> &[SchemaType] {
        match self {
            TypeSet::Single(t) => std::slice::from_ref(t),
            TypeSet::Multiple(ts) => ts,
        }
    }

    pub fn contains(&self, kind: SchemaType) -> bool {
        self.as_slice().contains(&kind)
    }

    pub fn matches(&self, value: &Value) -> bool {
        self.as_slice().iter().any(|t| t.matches(value))
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.as_slice().iter().map(SchemaType::as_str).collect();
        f.write_str(&names.join(" or "))
    }
}

/// Options for validation and diagnostics.
#[derive(Clone, Default)]
pub struct ValidationOptions {
    /// Format checks; caller overrides are consulted before built-ins.
    pub formats: FormatRegistry,
}

impl ValidationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a format check that takes precedence over the built-in one.
    pub fn format<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.formats = self.formats.with_override(name, check);
        self
    }
}

impl fmt::Debug for ValidationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationOptions")
            .field("formats", &self.formats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_equal_compares_numbers_by_value() {
        assert!(json_equal(&json!(1), &json!(1.0)));
        assert!(json_equal(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2]})));
        assert!(!json_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!json_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn integer_kind_accepts_integral_floats() {
        assert!(SchemaType::Integer.matches(&json!(3)));
        assert!(SchemaType::Integer.matches(&json!(3.0)));
        assert!(!SchemaType::Integer.matches(&json!(3.5)));
        assert!(!SchemaType::Integer.matches(&json!("3")));
    }

    #[test]
    fn type_set_parses_single_and_list() {
        let single: TypeSet = serde_json::from_value(json!("string")).unwrap();
        assert_eq!(single.as_slice(), &[SchemaType::String]);

        let multiple: TypeSet = serde_json::from_value(json!(["string", "null"])).unwrap();
        assert!(multiple.contains(SchemaType::Null));
        assert_eq!(multiple.to_string(), "string or null");
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        assert!(serde_json::from_value::<TypeSet>(json!("decimal")).is_err());
    }
}
