//! Flattening a nested schema into path-addressed field descriptors.
//!
//! Paths use `.` for object nesting, `[*]` for "every element of this
//! array" and `*` for properties matched by `patternProperties`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::RefError;
use crate::resolver::follow;
use crate::schema::{
    Bound, Conditional, Items, Pattern, RootSchema, Schema, SchemaMap, SchemaObject,
};
use crate::types::SchemaType;

/// The builder branch a field is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl From<SchemaType> for BaseType {
    fn from(kind: SchemaType) -> Self {
        match kind {
            SchemaType::String | SchemaType::Null => BaseType::String,
            SchemaType::Number | SchemaType::Integer => BaseType::Number,
            SchemaType::Boolean => BaseType::Boolean,
            SchemaType::Array => BaseType::Array,
            SchemaType::Object => BaseType::Object,
        }
    }
}

/// A flattened, path-addressed constraint descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDsl {
    pub path: String,
    pub base_type: BaseType,
    pub nullable: bool,
    /// Set when more than one non-null kind is declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_types: Option<Vec<SchemaType>>,
    pub constraints: Constraints,
}

/// Constraints carried by a [`FieldDsl`].
///
/// Exclusive bounds are normalized: the draft-04 boolean form moves
/// `minimum`/`maximum` into `exclusive_minimum`/`exclusive_maximum`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    /// Taken from the parent's `required` list.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub integer: bool,

    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unique_items: bool,
    /// Positional `items`, kept opaque.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuple_items: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_items: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<Schema>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_properties: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Schema>,
    /// Sibling property names `additional_properties` does not apply to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_properties: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_names: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_properties: Option<SchemaMap<Pattern>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependent_required: Option<BTreeMap<String, Vec<String>>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditional: Option<Conditional>,
}

impl Constraints {
    fn from_schema(obj: &SchemaObject, required: bool) -> Self {
        let (minimum, exclusive_minimum) = split_bounds(obj.number.lower_bounds(), f64::max);
        let (maximum, exclusive_maximum) = split_bounds(obj.number.upper_bounds(), f64::min);
        Constraints {
            required,
            const_value: obj.const_value.clone(),
            enum_values: obj.enum_values.clone(),
            min_length: obj.string.min_length,
            max_length: obj.string.max_length,
            pattern: obj.string.pattern.clone(),
            format: obj.string.format.clone(),
            content_encoding: obj.string.content_encoding.clone(),
            minimum,
            maximum,
            exclusive_minimum,
            exclusive_maximum,
            multiple_of: obj.number.multiple_of,
            min_items: obj.array.min_items,
            max_items: obj.array.max_items,
            unique_items: obj.array.unique_items == Some(true),
            tuple_items: match &obj.array.items {
                Some(Items::Tuple(schemas)) => Some(schemas.clone()),
                _ => None,
            },
            additional_items: obj.array.additional_items.clone(),
            contains: obj.array.contains.clone(),
            all_of: obj.composition.all_of.clone(),
            any_of: obj.composition.any_of.clone(),
            one_of: obj.composition.one_of.clone(),
            not: obj.composition.not.clone(),
            conditional: obj
                .conditional
                .if_schema
                .is_some()
                .then(|| obj.conditional.clone()),
            ..Constraints::object_level(obj)
        }
    }

    /// Object constraints that have no per-property home.
    fn object_level(obj: &SchemaObject) -> Self {
        Constraints {
            min_properties: obj.object.min_properties,
            max_properties: obj.object.max_properties,
            additional_properties: obj.object.additional_properties.clone(),
            declared_properties: obj
                .object
                .additional_properties
                .as_ref()
                .and(obj.object.properties.as_ref())
                .map(|props| props.iter().map(|(name, _)| name.clone()).collect()),
            property_names: obj.object.property_names.clone(),
            pattern_properties: obj.object.pattern_properties.clone(),
            dependent_required: obj.object.dependent_required.clone(),
            ..Constraints::default()
        }
    }

    /// The subset that applies to values of `kind`, for one branch of a
    /// multi-type field. `required` is left to the enclosing field.
    pub fn for_type(&self, kind: SchemaType) -> Constraints {
        let shared = Constraints {
            const_value: self.const_value.clone(),
            enum_values: self.enum_values.clone(),
            all_of: self.all_of.clone(),
            any_of: self.any_of.clone(),
            one_of: self.one_of.clone(),
            not: self.not.clone(),
            conditional: self.conditional.clone(),
            ..Constraints::default()
        };
        match kind {
            SchemaType::String => Constraints {
                min_length: self.min_length,
                max_length: self.max_length,
                pattern: self.pattern.clone(),
                format: self.format.clone(),
                content_encoding: self.content_encoding.clone(),
                ..shared
            },
            SchemaType::Number | SchemaType::Integer => Constraints {
                integer: kind == SchemaType::Integer,
                minimum: self.minimum,
                maximum: self.maximum,
                exclusive_minimum: self.exclusive_minimum,
                exclusive_maximum: self.exclusive_maximum,
                multiple_of: self.multiple_of,
                ..shared
            },
            SchemaType::Array => Constraints {
                min_items: self.min_items,
                max_items: self.max_items,
                unique_items: self.unique_items,
                tuple_items: self.tuple_items.clone(),
                additional_items: self.additional_items.clone(),
                contains: self.contains.clone(),
                ..shared
            },
            SchemaType::Object => Constraints {
                min_properties: self.min_properties,
                max_properties: self.max_properties,
                additional_properties: self.additional_properties.clone(),
                declared_properties: self.declared_properties.clone(),
                property_names: self.property_names.clone(),
                pattern_properties: self.pattern_properties.clone(),
                dependent_required: self.dependent_required.clone(),
                ..shared
            },
            SchemaType::Boolean | SchemaType::Null => shared,
        }
    }

    pub fn has_composition(&self) -> bool {
        self.all_of.is_some() || self.any_of.is_some() || self.one_of.is_some()
    }
}

/// Splits normalized bounds into the tightest inclusive and exclusive limits.
fn split_bounds(
    bounds: impl Iterator<Item = Bound>,
    tighter: fn(f64, f64) -> f64,
) -> (Option<f64>, Option<f64>) {
    let mut inclusive = None;
    let mut exclusive = None;
    for bound in bounds {
        let slot = if bound.exclusive { &mut exclusive } else { &mut inclusive };
        *slot = Some(match *slot {
            Some(current) => tighter(current, bound.limit),
            None => bound.limit,
        });
    }
    (inclusive, exclusive)
}

/// Flatten `root` into field descriptors in document order.
///
/// # Errors
///
/// Returns `RefError` when a `$ref` cannot be resolved, or when a reference
/// revisits itself along one property path (a recursive schema has no
/// finite flattening).
pub fn flatten(root: &RootSchema) -> Result<Vec<FieldDsl>, RefError> {
    let mut flattener = Flattener {
        root,
        fields: Vec::new(),
    };
    flattener.document(root.schema())?;
    tracing::debug!(fields = flattener.fields.len(), "flattened schema");
    Ok(flattener.fields)
}

struct Flattener<'a> {
    root: &'a RootSchema,
    fields: Vec<FieldDsl>,
}

impl<'a> Flattener<'a> {
    fn document(&mut self, schema: &'a Schema) -> Result<(), RefError> {
        let (node, visited) = follow(schema, self.root, &[])?;
        let Schema::Object(obj) = node else {
            return Ok(());
        };

        if !obj.composition.is_empty()
            || obj.conditional.if_schema.is_some()
            || has_value_level(obj)
        {
            self.fields.push(describe(String::new(), node, false));
        } else if has_object_level(obj) {
            self.fields.push(FieldDsl {
                path: String::new(),
                base_type: BaseType::Object,
                nullable: false,
                multiple_types: None,
                constraints: Constraints::object_level(obj),
            });
        }
        self.children("", obj, &visited)
    }

    fn field(
        &mut self,
        path: String,
        schema: &'a Schema,
        required: bool,
        visited: &[&'a str],
    ) -> Result<(), RefError> {
        let (node, visited) = follow(schema, self.root, visited)?;
        self.fields.push(describe(path.clone(), node, required));
        if let Schema::Object(obj) = node {
            self.children(&path, obj, &visited)?;
        }
        Ok(())
    }

    fn children(
        &mut self,
        prefix: &str,
        obj: &'a SchemaObject,
        visited: &[&'a str],
    ) -> Result<(), RefError> {
        if let Some(props) = &obj.object.properties {
            for (name, schema) in props.iter() {
                let required = obj.object.is_required(name);
                self.field(join(prefix, name), schema, required, visited)?;
            }
        }
        if let Some(patterns) = &obj.object.pattern_properties {
            for (_, schema) in patterns.iter() {
                self.field(join(prefix, "*"), schema, false, visited)?;
            }
        }
        if let Some(Items::Single(item)) = &obj.array.items {
            self.field(format!("{prefix}[*]"), item, false, visited)?;
        }
        Ok(())
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Constraints on the root value itself, beyond it being an object.
fn has_value_level(obj: &SchemaObject) -> bool {
    let non_object = obj
        .types
        .as_ref()
        .is_some_and(|types| types.as_slice() != [SchemaType::Object]);
    non_object
        || obj.const_value.is_some()
        || obj.enum_values.is_some()
        || !obj.string.is_empty()
        || !obj.number.is_empty()
        || !obj.array.is_empty()
}

fn has_object_level(obj: &SchemaObject) -> bool {
    let object = &obj.object;
    object.additional_properties.is_some()
        || object.property_names.is_some()
        || object.min_properties.is_some()
        || object.max_properties.is_some()
        || object.pattern_properties.is_some()
        || object.dependent_required.is_some()
}

fn describe(path: String, schema: &Schema, required: bool) -> FieldDsl {
    let obj = match schema {
        Schema::Object(obj) => obj,
        Schema::Bool(accept) => {
            return FieldDsl {
                path,
                base_type: BaseType::String,
                nullable: false,
                multiple_types: None,
                constraints: Constraints {
                    required,
                    not: (!accept).then_some(Schema::Bool(true)),
                    ..Constraints::default()
                },
            };
        }
    };

    let mut constraints = Constraints::from_schema(obj, required);
    let (base_type, nullable, multiple_types) = match &obj.types {
        Some(types) => {
            let kinds: Vec<SchemaType> = types
                .as_slice()
                .iter()
                .copied()
                .filter(|kind| *kind != SchemaType::Null)
                .collect();
            let nullable = types.contains(SchemaType::Null);
            match kinds.as_slice() {
                [] => (BaseType::String, nullable, None),
                [kind] => {
                    constraints.integer = *kind == SchemaType::Integer;
                    (BaseType::from(*kind), nullable, None)
                }
                [first, ..] => (BaseType::from(*first), nullable, Some(kinds.clone())),
            }
        }
        None => {
            let literal = obj
                .enum_values
                .as_ref()
                .and_then(|values| values.first())
                .or(obj.const_value.as_ref());
            let nullable = obj.const_value.as_ref().map_or(false, Value::is_null)
                || obj
                    .enum_values
                    .as_ref()
                    .map_or(false, |values| values.iter().any(Value::is_null));
            let base = literal
                .map(SchemaType::of)
                .map_or(BaseType::String, BaseType::from);
            (base, nullable, None)
        }
    };

    FieldDsl {
        path,
        base_type,
        nullable,
        multiple_types,
        constraints,
    }
}
