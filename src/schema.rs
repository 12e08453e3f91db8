//! Typed schema model.
//!
//! A schema document is parsed once into [`Schema`], with keywords grouped
//! by the kind of value they constrain. Regular expressions are compiled at
//! parse time, so an invalid `pattern` is a schema error rather than a
//! validation failure.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::OnceLock;

use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{RefError, ValidationError};
use crate::resolver::check_tree;
use crate::types::TypeSet;

/// A schema node: a literal boolean schema or a keyword object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schema {
    /// `true` accepts every value, `false` rejects every value.
    Bool(bool),
    Object(Box<SchemaObject>),
}

impl Schema {
    /// Parse a schema from a JSON value.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Schema::deserialize(value)
    }

    pub fn as_object(&self) -> Option<&SchemaObject> {
        match self {
            Schema::Object(obj) => Some(obj),
            Schema::Bool(_) => None,
        }
    }

    /// The `$ref` pointer on this node, if any.
    pub fn reference(&self) -> Option<&str> {
        self.as_object().and_then(|obj| obj.reference.as_deref())
    }
}

impl Default for Schema {
    fn default() -> Self {
        Schema::Bool(true)
    }
}

impl From<SchemaObject> for Schema {
    fn from(obj: SchemaObject) -> Self {
        Schema::Object(Box::new(obj))
    }
}

/// Keywords of a structured schema, grouped by family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaObject {
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub types: Option<TypeSet>,

    /// `Some(Value::Null)` is `"const": null`, distinct from an absent keyword.
    #[serde(
        rename = "const",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub const_value: Option<Value>,

    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(flatten)]
    pub string: StringKeywords,

    #[serde(flatten)]
    pub number: NumberKeywords,

    #[serde(flatten)]
    pub array: ArrayKeywords,

    #[serde(flatten)]
    pub object: ObjectKeywords,

    #[serde(flatten)]
    pub composition: Composition,

    #[serde(flatten)]
    pub conditional: Conditional,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub definitions: Option<SchemaMap>,

    #[serde(rename = "$defs", skip_serializing_if = "Option::is_none")]
    pub defs: Option<SchemaMap>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaObject {
    /// Every applicator sub-schema (not `definitions`), in keyword order.
    pub(crate) fn subschemas(&self) -> Vec<&Schema> {
        let object = &self.object;
        let array = &self.array;
        let composition = &self.composition;
        let conditional = &self.conditional;

        let mut out: Vec<&Schema> = Vec::new();
        out.extend(object.properties.iter().flat_map(|p| p.iter().map(|(_, s)| s)));
        out.extend(object.pattern_properties.iter().flat_map(|p| p.iter().map(|(_, s)| s)));
        match &array.items {
            Some(Items::Single(schema)) => out.push(schema),
            Some(Items::Tuple(schemas)) => out.extend(schemas),
            None => {}
        }
        out.extend(
            [&composition.all_of, &composition.any_of, &composition.one_of]
                .into_iter()
                .flatten()
                .flatten(),
        );
        out.extend(
            [
                &object.additional_properties,
                &object.property_names,
                &array.additional_items,
                &array.contains,
                &composition.not,
                &conditional.if_schema,
                &conditional.then_schema,
                &conditional.else_schema,
            ]
            .into_iter()
            .flatten(),
        );
        out
    }

    /// Visit every applicator sub-schema (not `definitions`) mutably.
    pub(crate) fn try_for_each_subschema_mut<E>(
        &mut self,
        mut f: impl FnMut(&mut Schema) -> Result<(), E>,
    ) -> Result<(), E> {
        let object = &mut self.object;
        if let Some(props) = object.properties.as_mut() {
            for (_, schema) in props.iter_mut() {
                f(schema)?;
            }
        }
        if let Some(patterns) = object.pattern_properties.as_mut() {
            for (_, schema) in patterns.iter_mut() {
                f(schema)?;
            }
        }
        let array = &mut self.array;
        match array.items.as_mut() {
            Some(Items::Single(schema)) => f(schema)?,
            Some(Items::Tuple(schemas)) => schemas.iter_mut().try_for_each(&mut f)?,
            None => {}
        }
        let composition = &mut self.composition;
        for list in [
            composition.all_of.as_mut(),
            composition.any_of.as_mut(),
            composition.one_of.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            list.iter_mut().try_for_each(&mut f)?;
        }
        let conditional = &mut self.conditional;
        for schema in [
            object.additional_properties.as_mut(),
            object.property_names.as_mut(),
            array.additional_items.as_mut(),
            array.contains.as_mut(),
            composition.not.as_mut(),
            conditional.if_schema.as_mut(),
            conditional.then_schema.as_mut(),
            conditional.else_schema.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            f(schema)?;
        }
        Ok(())
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StringKeywords {
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
}

impl StringKeywords {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// `exclusiveMinimum`/`exclusiveMaximum` in either draft form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExclusiveBound {
    /// Draft-04 form: makes the sibling `minimum`/`maximum` exclusive.
    Flag(bool),
    /// Draft-06+ form: an independent exclusive limit.
    Limit(f64),
}

/// A normalized numeric bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub limit: f64,
    pub exclusive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NumberKeywords {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<ExclusiveBound>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<ExclusiveBound>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
}

impl NumberKeywords {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Lower bounds with both exclusive forms normalized.
    pub fn lower_bounds(&self) -> impl Iterator<Item = Bound> {
        normalize(self.minimum, self.exclusive_minimum)
    }

    /// Upper bounds with both exclusive forms normalized.
    pub fn upper_bounds(&self) -> impl Iterator<Item = Bound> {
        normalize(self.maximum, self.exclusive_maximum)
    }
}

fn normalize(limit: Option<f64>, exclusive: Option<ExclusiveBound>) -> impl Iterator<Item = Bound> {
    let flagged = matches!(exclusive, Some(ExclusiveBound::Flag(true)));
    let inclusive = limit.map(|limit| Bound {
        limit,
        exclusive: flagged,
    });
    let independent = match exclusive {
        Some(ExclusiveBound::Limit(limit)) => Some(Bound {
            limit,
            exclusive: true,
        }),
        _ => None,
    };
    [inclusive, independent].into_iter().flatten()
}

/// The `items` keyword: one schema for every element, or a positional tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Items {
    Single(Schema),
    Tuple(Vec<Schema>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArrayKeywords {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Items>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_items: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<Schema>,
}

impl ArrayKeywords {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectKeywords {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_properties: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<SchemaMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_properties: Option<SchemaMap<Pattern>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_names: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependent_required: Option<BTreeMap<String, Vec<String>>>,
}

impl ObjectKeywords {
    pub fn is_required(&self, name: &str) -> bool {
        self.required
            .as_ref()
            .map_or(false, |names| names.iter().any(|n| n == name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Composition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<Schema>,
}

impl Composition {
    pub fn is_empty(&self) -> bool {
        self.all_of.is_none() && self.any_of.is_none() && self.one_of.is_none() && self.not.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conditional {
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_schema: Option<Schema>,
    #[serde(rename = "then", skip_serializing_if = "Option::is_none")]
    pub then_schema: Option<Schema>,
    #[serde(rename = "else", skip_serializing_if = "Option::is_none")]
    pub else_schema: Option<Schema>,
}

/// A compiled regular expression from the schema.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Pattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }
}

impl TryFrom<String> for Pattern {
    type Error = regex::Error;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Pattern::new(&source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named sub-schemas in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaMap<K = String>(Vec<(K, Schema)>);

impl<K> SchemaMap<K> {
    pub fn new(entries: Vec<(K, Schema)>) -> Self {
        SchemaMap(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Schema)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut Schema)> {
        self.0.iter_mut().map(|(k, v)| (&*k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl SchemaMap<String> {
    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl<K> Default for SchemaMap<K> {
    fn default() -> Self {
        SchemaMap(Vec::new())
    }
}

impl<K: Serialize> Serialize for SchemaMap<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de, K: Deserialize<'de>> Deserialize<'de> for SchemaMap<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<K>(PhantomData<K>);

        impl<'de, K: Deserialize<'de>> Visitor<'de> for EntriesVisitor<K> {
            type Value = SchemaMap<K>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of schemas")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, schema)) = map.next_entry::<K, Schema>()? {
                    entries.push((key, schema));
                }
                Ok(SchemaMap(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// The top-level schema document.
///
/// Its `definitions` and `$defs` tables are the only targets local `$ref`
/// pointers may resolve into via the `definitions`/`$defs` segments.
#[derive(Debug, Clone)]
pub struct RootSchema {
    schema: Schema,
    refs: OnceLock<Result<(), RefError>>,
}

impl RootSchema {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            refs: OnceLock::new(),
        }
    }

    /// Parse a root document from a JSON value.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Schema::from_value(value).map(Self::new)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Look up a named definition, `definitions` first, then `$defs`.
    pub fn definition(&self, name: &str) -> Option<&Schema> {
        let obj = self.schema.as_object()?;
        obj.definitions
            .as_ref()
            .and_then(|defs| defs.get(name))
            .or_else(|| obj.defs.as_ref().and_then(|defs| defs.get(name)))
    }

    /// Whether every `$ref` in the document, root definitions included,
    /// resolves to a concrete node. Computed once per root.
    pub(crate) fn checked_refs(&self) -> Result<(), RefError> {
        self.refs
            .get_or_init(|| {
                let definitions = self
                    .schema
                    .as_object()
                    .into_iter()
                    .flat_map(|obj| [&obj.definitions, &obj.defs])
                    .flatten()
                    .flat_map(|defs| defs.iter().map(|(_, s)| s));
                std::iter::once(&self.schema)
                    .chain(definitions)
                    .try_for_each(|schema| check_tree(schema, Some(self)))
            })
            .clone()
    }

    /// Boolean check of `value` against the whole document.
    pub fn is_valid(&self, value: &Value) -> Result<bool, RefError> {
        crate::validator::validate(value, &self.schema, Some(self))
    }

    /// Diagnostics for `value` against the whole document.
    pub fn errors(&self, value: &Value) -> Result<Vec<ValidationError>, RefError> {
        crate::diagnostics::validation_errors(value, &self.schema, Some(self))
    }
}

impl PartialEq for RootSchema {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
    }
}

impl From<Schema> for RootSchema {
    fn from(schema: Schema) -> Self {
        Self::new(schema)
    }
}
