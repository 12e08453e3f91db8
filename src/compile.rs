//! Compiling flattened fields into builder closures.
//!
//! Each [`FieldDsl`] becomes a closure that takes a fresh builder and
//! returns it configured: base type first, then `nullable`, then each
//! constraint, then `required`. Capabilities the builder lacks are skipped
//! after trying their aliases; constraints with no dedicated capability
//! fall back to a `custom` (or `refine`) predicate that runs the boolean
//! evaluator against just that keyword.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::builder::{BoundOptions, Predicate, Capability, SchemaBuilder};
use crate::error::RefError;
use crate::flatten::{flatten, BaseType, Constraints, FieldDsl};
use crate::schema::{
    ArrayKeywords, Composition, Items, ObjectKeywords, RootSchema, Schema, SchemaMap, SchemaObject,
    StringKeywords,
};
use crate::types::{SchemaType, TypeSet, ValidationOptions};
use crate::validator::validate_with;

/// A compiled field: configures a builder for one path.
pub type CompiledField<B> = Box<dyn Fn(B) -> B + Send + Sync>;

/// Compile `field` with the built-in format checks.
///
/// `root` is needed when the field's constraints contain `$ref`s that the
/// fallback predicates must resolve.
pub fn compile_field<B>(field: &FieldDsl, root: Option<Arc<RootSchema>>) -> CompiledField<B>
where
    B: SchemaBuilder + 'static,
{
    Compiler::new(root).compile(field)
}

/// Flatten `root` and compile every field, keyed by path in document order.
///
/// # Errors
///
/// Returns `RefError` when flattening fails.
pub fn compile_schema<B>(root: Arc<RootSchema>) -> Result<Vec<(String, CompiledField<B>)>, RefError>
where
    B: SchemaBuilder + 'static,
{
    let compiler = Compiler::new(Some(Arc::clone(&root)));
    let fields = flatten(&root)?;
    Ok(fields
        .iter()
        .map(|field| (field.path.clone(), compiler.compile(field)))
        .collect())
}

/// Compiles fields against a shared root and option set.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    root: Option<Arc<RootSchema>>,
    options: Arc<ValidationOptions>,
}

impl Compiler {
    pub fn new(root: Option<Arc<RootSchema>>) -> Self {
        Compiler {
            root,
            options: Arc::default(),
        }
    }

    /// Use `options` in fallback predicates (for example, format overrides).
    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn compile<B>(&self, field: &FieldDsl) -> CompiledField<B>
    where
        B: SchemaBuilder + 'static,
    {
        let compiler = self.clone();
        let field = field.clone();
        Box::new(move |builder: B| compiler.apply(builder, &field))
    }

    fn apply<B: SchemaBuilder>(&self, builder: B, field: &FieldDsl) -> B {
        let nullable = field.nullable;
        let mut builder = match &field.multiple_types {
            Some(kinds) => self.branches(builder, kinds, &field.constraints, nullable),
            None => {
                let builder = select_base(builder, field.base_type);
                let builder = if nullable {
                    attempt(builder, "nullable", B::nullable)
                } else {
                    builder
                };
                self.constrain(builder, &field.constraints, nullable)
            }
        };
        if field.constraints.required {
            builder = attempt(builder, "required", B::required);
        }
        builder
    }

    fn branches<B: SchemaBuilder>(
        &self,
        builder: B,
        kinds: &[SchemaType],
        constraints: &Constraints,
        nullable: bool,
    ) -> B {
        let branches: Vec<B> = kinds
            .iter()
            .map(|kind| {
                let branch = select_base(builder.clone(), BaseType::from(*kind));
                self.constrain(branch, &constraints.for_type(*kind), nullable)
            })
            .collect();
        let builder = attempt(builder, "one_of", |b| b.one_of(branches));
        if nullable {
            attempt(builder, "nullable", B::nullable)
        } else {
            builder
        }
    }

    fn constrain<B: SchemaBuilder>(&self, mut b: B, c: &Constraints, nullable: bool) -> B {
        let keyword = |obj: SchemaObject| self.predicate(obj, nullable);

        if let Some(value) = &c.const_value {
            let check = keyword(SchemaObject {
                const_value: Some(value.clone()),
                ..SchemaObject::default()
            });
            b = attempt(b, "literal", |b| b.literal(value).or_else(|b| custom(b, check)));
        }
        if let Some(values) = &c.enum_values {
            let check = keyword(SchemaObject {
                enum_values: Some(values.clone()),
                ..SchemaObject::default()
            });
            b = attempt(b, "custom", |b| custom(b, check));
        }
        if c.integer {
            let check = keyword(SchemaObject {
                types: Some(TypeSet::Single(SchemaType::Integer)),
                ..SchemaObject::default()
            });
            b = attempt(b, "integer", |b| b.integer().or_else(|b| custom(b, check)));
        }

        b = self.string_constraints(b, c, nullable);
        b = number_constraints(b, c, &keyword);
        b = self.array_constraints(b, c, nullable);
        b = self.object_constraints(b, c, nullable);

        if c.has_composition() {
            let check = keyword(SchemaObject {
                composition: Composition {
                    all_of: c.all_of.clone(),
                    any_of: c.any_of.clone(),
                    one_of: c.one_of.clone(),
                    not: None,
                },
                ..SchemaObject::default()
            });
            b = attempt(b, "custom", |b| custom(b, check));
        }
        if c.not.is_some() || c.conditional.is_some() {
            let check = keyword(SchemaObject {
                composition: Composition {
                    not: c.not.clone(),
                    ..Composition::default()
                },
                conditional: c.conditional.clone().unwrap_or_default(),
                ..SchemaObject::default()
            });
            b = attempt(b, "custom", |b| custom(b, check));
        }
        b
    }

    fn string_constraints<B: SchemaBuilder>(&self, mut b: B, c: &Constraints, nullable: bool) -> B {
        let inclusive = BoundOptions::default();
        if let Some(n) = c.min_length {
            b = attempt(b, "min", |b| b.min(n as f64, inclusive));
        }
        if let Some(n) = c.max_length {
            b = attempt(b, "max", |b| b.max(n as f64, inclusive));
        }
        if let Some(pattern) = &c.pattern {
            let check = self.predicate(
                SchemaObject {
                    string: StringKeywords {
                        pattern: Some(pattern.clone()),
                        ..StringKeywords::default()
                    },
                    ..SchemaObject::default()
                },
                nullable,
            );
            b = attempt(b, "pattern", |b| b.pattern(pattern).or_else(|b| custom(b, check)));
        }
        if let Some(format) = &c.format {
            let check = self.predicate(
                SchemaObject {
                    string: StringKeywords {
                        format: Some(format.clone()),
                        ..StringKeywords::default()
                    },
                    ..SchemaObject::default()
                },
                nullable,
            );
            let dedicated: Option<fn(B) -> Capability<B>> = match format.as_str() {
                "email" => Some(B::email),
                "uri" | "url" => Some(B::url),
                "uuid" => Some(B::uuid),
                "date-time" => Some(B::datetime),
                "date" => Some(B::date),
                _ => None,
            };
            b = attempt(b, "format", |b| match dedicated {
                Some(capability) => capability(b).or_else(|b| custom(b, check)),
                None => custom(b, check),
            });
        }
        if let Some(encoding) = &c.content_encoding {
            let check = self.predicate(
                SchemaObject {
                    string: StringKeywords {
                        content_encoding: Some(encoding.clone()),
                        ..StringKeywords::default()
                    },
                    ..SchemaObject::default()
                },
                nullable,
            );
            b = attempt(b, "custom", |b| custom(b, check));
        }
        b
    }

    fn array_constraints<B: SchemaBuilder>(&self, mut b: B, c: &Constraints, nullable: bool) -> B {
        let inclusive = BoundOptions::default();
        if let Some(n) = c.min_items {
            b = attempt(b, "min_items", |b| {
                b.min_items(n).or_else(|b| b.min(n as f64, inclusive))
            });
        }
        if let Some(n) = c.max_items {
            b = attempt(b, "max_items", |b| {
                b.max_items(n).or_else(|b| b.max(n as f64, inclusive))
            });
        }
        if c.unique_items {
            let check = self.predicate(
                SchemaObject {
                    array: ArrayKeywords {
                        unique_items: Some(true),
                        ..ArrayKeywords::default()
                    },
                    ..SchemaObject::default()
                },
                nullable,
            );
            b = attempt(b, "unique", |b| b.unique().or_else(|b| custom(b, check)));
        }
        if c.tuple_items.is_some() || c.contains.is_some() {
            let check = self.predicate(
                SchemaObject {
                    array: ArrayKeywords {
                        items: c.tuple_items.clone().map(Items::Tuple),
                        additional_items: c.additional_items.clone(),
                        contains: c.contains.clone(),
                        ..ArrayKeywords::default()
                    },
                    ..SchemaObject::default()
                },
                nullable,
            );
            b = attempt(b, "custom", |b| custom(b, check));
        }
        b
    }

    fn object_constraints<B: SchemaBuilder>(&self, mut b: B, c: &Constraints, nullable: bool) -> B {
        let object = |keywords: ObjectKeywords| {
            self.predicate(
                SchemaObject {
                    object: keywords,
                    ..SchemaObject::default()
                },
                nullable,
            )
        };

        if let Some(n) = c.min_properties {
            let check = object(ObjectKeywords {
                min_properties: Some(n),
                ..ObjectKeywords::default()
            });
            b = attempt(b, "min_properties", |b| {
                b.min_properties(n).or_else(|b| custom(b, check))
            });
        }
        if let Some(n) = c.max_properties {
            let check = object(ObjectKeywords {
                max_properties: Some(n),
                ..ObjectKeywords::default()
            });
            b = attempt(b, "max_properties", |b| {
                b.max_properties(n).or_else(|b| custom(b, check))
            });
        }
        if let Some(schema) = &c.additional_properties {
            let declared: Vec<(String, Schema)> = c
                .declared_properties
                .iter()
                .flatten()
                .map(|name| (name.clone(), Schema::Bool(true)))
                .collect();
            let check = object(ObjectKeywords {
                properties: Some(SchemaMap::new(declared)),
                pattern_properties: c.pattern_properties.clone(),
                additional_properties: Some(schema.clone()),
                ..ObjectKeywords::default()
            });
            b = attempt(b, "additional_properties", |b| {
                b.additional_properties(schema)
                    .or_else(|b| custom(b, check))
            });
        }
        if let Some(schema) = &c.property_names {
            let check = object(ObjectKeywords {
                property_names: Some(schema.clone()),
                ..ObjectKeywords::default()
            });
            b = attempt(b, "property_names", |b| {
                b.property_names(schema).or_else(|b| custom(b, check))
            });
        }
        if c.pattern_properties.is_some() || c.dependent_required.is_some() {
            let check = object(ObjectKeywords {
                pattern_properties: c.pattern_properties.clone(),
                dependent_required: c.dependent_required.clone(),
                ..ObjectKeywords::default()
            });
            b = attempt(b, "custom", |b| custom(b, check));
        }
        b
    }

    /// A predicate accepting what `obj` accepts, plus `null` on nullable fields.
    fn predicate(&self, obj: SchemaObject, nullable: bool) -> Predicate {
        let schema = Schema::from(obj);
        let root = self.root.clone();
        let options = Arc::clone(&self.options);
        Arc::new(move |value: &Value| {
            if nullable && value.is_null() {
                return true;
            }
            match validate_with(value, &schema, root.as_deref(), &options) {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(%err, "compiled predicate rejected value on schema error");
                    false
                }
            }
        })
    }
}

fn number_constraints<B: SchemaBuilder>(
    mut b: B,
    c: &Constraints,
    keyword: &impl Fn(SchemaObject) -> Predicate,
) -> B {
    let inclusive = BoundOptions::default();
    let exclusive = BoundOptions { exclusive: true };
    if let Some(limit) = c.minimum {
        b = attempt(b, "min", |b| b.min(limit, inclusive));
    }
    if let Some(limit) = c.exclusive_minimum {
        b = attempt(b, "min", |b| b.min(limit, exclusive));
    }
    if let Some(limit) = c.maximum {
        b = attempt(b, "max", |b| b.max(limit, inclusive));
    }
    if let Some(limit) = c.exclusive_maximum {
        b = attempt(b, "max", |b| b.max(limit, exclusive));
    }
    if let Some(divisor) = c.multiple_of {
        let mut obj = SchemaObject::default();
        obj.number.multiple_of = Some(divisor);
        let check = keyword(obj);
        b = attempt(b, "multiple_of", |b| {
            b.multiple_of(divisor).or_else(|b| custom(b, check))
        });
    }
    b
}

fn select_base<B: SchemaBuilder>(builder: B, base: BaseType) -> B {
    match base {
        BaseType::String => attempt(builder, "string", B::string),
        BaseType::Number => attempt(builder, "number", B::number),
        BaseType::Boolean => attempt(builder, "boolean", B::boolean),
        BaseType::Array => attempt(builder, "array", B::array),
        BaseType::Object => attempt(builder, "object", B::object),
    }
}

/// `custom`, falling back to `refine`.
fn custom<B: SchemaBuilder>(builder: B, predicate: Predicate) -> Capability<B> {
    builder
        .custom(Arc::clone(&predicate))
        .or_else(|b| b.refine(predicate))
}

fn attempt<B>(builder: B, capability: &'static str, f: impl FnOnce(B) -> Capability<B>) -> B {
    match f(builder) {
        Capability::Applied(b) => b,
        Capability::Unsupported(b) => {
            tracing::trace!(capability, "builder lacks capability, constraint skipped");
            b
        }
    }
}

/// Group compiled fields by path; later fields for the same path (such as
/// several `patternProperties` under one object) are kept in order.
pub fn by_path<B>(
    compiled: Vec<(String, CompiledField<B>)>,
) -> BTreeMap<String, Vec<CompiledField<B>>> {
    let mut grouped: BTreeMap<String, Vec<CompiledField<B>>> = BTreeMap::new();
    for (path, field) in compiled {
        grouped.entry(path).or_default().push(field);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Records every capability call; `missing` names capabilities it lacks.
    #[derive(Clone, Default)]
    struct Recorder {
        calls: Vec<String>,
        predicates: Vec<Predicate>,
        branches: Vec<Vec<String>>,
        missing: &'static [&'static str],
    }

    impl Recorder {
        fn lacking(missing: &'static [&'static str]) -> Self {
            Recorder {
                missing,
                ..Recorder::default()
            }
        }

        fn call(mut self, name: &str) -> Capability<Self> {
            if self.missing.iter().any(|m| *m == name) {
                return Capability::Unsupported(self);
            }
            self.calls.push(name.to_string());
            Capability::Applied(self)
        }
    }

    impl SchemaBuilder for Recorder {
        fn string(self) -> Capability<Self> {
            self.call("string")
        }
        fn number(self) -> Capability<Self> {
            self.call("number")
        }
        fn boolean(self) -> Capability<Self> {
            self.call("boolean")
        }
        fn array(self) -> Capability<Self> {
            self.call("array")
        }
        fn object(self) -> Capability<Self> {
            self.call("object")
        }
        fn literal(self, value: &Value) -> Capability<Self> {
            self.call(&format!("literal({value})"))
        }
        fn nullable(self) -> Capability<Self> {
            self.call("nullable")
        }
        fn required(self) -> Capability<Self> {
            self.call("required")
        }
        fn min(self, limit: f64, options: BoundOptions) -> Capability<Self> {
            let name = if options.exclusive { "gt" } else { "min" };
            self.call(&format!("{name}({limit})"))
        }
        fn max(self, limit: f64, options: BoundOptions) -> Capability<Self> {
            let name = if options.exclusive { "lt" } else { "max" };
            self.call(&format!("{name}({limit})"))
        }
        fn pattern(self, pattern: &crate::schema::Pattern) -> Capability<Self> {
            self.call(&format!("pattern({pattern})"))
        }
        fn email(self) -> Capability<Self> {
            self.call("email")
        }
        fn integer(self) -> Capability<Self> {
            self.call("integer")
        }
        fn min_items(self, count: u64) -> Capability<Self> {
            self.call(&format!("min_items({count})"))
        }
        fn unique(self) -> Capability<Self> {
            self.call("unique")
        }
        fn custom(mut self, predicate: Predicate) -> Capability<Self> {
            if self.missing.contains(&"custom") {
                return Capability::Unsupported(self);
            }
            self.predicates.push(predicate);
            self.call("custom")
        }
        fn refine(mut self, predicate: Predicate) -> Capability<Self> {
            if self.missing.contains(&"refine") {
                return Capability::Unsupported(self);
            }
            self.predicates.push(predicate);
            self.call("refine")
        }
        fn one_of(mut self, branches: Vec<Self>) -> Capability<Self> {
            self.branches = branches.into_iter().map(|b| b.calls).collect();
            self.call("one_of")
        }
    }

    fn compiled(schema: Value) -> Vec<(String, Recorder)> {
        let root = Arc::new(RootSchema::from_value(&schema).unwrap());
        compile_schema::<Recorder>(root)
            .unwrap()
            .into_iter()
            .map(|(path, field)| (path, field(Recorder::default())))
            .collect()
    }

    fn single(schema: Value) -> Recorder {
        let mut fields = compiled(schema);
        assert_eq!(fields.len(), 1);
        fields.remove(0).1
    }

    #[test]
    fn string_field_order() {
        let r = single(json!({
            "required": ["email"],
            "properties": {
                "email": { "type": ["string", "null"], "minLength": 3, "pattern": "^a", "format": "email" }
            }
        }));
        assert_eq!(
            r.calls,
            ["string", "nullable", "min(3)", "pattern(^a)", "email", "required"]
        );
    }

    #[test]
    fn integer_and_exclusive_bounds() {
        let r = single(json!({
            "properties": {
                "qty": { "type": "integer", "exclusiveMinimum": 0, "maximum": 10 }
            }
        }));
        assert_eq!(r.calls, ["number", "integer", "gt(0)", "max(10)"]);
    }

    #[test]
    fn aliases_are_tried_in_order() {
        let field = FieldDsl {
            path: "tags".into(),
            base_type: BaseType::Array,
            nullable: false,
            multiple_types: None,
            constraints: Constraints {
                min_items: Some(2),
                unique_items: true,
                ..Constraints::default()
            },
        };
        let compiled = compile_field::<Recorder>(&field, None);
        let r = compiled(Recorder::lacking(&["min_items(2)", "unique", "custom"]));
        assert_eq!(r.calls, ["array", "min(2)", "refine"]);
        let unique = &r.predicates[0];
        assert!(unique(&json!([1, 2])));
        assert!(!unique(&json!([1, 1.0])));
    }

    #[test]
    fn missing_capabilities_are_skipped() {
        #[derive(Clone)]
        struct Bare;
        impl SchemaBuilder for Bare {}

        let field = FieldDsl {
            path: "x".into(),
            base_type: BaseType::String,
            nullable: true,
            multiple_types: None,
            constraints: Constraints {
                required: true,
                min_length: Some(1),
                any_of: Some(vec![Schema::Bool(true)]),
                ..Constraints::default()
            },
        };
        let compiled = compile_field::<Bare>(&field, None);
        let _ = compiled(Bare);
    }

    #[test]
    fn composition_becomes_one_predicate() {
        let r = single(json!({
            "properties": {
                "contact": {
                    "type": "string",
                    "oneOf": [{ "maxLength": 5 }, { "minLength": 3 }]
                }
            }
        }));
        assert_eq!(r.calls, ["string", "custom"]);
        let check = &r.predicates[0];
        assert!(check(&json!("ab")));
        assert!(check(&json!("abcdefg")));
        assert!(!check(&json!("abcd")));
    }

    #[test]
    fn enum_and_const() {
        let fields = compiled(json!({
            "properties": {
                "status": { "enum": ["open", "closed"] },
                "kind": { "const": "order" }
            }
        }));
        let status = &fields[0].1;
        assert_eq!(status.calls, ["string", "custom"]);
        assert!(status.predicates[0](&json!("open")));
        assert!(!status.predicates[0](&json!("draft")));
        assert_eq!(fields[1].1.calls, ["string", "literal(\"order\")"]);
    }

    #[test]
    fn multiple_types_compile_to_one_of() {
        let r = single(json!({
            "required": ["id"],
            "properties": {
                "id": { "type": ["string", "integer", "null"], "minLength": 1, "minimum": 1 }
            }
        }));
        assert_eq!(r.calls, ["one_of", "nullable", "required"]);
        assert_eq!(
            r.branches,
            [vec!["string", "min(1)"], vec!["number", "integer", "min(1)"]]
        );
    }

    #[test]
    fn additional_properties_predicate_knows_declared_names() {
        let fields = compiled(json!({
            "type": "object",
            "additionalProperties": false,
            "properties": { "known": { "type": "number" } }
        }));
        let (path, root) = &fields[0];
        assert_eq!(path, "");
        assert_eq!(root.calls, ["object", "custom"]);
        let check = &root.predicates[0];
        assert!(check(&json!({ "known": 1 })));
        assert!(!check(&json!({ "known": 1, "extra": 2 })));
    }

    #[test]
    fn format_override_reaches_fallback_predicate() {
        let field = FieldDsl {
            path: "code".into(),
            base_type: BaseType::String,
            nullable: false,
            multiple_types: None,
            constraints: Constraints {
                format: Some("sku".into()),
                ..Constraints::default()
            },
        };
        let compiler = Compiler::new(None)
            .with_options(ValidationOptions::new().format("sku", |s| s.starts_with("SKU-")));
        let r = compiler.compile::<Recorder>(&field)(Recorder::default());
        assert_eq!(r.calls, ["string", "custom"]);
        assert!(r.predicates[0](&json!("SKU-1")));
        assert!(!r.predicates[0](&json!("1")));
    }

    #[test]
    fn nullable_predicates_accept_null() {
        let r = single(json!({
            "properties": {
                "n": { "type": ["number", "null"], "multipleOf": 2, "not": { "const": 4 } }
            }
        }));
        assert_eq!(r.calls, ["number", "nullable", "custom", "custom"]);
        let (multiple, not) = (&r.predicates[0], &r.predicates[1]);
        assert!(multiple(&Value::Null));
        assert!(multiple(&json!(6)));
        assert!(!multiple(&json!(5)));
        assert!(not(&json!(6)));
        assert!(!not(&json!(4)));
    }

    #[test]
    fn grouping_keeps_field_order() {
        let root = Arc::new(
            RootSchema::from_value(&json!({
                "properties": {
                    "a": { "type": "object", "patternProperties": { "^x": {}, "^y": {} } }
                }
            }))
            .unwrap(),
        );
        let grouped = by_path(compile_schema::<Recorder>(root).unwrap());
        assert_eq!(grouped["a"].len(), 1);
        assert_eq!(grouped["a.*"].len(), 2);
    }
}
