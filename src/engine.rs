//! The rule walk shared by the boolean validator and the diagnostic pass.
//!
//! Every keyword rule lives here exactly once. A [`Sink`] decides what a
//! failed rule means: [`Verdict`] halts the walk on the first failure,
//! [`Collector`] records the error and keeps going. Because both evaluators
//! run the same rules, a value rejected in boolean mode always produces at
//! least one diagnostic, and vice versa.

use base64::Engine as _;
use serde_json::{Map, Value};

use crate::error::{ErrorCode, RefError, ValidationError};
use crate::format::FormatRegistry;
use crate::resolver::resolve_schema_ref;
use crate::schema::{
    ArrayKeywords, Composition, Conditional, Items, NumberKeywords, ObjectKeywords, RootSchema,
    Schema, StringKeywords,
};
use crate::types::{json_equal, json_type_name, SchemaType};

/// Location of the value under evaluation, rendered only when an error is reported.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Path<'a> {
    Root,
    Key(&'a Path<'a>, &'a str),
    Index(&'a Path<'a>, usize),
}

impl<'a> Path<'a> {
    pub(crate) fn key(&'a self, key: &'a str) -> Path<'a> {
        Path::Key(self, key)
    }

    pub(crate) fn index(&'a self, index: usize) -> Path<'a> {
        Path::Index(self, index)
    }

    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        match self {
            Path::Root => {}
            Path::Key(parent, key) => {
                parent.write_into(out);
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Path::Index(parent, index) => {
                parent.write_into(out);
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
        }
    }
}

/// Why a walk stopped early.
#[derive(Debug)]
pub(crate) enum Stop {
    /// A rule failed and the sink does not collect.
    Halted,
    Ref(RefError),
}

impl From<RefError> for Stop {
    fn from(err: RefError) -> Self {
        Stop::Ref(err)
    }
}

/// Receives rule failures.
pub(crate) trait Sink {
    /// Whether failures are recorded (and the walk continues) rather than halting.
    const COLLECTS: bool;

    fn fail(&mut self, error: impl FnOnce() -> ValidationError) -> Result<(), Stop>;
}

/// Halts on the first failure.
pub(crate) struct Verdict;

impl Sink for Verdict {
    const COLLECTS: bool = false;

    fn fail(&mut self, _error: impl FnOnce() -> ValidationError) -> Result<(), Stop> {
        Err(Stop::Halted)
    }
}

/// Records every failure.
#[derive(Default)]
pub(crate) struct Collector {
    pub(crate) errors: Vec<ValidationError>,
}

impl Sink for Collector {
    const COLLECTS: bool = true;

    fn fail(&mut self, error: impl FnOnce() -> ValidationError) -> Result<(), Stop> {
        self.errors.push(error());
        Ok(())
    }
}

pub(crate) struct Evaluator<'a> {
    root: Option<&'a RootSchema>,
    formats: &'a FormatRegistry,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(root: Option<&'a RootSchema>, formats: &'a FormatRegistry) -> Self {
        Self { root, formats }
    }

    pub(crate) fn is_valid(&self, value: &Value, schema: &Schema) -> Result<bool, RefError> {
        match self.walk(value, schema, &Path::Root, &mut Verdict) {
            Ok(()) => Ok(true),
            Err(Stop::Halted) => Ok(false),
            Err(Stop::Ref(err)) => Err(err),
        }
    }

    /// Diagnostics for `value`, empty whenever [`Evaluator::is_valid`] accepts it.
    pub(crate) fn errors(
        &self,
        value: &Value,
        schema: &Schema,
        path: &Path<'_>,
    ) -> Result<Vec<ValidationError>, RefError> {
        if self.is_valid(value, schema)? {
            return Ok(Vec::new());
        }
        let mut collector = Collector::default();
        match self.walk(value, schema, path, &mut collector) {
            Ok(()) | Err(Stop::Halted) => Ok(collector.errors),
            Err(Stop::Ref(err)) => Err(err),
        }
    }

    fn walk<S: Sink>(
        &self,
        value: &Value,
        schema: &Schema,
        path: &Path<'_>,
        sink: &mut S,
    ) -> Result<(), Stop> {
        let schema = resolve_schema_ref(schema, self.root)?;
        let obj = match schema {
            Schema::Bool(true) => return Ok(()),
            Schema::Bool(false) => {
                return sink.fail(|| {
                    ValidationError::new(path.render(), ErrorCode::FalseSchema, "no value is allowed here")
                        .with_value(value)
                })
            }
            Schema::Object(obj) => obj,
        };

        if value.is_null() {
            let allowed = match &obj.types {
                Some(types) => types.contains(SchemaType::Null),
                None => obj.const_value.is_some() || obj.enum_values.is_some(),
            };
            if !allowed {
                sink.fail(|| {
                    let message = match &obj.types {
                        Some(types) => format!("expected {types}, got null"),
                        None => "null is not allowed".to_string(),
                    };
                    ValidationError::new(path.render(), ErrorCode::TypeMismatch, message)
                        .with_value(value)
                })?;
                return Ok(());
            }
        }

        if let Some(types) = &obj.types {
            if !types.matches(value) {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::TypeMismatch,
                        format!("expected {types}, got {}", json_type_name(value)),
                    )
                    .with_value(value)
                    .with_constraint(types.to_string())
                })?;
                return Ok(());
            }
        }

        let const_failed = match &obj.const_value {
            Some(expected) if json_equal(value, expected) => return Ok(()),
            Some(expected) => {
                sink.fail(|| {
                    ValidationError::new(path.render(), ErrorCode::Const, format!("must equal {expected}"))
                        .with_value(value)
                        .with_constraint(expected.clone())
                })?;
                true
            }
            None => false,
        };
        if let Some(options) = &obj.enum_values {
            if !options.iter().any(|option| json_equal(value, option)) {
                sink.fail(|| {
                    let allowed = Value::Array(options.clone());
                    ValidationError::new(path.render(), ErrorCode::Enum, format!("must be one of {allowed}"))
                        .with_value(value)
                        .with_constraint(allowed)
                })?;
            } else if !const_failed {
                return Ok(());
            }
        }

        match value {
            Value::String(s) => self.string_rules(value, s, &obj.string, path, sink)?,
            Value::Number(_) => self.number_rules(value, &obj.number, path, sink)?,
            Value::Array(items) => self.array_rules(items, &obj.array, path, sink)?,
            Value::Object(map) => self.object_rules(map, &obj.object, path, sink)?,
            Value::Null | Value::Bool(_) => {}
        }

        self.composition_rules(value, &obj.composition, path, sink)?;
        self.conditional_rules(value, &obj.conditional, path, sink)
    }

    fn string_rules<S: Sink>(
        &self,
        value: &Value,
        s: &str,
        rules: &StringKeywords,
        path: &Path<'_>,
        sink: &mut S,
    ) -> Result<(), Stop> {
        let length = s.chars().count() as u64;
        if let Some(min) = rules.min_length {
            if length < min {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::MinLength,
                        format!("must be at least {min} characters, got {length}"),
                    )
                    .with_value(value)
                    .with_constraint(min)
                })?;
            }
        }
        if let Some(max) = rules.max_length {
            if length > max {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::MaxLength,
                        format!("must be at most {max} characters, got {length}"),
                    )
                    .with_value(value)
                    .with_constraint(max)
                })?;
            }
        }
        if let Some(pattern) = &rules.pattern {
            if !pattern.is_match(s) {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::Pattern,
                        format!("does not match pattern {pattern}"),
                    )
                    .with_value(value)
                    .with_constraint(pattern.as_str())
                })?;
            }
        }
        if let Some(format) = &rules.format {
            if !self.formats.check(format, s) {
                sink.fail(|| {
                    ValidationError::new(path.render(), ErrorCode::Format, format!("invalid {format}"))
                        .with_value(value)
                        .with_constraint(format.as_str())
                })?;
            }
        }
        if let Some(encoding) = &rules.content_encoding {
            if !is_encoded(encoding, s) {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::ContentEncoding,
                        format!("not valid {encoding} content"),
                    )
                    .with_value(value)
                    .with_constraint(encoding.as_str())
                })?;
            }
        }
        Ok(())
    }

    fn number_rules<S: Sink>(
        &self,
        value: &Value,
        rules: &NumberKeywords,
        path: &Path<'_>,
        sink: &mut S,
    ) -> Result<(), Stop> {
        let Some(n) = value.as_f64() else {
            return Ok(());
        };
        for bound in rules.lower_bounds() {
            let limit = bound.limit;
            if bound.exclusive && n <= limit {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::ExclusiveMinimum,
                        format!("must be greater than {limit}"),
                    )
                    .with_value(value)
                    .with_constraint(limit)
                })?;
            } else if !bound.exclusive && n < limit {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::Minimum,
                        format!("must be at least {limit}"),
                    )
                    .with_value(value)
                    .with_constraint(limit)
                })?;
            }
        }
        for bound in rules.upper_bounds() {
            let limit = bound.limit;
            if bound.exclusive && n >= limit {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::ExclusiveMaximum,
                        format!("must be less than {limit}"),
                    )
                    .with_value(value)
                    .with_constraint(limit)
                })?;
            } else if !bound.exclusive && n > limit {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::Maximum,
                        format!("must be at most {limit}"),
                    )
                    .with_value(value)
                    .with_constraint(limit)
                })?;
            }
        }
        if let Some(divisor) = rules.multiple_of {
            if !is_multiple_of(value, divisor) {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::MultipleOf,
                        format!("must be a multiple of {divisor}"),
                    )
                    .with_value(value)
                    .with_constraint(divisor)
                })?;
            }
        }
        Ok(())
    }

    fn array_rules<S: Sink>(
        &self,
        items: &[Value],
        rules: &ArrayKeywords,
        path: &Path<'_>,
        sink: &mut S,
    ) -> Result<(), Stop> {
        let count = items.len() as u64;
        if let Some(min) = rules.min_items {
            if count < min {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::MinItems,
                        format!("must have at least {min} items, got {count}"),
                    )
                    .with_constraint(min)
                })?;
            }
        }
        if let Some(max) = rules.max_items {
            if count > max {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::MaxItems,
                        format!("must have at most {max} items, got {count}"),
                    )
                    .with_constraint(max)
                })?;
            }
        }
        if rules.unique_items == Some(true) {
            if let Some((first, second)) = first_duplicate(items) {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::UniqueItems,
                        format!("items at {first} and {second} are equal"),
                    )
                    .with_value(&items[second])
                    .with_constraint(true)
                })?;
            }
        }

        match &rules.items {
            Some(Items::Single(schema)) => {
                for (i, item) in items.iter().enumerate() {
                    self.walk(item, schema, &path.index(i), sink)?;
                }
            }
            Some(Items::Tuple(schemas)) => {
                for (i, (item, schema)) in items.iter().zip(schemas).enumerate() {
                    self.walk(item, schema, &path.index(i), sink)?;
                }
                let extra = items.len().saturating_sub(schemas.len());
                match &rules.additional_items {
                    Some(Schema::Bool(false)) if extra > 0 => {
                        let allowed = schemas.len();
                        sink.fail(|| {
                            ValidationError::new(
                                path.render(),
                                ErrorCode::AdditionalItems,
                                format!("must have at most {allowed} items, got {count}"),
                            )
                            .with_constraint(allowed)
                        })?;
                    }
                    Some(schema) => {
                        for (i, item) in items.iter().enumerate().skip(schemas.len()) {
                            self.walk(item, schema, &path.index(i), sink)?;
                        }
                    }
                    None => {}
                }
            }
            None => {}
        }

        if let Some(contains) = &rules.contains {
            let mut found = false;
            for item in items {
                if self.is_valid(item, contains)? {
                    found = true;
                    break;
                }
            }
            if !found {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::Contains,
                        "no item matches the contains schema",
                    )
                })?;
            }
        }
        Ok(())
    }

    fn object_rules<S: Sink>(
        &self,
        map: &Map<String, Value>,
        rules: &ObjectKeywords,
        path: &Path<'_>,
        sink: &mut S,
    ) -> Result<(), Stop> {
        let count = map.len() as u64;
        if let Some(min) = rules.min_properties {
            if count < min {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::MinProperties,
                        format!("must have at least {min} properties, got {count}"),
                    )
                    .with_constraint(min)
                })?;
            }
        }
        if let Some(max) = rules.max_properties {
            if count > max {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::MaxProperties,
                        format!("must have at most {max} properties, got {count}"),
                    )
                    .with_constraint(max)
                })?;
            }
        }
        for name in rules.required.iter().flatten() {
            if !map.contains_key(name) {
                sink.fail(|| {
                    ValidationError::new(path.key(name).render(), ErrorCode::Required, "is required")
                })?;
            }
        }
        for (trigger, dependents) in rules.dependent_required.iter().flatten() {
            if !map.contains_key(trigger) {
                continue;
            }
            for name in dependents {
                if !map.contains_key(name) {
                    sink.fail(|| {
                        ValidationError::new(
                            path.key(name).render(),
                            ErrorCode::DependentRequired,
                            format!("is required when {trigger} is present"),
                        )
                        .with_constraint(trigger.as_str())
                    })?;
                }
            }
        }

        if let Some(props) = &rules.properties {
            for (name, schema) in props.iter() {
                if let Some(child) = map.get(name) {
                    self.walk(child, schema, &path.key(name), sink)?;
                }
            }
        }

        for (key, child) in map {
            let child_path = path.key(key);
            let mut matched = rules
                .properties
                .as_ref()
                .map_or(false, |props| props.contains_key(key));
            for (pattern, schema) in rules.pattern_properties.iter().flat_map(|p| p.iter()) {
                if pattern.is_match(key) {
                    matched = true;
                    self.walk(child, schema, &child_path, sink)?;
                }
            }
            if matched {
                continue;
            }
            match &rules.additional_properties {
                Some(Schema::Bool(false)) => {
                    sink.fail(|| {
                        ValidationError::new(
                            child_path.render(),
                            ErrorCode::AdditionalProperties,
                            format!("additional property {key} is not allowed"),
                        )
                        .with_value(child)
                    })?;
                }
                Some(schema) => self.walk(child, schema, &child_path, sink)?,
                None => {}
            }
        }

        if let Some(names) = &rules.property_names {
            for key in map.keys() {
                let name = Value::String(key.clone());
                if !self.is_valid(&name, names)? {
                    sink.fail(|| {
                        ValidationError::new(
                            path.key(key).render(),
                            ErrorCode::PropertyNames,
                            format!("property name {key} is not allowed"),
                        )
                        .with_value(&name)
                    })?;
                }
            }
        }
        Ok(())
    }

    fn composition_rules<S: Sink>(
        &self,
        value: &Value,
        rules: &Composition,
        path: &Path<'_>,
        sink: &mut S,
    ) -> Result<(), Stop> {
        if let Some(all_of) = &rules.all_of {
            let mut failed = 0;
            for schema in all_of {
                if !self.is_valid(value, schema)? {
                    failed += 1;
                    if !S::COLLECTS {
                        break;
                    }
                    self.walk(value, schema, path, sink)?;
                }
            }
            if failed > 0 {
                sink.fail(|| {
                    ValidationError::new(
                        path.render(),
                        ErrorCode::AllOf,
                        format!("does not match {failed} of {} allOf schemas", all_of.len()),
                    )
                    .with_value(value)
                })?;
            }
        }
        if let Some(any_of) = &rules.any_of {
            let mut matched = false;
            for schema in any_of {
                if self.is_valid(value, schema)? {
                    matched = true;
                    break;
                }
            }
            if !matched {
                sink.fail(|| {
                    ValidationError::new(path.render(), ErrorCode::AnyOf, "does not match any anyOf schema")
                        .with_value(value)
                })?;
            }
        }
        if let Some(one_of) = &rules.one_of {
            let mut matched = 0;
            for schema in one_of {
                if self.is_valid(value, schema)? {
                    matched += 1;
                    if matched > 1 {
                        break;
                    }
                }
            }
            if matched != 1 {
                sink.fail(|| {
                    let message = if matched == 0 {
                        "does not match any oneOf schema".to_string()
                    } else {
                        "matches more than one oneOf schema".to_string()
                    };
                    ValidationError::new(path.render(), ErrorCode::OneOf, message).with_value(value)
                })?;
            }
        }
        if let Some(not) = &rules.not {
            if self.is_valid(value, not)? {
                sink.fail(|| {
                    ValidationError::new(path.render(), ErrorCode::Not, "must not match the not schema")
                        .with_value(value)
                })?;
            }
        }
        Ok(())
    }

    fn conditional_rules<S: Sink>(
        &self,
        value: &Value,
        rules: &Conditional,
        path: &Path<'_>,
        sink: &mut S,
    ) -> Result<(), Stop> {
        let Some(condition) = &rules.if_schema else {
            return Ok(());
        };
        let branch = if self.is_valid(value, condition)? {
            &rules.then_schema
        } else {
            &rules.else_schema
        };
        match branch {
            Some(schema) => self.walk(value, schema, path, sink),
            None => Ok(()),
        }
    }
}

fn first_duplicate(items: &[Value]) -> Option<(usize, usize)> {
    for (i, a) in items.iter().enumerate() {
        for (j, b) in items.iter().enumerate().skip(i + 1) {
            if json_equal(a, b) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Exact for integer operands; otherwise the quotient must be whole within
/// a tolerance scaled to its magnitude.
fn is_multiple_of(value: &Value, divisor: f64) -> bool {
    if divisor <= 0.0 || !divisor.is_finite() {
        return true;
    }
    if let (Some(n), Some(d)) = (exact_integer(value), whole(divisor)) {
        return n % d == 0;
    }
    let Some(n) = value.as_f64() else {
        return true;
    };
    let quotient = n / divisor;
    quotient.is_finite()
        && (quotient - quotient.round()).abs() <= f64::EPSILON * quotient.abs().max(1.0)
}

fn exact_integer(value: &Value) -> Option<i128> {
    value
        .as_i64()
        .map(i128::from)
        .or_else(|| value.as_u64().map(i128::from))
}

/// `f` as an integer, when `f64` represents it exactly.
fn whole(f: f64) -> Option<i128> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    (f.fract() == 0.0 && f.abs() <= MAX_EXACT).then(|| f as i128)
}

fn is_encoded(encoding: &str, s: &str) -> bool {
    match encoding {
        "base64" => base64::engine::general_purpose::STANDARD.decode(s).is_ok(),
        _ => true,
    }
}
