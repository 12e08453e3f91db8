//! Local `$ref` resolution within one root document.
//!
//! Only pointers starting with `#` are supported. The `definitions` and
//! `$defs` segments always jump into the root's definitions table; every
//! other segment walks a keyword (and, for map or list keywords, the next
//! segment names the entry).

use std::borrow::Cow;

use crate::error::RefError;
use crate::schema::{Items, Pattern, RootSchema, Schema, SchemaMap};

/// Resolve a local pointer such as `#/definitions/User/properties/name`.
///
/// # Errors
///
/// Returns `RefError::UnsupportedReference` for pointers that do not start
/// with `#`, and `RefError::UnresolvedReference` when a segment is missing
/// or the pointer does not end on a schema.
pub fn resolve_ref<'a>(pointer: &str, root: &'a RootSchema) -> Result<&'a Schema, RefError> {
    let Some(rest) = pointer.strip_prefix('#') else {
        return Err(RefError::UnsupportedReference {
            pointer: pointer.to_string(),
        });
    };

    let mut cursor = Cursor::Node(root.schema());
    let mut last = "#".to_string();
    for raw in rest.split('/').filter(|s| !s.is_empty()) {
        let segment = unescape(raw);
        cursor = cursor
            .step(&segment, root)
            .ok_or_else(|| RefError::UnresolvedReference {
                pointer: pointer.to_string(),
                segment: segment.clone(),
            })?;
        last = segment;
    }

    match cursor {
        Cursor::Node(schema) => {
            tracing::trace!(pointer, "resolved reference");
            Ok(schema)
        }
        _ => Err(RefError::UnresolvedReference {
            pointer: pointer.to_string(),
            segment: last,
        }),
    }
}

/// Resolve the `$ref` on `schema`, or return `schema` itself when it has none.
///
/// A target that is itself a `$ref` is followed until a concrete node is
/// reached; revisiting a pointer along that chain is a cycle.
///
/// # Errors
///
/// Returns `RefError::MissingRootSchema` when `schema` has a `$ref` but no
/// root was supplied, plus any error from [`resolve_ref`].
pub fn resolve_schema_ref<'a>(
    schema: &'a Schema,
    root: Option<&'a RootSchema>,
) -> Result<&'a Schema, RefError> {
    let mut current = schema;
    let mut chain: Vec<&str> = Vec::new();
    while let Some(pointer) = current.reference() {
        if chain.contains(&pointer) {
            tracing::debug!(pointer, "reference chain revisits itself");
            return Err(RefError::CircularReference {
                pointer: pointer.to_string(),
            });
        }
        let root = root.ok_or_else(|| RefError::MissingRootSchema {
            pointer: pointer.to_string(),
        })?;
        chain.push(pointer);
        current = resolve_ref(pointer, root)?;
    }
    Ok(current)
}

/// Check that every `$ref` in `schema`, and in the root document with its
/// definitions, resolves to a concrete node.
///
/// The evaluators run this before looking at any value, so a malformed
/// reference fails the call the same way whichever branch the value takes.
/// Recursion through a schema's own properties is fine; only a `$ref`
/// chain that revisits itself is circular.
///
/// # Errors
///
/// The first `RefError` met, in document order.
pub fn check_refs(schema: &Schema, root: Option<&RootSchema>) -> Result<(), RefError> {
    if let Some(root) = root {
        root.checked_refs()?;
        if std::ptr::eq(schema, root.schema()) {
            return Ok(());
        }
    }
    check_tree(schema, root)
}

pub(crate) fn check_tree(schema: &Schema, root: Option<&RootSchema>) -> Result<(), RefError> {
    let mut pending = vec![schema];
    while let Some(node) = pending.pop() {
        resolve_schema_ref(node, root)?;
        if let Schema::Object(obj) = node {
            pending.extend(obj.subschemas().into_iter().rev());
        }
    }
    Ok(())
}

/// Deep-resolve every `$ref` reachable from `schema`, inlining the targets.
///
/// Cycle tracking is scoped to each branch: two siblings referencing the same
/// definition resolve fine, while a reference that revisits itself along one
/// path fails with `RefError::CircularReference`. `definitions` tables are
/// carried over unresolved.
pub fn resolve_all_refs(schema: &Schema, root: Option<&RootSchema>) -> Result<Schema, RefError> {
    resolve_branch(schema, root, &[])
}

fn resolve_branch(
    schema: &Schema,
    root: Option<&RootSchema>,
    visited: &[&str],
) -> Result<Schema, RefError> {
    if let Some(pointer) = schema.reference() {
        if visited.iter().any(|seen| *seen == pointer) {
            tracing::debug!(pointer, "circular reference");
            return Err(RefError::CircularReference {
                pointer: pointer.to_string(),
            });
        }
        let root = root.ok_or_else(|| RefError::MissingRootSchema {
            pointer: pointer.to_string(),
        })?;
        let target = resolve_ref(pointer, root)?;
        let mut extended: Vec<&str> = visited.to_vec();
        extended.push(pointer);
        return resolve_branch(target, Some(root), &extended);
    }

    let Schema::Object(obj) = schema else {
        return Ok(schema.clone());
    };

    let mut resolved = (**obj).clone();
    resolved.try_for_each_subschema_mut(|child| {
        *child = resolve_branch(child, root, visited)?;
        Ok::<_, RefError>(())
    })?;
    Ok(Schema::Object(Box::new(resolved)))
}

/// Follow `$ref` chains from `schema` to a concrete node.
///
/// Returns the node together with the pointers visited on the way, which
/// the caller hands down to that node's children only.
pub(crate) fn follow<'a, 'v>(
    schema: &'a Schema,
    root: &'a RootSchema,
    visited: &'v [&'a str],
) -> Result<(&'a Schema, Cow<'v, [&'a str]>), RefError> {
    let mut node = schema;
    let mut trail = Cow::Borrowed(visited);
    while let Some(pointer) = node.reference() {
        if trail.contains(&pointer) {
            tracing::debug!(pointer, "circular reference");
            return Err(RefError::CircularReference {
                pointer: pointer.to_string(),
            });
        }
        trail.to_mut().push(pointer);
        node = resolve_ref(pointer, root)?;
    }
    Ok((node, trail))
}

enum Cursor<'a> {
    Node(&'a Schema),
    Named(&'a SchemaMap),
    Patterns(&'a SchemaMap<Pattern>),
    List(&'a [Schema]),
    Definitions,
}

impl<'a> Cursor<'a> {
    fn step(self, segment: &str, root: &'a RootSchema) -> Option<Cursor<'a>> {
        if segment == "definitions" || segment == "$defs" {
            return Some(Cursor::Definitions);
        }
        match self {
            Cursor::Definitions => root.definition(segment).map(Cursor::Node),
            Cursor::Named(map) => map.get(segment).map(Cursor::Node),
            Cursor::Patterns(map) => map
                .iter()
                .find(|(pattern, _)| pattern.as_str() == segment)
                .map(|(_, schema)| Cursor::Node(schema)),
            Cursor::List(list) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| list.get(i))
                .map(Cursor::Node),
            Cursor::Node(Schema::Bool(_)) => None,
            Cursor::Node(Schema::Object(obj)) => {
                let node = |s: &'a Option<Schema>| s.as_ref().map(Cursor::Node);
                let list = |s: &'a Option<Vec<Schema>>| s.as_deref().map(Cursor::List);
                match segment {
                    "properties" => obj.object.properties.as_ref().map(Cursor::Named),
                    "patternProperties" => obj.object.pattern_properties.as_ref().map(Cursor::Patterns),
                    "additionalProperties" => node(&obj.object.additional_properties),
                    "propertyNames" => node(&obj.object.property_names),
                    "items" => match obj.array.items.as_ref()? {
                        Items::Single(schema) => Some(Cursor::Node(schema)),
                        Items::Tuple(schemas) => Some(Cursor::List(schemas)),
                    },
                    "additionalItems" => node(&obj.array.additional_items),
                    "contains" => node(&obj.array.contains),
                    "allOf" => list(&obj.composition.all_of),
                    "anyOf" => list(&obj.composition.any_of),
                    "oneOf" => list(&obj.composition.one_of),
                    "not" => node(&obj.composition.not),
                    "if" => node(&obj.conditional.if_schema),
                    "then" => node(&obj.conditional.then_schema),
                    "else" => node(&obj.conditional.else_schema),
                    _ => None,
                }
            }
        }
    }
}

/// Undo JSON Pointer escaping (`~1` is `/`, `~0` is `~`).
fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root(value: serde_json::Value) -> RootSchema {
        RootSchema::from_value(&value).unwrap()
    }

    fn schema(value: serde_json::Value) -> Schema {
        Schema::from_value(&value).unwrap()
    }

    #[test]
    fn resolves_nested_definition_property() {
        let root = root(json!({
            "definitions": {
                "User": { "properties": { "name": { "type": "string" } } }
            }
        }));
        let resolved = resolve_ref("#/definitions/User/properties/name", &root).unwrap();
        assert_eq!(resolved, &schema(json!({ "type": "string" })));
    }

    #[test]
    fn resolves_defs_and_root_pointer() {
        let root = root(json!({
            "type": "object",
            "$defs": { "Id": { "type": "integer" } }
        }));
        assert_eq!(
            resolve_ref("#/$defs/Id", &root).unwrap(),
            &schema(json!({ "type": "integer" }))
        );
        assert_eq!(resolve_ref("#", &root).unwrap(), root.schema());
    }

    #[test]
    fn resolves_into_lists_and_escaped_names() {
        let root = root(json!({
            "anyOf": [{ "type": "string" }, { "type": "number" }],
            "properties": { "a/b": { "minimum": 1 } }
        }));
        assert_eq!(
            resolve_ref("#/anyOf/1", &root).unwrap(),
            &schema(json!({ "type": "number" }))
        );
        assert_eq!(
            resolve_ref("#/properties/a~1b", &root).unwrap(),
            &schema(json!({ "minimum": 1 }))
        );
    }

    #[test]
    fn rejects_non_local_pointer() {
        let root = root(json!({}));
        let err = resolve_ref("other.json#/definitions/A", &root).unwrap_err();
        assert!(matches!(err, RefError::UnsupportedReference { .. }));
    }

    #[test]
    fn reports_missing_segment() {
        let root = root(json!({ "definitions": { "A": {} } }));
        let err = resolve_ref("#/definitions/B", &root).unwrap_err();
        assert_eq!(
            err,
            RefError::UnresolvedReference {
                pointer: "#/definitions/B".into(),
                segment: "B".into()
            }
        );

        // Ending on a table rather than a schema is unresolved too.
        let err = resolve_ref("#/definitions", &root).unwrap_err();
        assert!(matches!(err, RefError::UnresolvedReference { .. }));
    }

    #[test]
    fn schema_ref_is_identity_without_ref() {
        let s = schema(json!({ "type": "string" }));
        assert_eq!(resolve_schema_ref(&s, None).unwrap(), &s);
    }

    #[test]
    fn schema_ref_requires_root() {
        let s = schema(json!({ "$ref": "#/definitions/A" }));
        let err = resolve_schema_ref(&s, None).unwrap_err();
        assert!(matches!(err, RefError::MissingRootSchema { .. }));
    }

    #[test]
    fn schema_ref_follows_chains_and_detects_loops() {
        let root = root(json!({
            "definitions": {
                "A": { "$ref": "#/definitions/B" },
                "B": { "type": "boolean" },
                "X": { "$ref": "#/definitions/Y" },
                "Y": { "$ref": "#/definitions/X" }
            }
        }));
        let a = schema(json!({ "$ref": "#/definitions/A" }));
        assert_eq!(
            resolve_schema_ref(&a, Some(&root)).unwrap(),
            &schema(json!({ "type": "boolean" }))
        );

        let x = schema(json!({ "$ref": "#/definitions/X" }));
        let err = resolve_schema_ref(&x, Some(&root)).unwrap_err();
        assert!(matches!(err, RefError::CircularReference { .. }));
    }

    #[test]
    fn check_refs_covers_unvisited_branches() {
        let broken = root(json!({
            "properties": {
                "a": { "type": "string" },
                "b": { "items": { "$ref": "#/definitions/Missing" } }
            },
            "definitions": { "Present": { "type": "integer" } }
        }));
        let err = check_refs(broken.schema(), Some(&broken)).unwrap_err();
        assert_eq!(
            err,
            RefError::UnresolvedReference {
                pointer: "#/definitions/Missing".into(),
                segment: "Missing".into()
            }
        );

        let unused = root(json!({
            "type": "string",
            "definitions": { "Loop": { "$ref": "#/definitions/Loop" } }
        }));
        let err = check_refs(unused.schema(), Some(&unused)).unwrap_err();
        assert!(matches!(err, RefError::CircularReference { .. }));
    }

    #[test]
    fn check_refs_accepts_recursive_definitions() {
        let linked = root(json!({
            "$ref": "#/definitions/Node",
            "definitions": {
                "Node": {
                    "properties": { "next": { "$ref": "#/definitions/Node" } }
                }
            }
        }));
        assert!(check_refs(linked.schema(), Some(&linked)).is_ok());

        let detached = schema(json!({ "not": { "$ref": "#/definitions/Node" } }));
        assert!(check_refs(&detached, Some(&linked)).is_ok());
        assert!(matches!(
            check_refs(&detached, None),
            Err(RefError::MissingRootSchema { .. })
        ));
    }

    #[test]
    fn diamond_references_resolve() {
        let root = root(json!({
            "type": "object",
            "properties": {
                "billing": { "$ref": "#/definitions/Address" },
                "shipping": { "$ref": "#/definitions/Address" }
            },
            "definitions": {
                "Address": {
                    "type": "object",
                    "properties": { "zip": { "$ref": "#/definitions/Zip" } }
                },
                "Zip": { "type": "string", "pattern": "^[0-9]{5}$" }
            }
        }));
        let resolved = resolve_all_refs(root.schema(), Some(&root)).unwrap();
        let obj = resolved.as_object().unwrap();
        let props = obj.object.properties.as_ref().unwrap();
        for name in ["billing", "shipping"] {
            let zip = props
                .get(name)
                .and_then(Schema::as_object)
                .and_then(|a| a.object.properties.as_ref())
                .and_then(|p| p.get("zip"))
                .unwrap();
            assert_eq!(zip, &schema(json!({ "type": "string", "pattern": "^[0-9]{5}$" })));
        }
    }

    #[test]
    fn self_reference_along_one_path_is_circular() {
        let root = root(json!({
            "$ref": "#/definitions/Node",
            "definitions": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "children": { "type": "array", "items": { "$ref": "#/definitions/Node" } }
                    }
                }
            }
        }));
        let err = resolve_all_refs(root.schema(), Some(&root)).unwrap_err();
        assert_eq!(
            err,
            RefError::CircularReference {
                pointer: "#/definitions/Node".into()
            }
        );
    }

    #[test]
    fn resolving_twice_is_a_no_op() {
        let root = root(json!({
            "allOf": [{ "$ref": "#/definitions/Named" }],
            "if": { "$ref": "#/definitions/Named" },
            "then": { "required": ["id"] },
            "definitions": {
                "Named": { "properties": { "name": { "type": "string" } } }
            }
        }));
        let once = resolve_all_refs(root.schema(), Some(&root)).unwrap();
        let twice = resolve_all_refs(&once, Some(&root)).unwrap();
        assert_eq!(once, twice);
        assert!(once.as_object().unwrap().composition.all_of.as_ref().unwrap()[0]
            .reference()
            .is_none());
    }
}
