//! Integration tests for flattening schemas and compiling fields onto a builder.

use std::collections::BTreeMap;
use std::sync::Arc;

use schema_gate::{
    compile_schema, flatten, BaseType, BoundOptions, FieldDsl, Predicate, Capability, RefError,
    RootSchema, SchemaBuilder, SchemaType,
};
use serde_json::{json, Value};

fn fields(schema: Value) -> Vec<FieldDsl> {
    flatten(&RootSchema::from_value(&schema).unwrap()).unwrap()
}

fn paths(fields: &[FieldDsl]) -> Vec<&str> {
    fields.iter().map(|f| f.path.as_str()).collect()
}

mod flattening {
    use super::*;

    #[test]
    fn array_items_single_and_tuple() {
        let single = fields(json!({
            "type": "object",
            "properties": { "tags": { "type": "array", "items": { "type": "string" } } }
        }));
        assert_eq!(paths(&single), ["tags", "tags[*]"]);

        let tuple = fields(json!({
            "type": "object",
            "properties": { "tags": { "type": "array", "items": [{ "type": "string" }] } }
        }));
        assert_eq!(paths(&tuple), ["tags"]);
    }

    #[test]
    fn deep_nesting_keeps_document_order() {
        let out = fields(json!({
            "type": "object",
            "properties": {
                "z": { "type": "string" },
                "order": {
                    "type": "object",
                    "properties": {
                        "lines": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "sku": { "type": "string" },
                                    "attrs": {
                                        "type": "object",
                                        "patternProperties": { "^[a-z]+$": { "type": "string" } }
                                    }
                                }
                            }
                        }
                    }
                },
                "a": { "type": "boolean" }
            }
        }));
        assert_eq!(
            paths(&out),
            [
                "z",
                "order",
                "order.lines",
                "order.lines[*]",
                "order.lines[*].sku",
                "order.lines[*].attrs",
                "order.lines[*].attrs.*",
                "a"
            ]
        );
        let a = out.last().unwrap();
        assert_eq!(a.base_type, BaseType::Boolean);
    }

    #[test]
    fn root_ref_is_followed() {
        let out = fields(json!({
            "$ref": "#/definitions/Order",
            "definitions": {
                "Order": {
                    "type": "object",
                    "required": ["id"],
                    "properties": { "id": { "type": "integer" } }
                }
            }
        }));
        assert_eq!(paths(&out), ["id"]);
        assert!(out[0].constraints.required);
        assert!(out[0].constraints.integer);
    }

    #[test]
    fn self_recursive_schema_is_circular() {
        let root = RootSchema::from_value(&json!({
            "type": "object",
            "properties": {
                "tree": { "$ref": "#/definitions/Tree" }
            },
            "definitions": {
                "Tree": {
                    "type": "object",
                    "properties": {
                        "children": { "type": "array", "items": { "$ref": "#/definitions/Tree" } }
                    }
                }
            }
        }))
        .unwrap();
        assert!(matches!(flatten(&root), Err(RefError::CircularReference { .. })));
    }

    #[test]
    fn unresolved_ref_is_reported() {
        let root = RootSchema::from_value(&json!({
            "properties": { "x": { "$ref": "#/definitions/Missing" } }
        }))
        .unwrap();
        assert!(matches!(flatten(&root), Err(RefError::UnresolvedReference { .. })));
    }

    #[test]
    fn multiple_types_keep_order_without_null() {
        let out = fields(json!({
            "properties": { "v": { "type": ["null", "integer", "string"] } }
        }));
        assert!(out[0].nullable);
        assert_eq!(out[0].base_type, BaseType::Number);
        assert_eq!(
            out[0].multiple_types,
            Some(vec![SchemaType::Integer, SchemaType::String])
        );
    }

    #[test]
    fn descriptors_serialize_for_tooling() {
        let out = fields(json!({
            "type": "object",
            "additionalProperties": false,
            "properties": { "tags": { "type": "array", "items": { "type": "string", "maxLength": 8 } } }
        }));
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json[0]["path"], "");
        assert_eq!(json[0]["baseType"], "object");
        assert_eq!(json[0]["constraints"]["additionalProperties"], false);
        assert_eq!(json[2]["path"], "tags[*]");
        assert_eq!(json[2]["constraints"]["maxLength"], 8);
    }
}

/// A builder that records the rules applied to it.
#[derive(Clone, Default)]
struct Rules {
    applied: Vec<String>,
    checks: Vec<Predicate>,
}

impl Rules {
    fn push(mut self, rule: String) -> Capability<Self> {
        self.applied.push(rule);
        Capability::Applied(self)
    }
}

impl SchemaBuilder for Rules {
    fn string(self) -> Capability<Self> {
        self.push("string".into())
    }
    fn number(self) -> Capability<Self> {
        self.push("number".into())
    }
    fn array(self) -> Capability<Self> {
        self.push("array".into())
    }
    fn object(self) -> Capability<Self> {
        self.push("object".into())
    }
    fn required(self) -> Capability<Self> {
        self.push("required".into())
    }
    fn min(self, limit: f64, options: BoundOptions) -> Capability<Self> {
        let op = if options.exclusive { ">" } else { ">=" };
        self.push(format!("{op}{limit}"))
    }
    fn max(self, limit: f64, options: BoundOptions) -> Capability<Self> {
        let op = if options.exclusive { "<" } else { "<=" };
        self.push(format!("{op}{limit}"))
    }
    fn email(self) -> Capability<Self> {
        self.push("email".into())
    }
    fn refine(mut self, predicate: Predicate) -> Capability<Self> {
        self.checks.push(predicate);
        self.push("refine".into())
    }
}

mod compiling {
    use super::*;

    #[test]
    fn registers_every_path_on_the_builder() {
        let root = Arc::new(
            RootSchema::from_value(&json!({
                "type": "object",
                "required": ["email", "items"],
                "properties": {
                    "email": { "type": "string", "format": "email", "maxLength": 64 },
                    "items": {
                        "type": "array",
                        "minItems": 1,
                        "items": { "type": "number", "exclusiveMinimum": 0 }
                    },
                    "contact": {
                        "anyOf": [{ "type": "string", "format": "email" }, { "type": "string", "pattern": "^\\+" }]
                    }
                }
            }))
            .unwrap(),
        );

        let registry: BTreeMap<String, Rules> = compile_schema::<Rules>(root)
            .unwrap()
            .into_iter()
            .map(|(path, configure)| (path, configure(Rules::default())))
            .collect();

        assert_eq!(registry["email"].applied, ["string", "<=64", "email", "required"]);
        assert_eq!(registry["items"].applied, ["array", ">=1", "required"]);
        assert_eq!(registry["items[*]"].applied, ["number", ">0"]);
        assert_eq!(registry["contact"].applied, ["string", "refine"]);

        let contact = &registry["contact"].checks[0];
        assert!(contact(&json!("jo@example.com")));
        assert!(contact(&json!("+15551234")));
        assert!(!contact(&json!("nobody")));
    }

    #[test]
    fn compiled_fields_are_reusable_across_threads() {
        let root = Arc::new(
            RootSchema::from_value(&json!({
                "properties": { "n": { "type": "integer", "minimum": 1 } }
            }))
            .unwrap(),
        );
        let compiled = Arc::new(compile_schema::<Rules>(root).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let compiled = Arc::clone(&compiled);
                std::thread::spawn(move || (compiled[0].1)(Rules::default()).applied)
            })
            .collect();
        for handle in handles {
            let applied = handle.join().unwrap();
            assert_eq!(applied, ["number", "refine", ">=1"]);
        }
    }
}
