//! Integration tests for references, anchors and the schema registry.

use std::sync::Arc;

use json_constraint::{
    compile, compile_uri, AbortReason, CompileError, EvaluationError, EvaluationOptions,
    MirrorFetcher, SchemaRegistry,
};
use serde_json::{json, Value};

fn options() -> EvaluationOptions {
    EvaluationOptions::default()
}

fn with_documents(documents: &[(&str, Value)]) -> EvaluationOptions {
    let registry = SchemaRegistry::new();
    for (uri, document) in documents {
        registry.register_document(uri, document.clone()).unwrap();
    }
    options().with_schema_registry(Arc::new(registry))
}

// === Static References ===

mod static_refs {
    use super::*;

    #[test]
    fn recursive_tree() {
        let schema = json!({
            "type": "object",
            "properties": {
                "value": { "type": "integer" },
                "children": { "type": "array", "items": { "$ref": "#" } }
            }
        });
        let compiled = compile(&schema, &options()).unwrap();
        let deep = json!({
            "value": 1,
            "children": [{ "value": 2, "children": [{ "value": 3, "children": [] }] }]
        });
        assert!(compiled.is_valid(&deep));

        let bad = json!({ "children": [{ "children": [{ "value": "three" }] }] });
        let results = compiled.evaluate(&bad).unwrap();
        assert!(!results.is_valid());
        let errors = results.collect_errors(compiled.options().messages());
        let leaf = errors.iter().find(|e| e.keyword == "type").unwrap();
        assert_eq!(leaf.instance_location.to_string(), "/children/0/children/0/value");
    }

    #[test]
    fn mutual_recursion_compiles_once() {
        let schema = json!({
            "$defs": {
                "a": { "properties": { "b": { "$ref": "#/$defs/b" } }, "required": ["b"] },
                "b": { "properties": { "a": { "$ref": "#/$defs/a" } } }
            },
            "$ref": "#/$defs/a"
        });
        let compiled = compile(&schema, &options()).unwrap();
        assert!(compiled.is_valid(&json!({ "b": { "a": { "b": {} } } })));
        assert!(!compiled.is_valid(&json!({ "b": { "a": {} } })));
    }

    #[test]
    fn shared_definition_is_one_constraint() {
        let schema = json!({
            "$defs": { "id": { "type": "string" } },
            "properties": {
                "a": { "$ref": "#/$defs/id" },
                "b": { "$ref": "#/$defs/id" }
            }
        });
        let compiled = compile(&schema, &options()).unwrap();
        let ids = compiled
            .constraints()
            .iter()
            .filter(|c| c.location().to_string() == "/$defs/id")
            .count();
        assert_eq!(ids, 1);
    }

    #[test]
    fn anchors_resolve() {
        let schema = json!({
            "$defs": { "positive": { "$anchor": "positive", "minimum": 0 } },
            "$ref": "#positive"
        });
        let compiled = compile(&schema, &options()).unwrap();
        assert!(compiled.is_valid(&json!(1)));
        let results = compiled.evaluate(&json!(-1)).unwrap();
        assert_eq!(results.error("$ref").unwrap().key, "$ref");
    }

    #[test]
    fn draft7_plain_name_identifiers() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "definitions": { "flag": { "$id": "#flag", "type": "boolean" } },
            "properties": { "on": { "$ref": "#flag" } }
        });
        let compiled = compile(&schema, &options()).unwrap();
        assert!(compiled.is_valid(&json!({ "on": true })));
        assert!(!compiled.is_valid(&json!({ "on": "yes" })));
    }

    #[test]
    fn escaped_pointer_segments() {
        let schema = json!({
            "$defs": { "a/b": { "type": "string" }, "c%d": { "type": "integer" } },
            "properties": {
                "x": { "$ref": "#/$defs/a~1b" },
                "y": { "$ref": "#/$defs/c%25d" }
            }
        });
        let compiled = compile(&schema, &options()).unwrap();
        assert!(compiled.is_valid(&json!({ "x": "s", "y": 1 })));
        assert!(!compiled.is_valid(&json!({ "x": 1 })));
        assert!(!compiled.is_valid(&json!({ "y": "s" })));
    }

    #[test]
    fn embedded_resources_change_the_base() {
        let schema = json!({
            "$id": "https://example.com/root.json",
            "$defs": {
                "inner": {
                    "$id": "nested/inner.json",
                    "$defs": { "leaf": { "type": "boolean" } },
                    "$ref": "#/$defs/leaf"
                }
            },
            "$ref": "nested/inner.json"
        });
        let compiled = compile(&schema, &options()).unwrap();
        assert!(compiled.is_valid(&json!(true)));
        assert!(!compiled.is_valid(&json!("true")));
    }

    #[test]
    fn unresolvable_reference_fails_compilation() {
        let err = compile(&json!({ "$ref": "#/$defs/missing" }), &options()).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvableReference { .. }));

        let err = compile(&json!({ "$ref": "https://example.com/nowhere.json" }), &options())
            .unwrap_err();
        assert!(matches!(err, CompileError::UnresolvableReference { .. }));
    }

    #[test]
    fn draft7_ref_hides_siblings() {
        let draft7 = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "definitions": { "s": { "type": "string" } },
            "$ref": "#/definitions/s",
            "maxLength": 1
        });
        assert!(compile(&draft7, &options()).unwrap().is_valid(&json!("abc")));

        let modern = json!({
            "$defs": { "s": { "type": "string" } },
            "$ref": "#/$defs/s",
            "maxLength": 1
        });
        assert!(!compile(&modern, &options()).unwrap().is_valid(&json!("abc")));
    }

    #[test]
    fn draft7_ref_keeps_a_sibling_id_from_changing_the_base() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "$id": "http://localhost:1234/sibling_id/base/",
            "definitions": {
                "foo": {
                    "$id": "http://localhost:1234/sibling_id/foo.json",
                    "type": "string"
                },
                "base_foo": { "$id": "foo.json", "type": "number" }
            },
            "allOf": [{
                "$id": "http://localhost:1234/sibling_id/",
                "$ref": "foo.json"
            }]
        });
        let compiled = compile(&schema, &options()).unwrap();
        assert!(compiled.is_valid(&json!(1)));
        assert!(!compiled.is_valid(&json!("a")));
    }

    #[test]
    fn subschemas_named_like_data_keywords_are_indexed() {
        let schema = json!({
            "properties": { "default": { "$anchor": "d", "type": "string" } },
            "$ref": "#d"
        });
        let compiled = compile(&schema, &options()).unwrap();
        assert!(compiled.is_valid(&json!("x")));
        assert!(!compiled.is_valid(&json!(1)));
    }

    #[test]
    fn self_reference_hits_the_depth_guard() {
        let guarded = options().max_depth(32);
        let compiled = compile(&json!({ "$ref": "#" }), &guarded).unwrap();
        let err = compiled.evaluate(&json!(1)).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Aborted {
                reason: AbortReason::MaxDepth(32),
                ..
            }
        ));
        assert!(!compiled.is_valid(&json!(1)));
    }
}

// === Dynamic References ===

mod dynamic_refs {
    use super::*;

    fn tree(keyword: &str, reference: &str, anchor: (&str, Value)) -> Value {
        let mut tree = json!({
            "$id": "https://example.com/tree",
            "type": "object",
            "properties": {
                "data": true,
                "children": { "type": "array", "items": { keyword: reference } }
            }
        });
        tree[anchor.0] = anchor.1;
        tree
    }

    #[test]
    fn dynamic_ref_extends_recursive_schema() {
        let tree = tree("$dynamicRef", "#node", ("$dynamicAnchor", json!("node")));
        let strict = json!({
            "$id": "https://example.com/strict-tree",
            "$dynamicAnchor": "node",
            "$ref": "tree",
            "unevaluatedProperties": false,
            "$defs": { "tree": tree.clone() }
        });

        let loose = compile(&tree, &options()).unwrap();
        let strict = compile(&strict, &options()).unwrap();

        let misspelled = json!({ "children": [{ "daat": 1 }] });
        assert!(loose.is_valid(&misspelled));
        assert!(!strict.is_valid(&misspelled));
        assert!(strict.is_valid(&json!({ "children": [{ "data": 1, "children": [] }] })));
    }

    #[test]
    fn dynamic_ref_without_matching_anchor_is_static() {
        let schema = json!({
            "$id": "https://example.com/list",
            "$defs": { "item": { "$dynamicAnchor": "item", "type": "string" } },
            "type": "array",
            "items": { "$dynamicRef": "#/$defs/item" }
        });
        let compiled = compile(&schema, &options()).unwrap();
        assert!(compiled.is_valid(&json!(["a"])));
        assert!(!compiled.is_valid(&json!([1])));
    }

    #[test]
    fn recursive_ref_extends_recursive_schema() {
        let mut tree = tree("$recursiveRef", "#", ("$recursiveAnchor", json!(true)));
        tree["$schema"] = json!("https://json-schema.org/draft/2019-09/schema");
        let strict = json!({
            "$schema": "https://json-schema.org/draft/2019-09/schema",
            "$id": "https://example.com/strict-tree",
            "$recursiveAnchor": true,
            "$ref": "tree",
            "unevaluatedProperties": false,
            "$defs": { "tree": tree.clone() }
        });

        let loose = compile(&tree, &options()).unwrap();
        let strict = compile(&strict, &options()).unwrap();

        let misspelled = json!({ "children": [{ "daat": 1 }] });
        assert!(loose.is_valid(&misspelled));
        assert!(!strict.is_valid(&misspelled));
    }

    #[test]
    fn recursive_ref_without_anchor_is_static() {
        let schema = json!({
            "$schema": "https://json-schema.org/draft/2019-09/schema",
            "properties": { "next": { "$recursiveRef": "#" } },
            "required": ["id"]
        });
        let compiled = compile(&schema, &options()).unwrap();
        assert!(compiled.is_valid(&json!({ "id": 1, "next": { "id": 2 } })));
        assert!(!compiled.is_valid(&json!({ "id": 1, "next": {} })));
    }
}

// === Schema Registry ===

mod registry {
    use super::*;

    fn money() -> Value {
        json!({
            "$defs": {
                "amount": { "type": "integer", "minimum": 0 },
                "currency": { "type": "string", "pattern": "^[A-Z]{3}$" }
            },
            "type": "object",
            "properties": {
                "amount": { "$ref": "#/$defs/amount" },
                "currency": { "$ref": "#/$defs/currency" }
            },
            "required": ["amount", "currency"]
        })
    }

    #[test]
    fn references_into_registered_documents() {
        let options = with_documents(&[("https://example.com/money.json", money())]);
        let schema = json!({
            "properties": { "total": { "$ref": "https://example.com/money.json" } }
        });
        let compiled = compile(&schema, &options).unwrap();
        assert!(compiled.is_valid(&json!({ "total": { "amount": 5, "currency": "EUR" } })));
        assert!(!compiled.is_valid(&json!({ "total": { "amount": 5, "currency": "euro" } })));
    }

    #[test]
    fn compile_uri_selects_a_subschema() {
        let options = with_documents(&[("https://example.com/money.json", money())]);
        let compiled = compile_uri("https://example.com/money.json#/$defs/amount", &options).unwrap();
        assert!(compiled.is_valid(&json!(3)));
        assert!(!compiled.is_valid(&json!(-3)));

        let err = compile_uri("https://example.com/other.json", &options).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvableReference { .. }));
    }

    #[test]
    fn compiled_schema_does_not_see_later_registrations() {
        let registry = Arc::new(SchemaRegistry::new());
        registry
            .register_document("https://example.com/id.json", json!({ "type": "string" }))
            .unwrap();
        let options = options().with_schema_registry(Arc::clone(&registry));
        let compiled = compile(&json!({ "$ref": "https://example.com/id.json" }), &options).unwrap();

        registry
            .register_document("https://example.com/id.json", json!({ "type": "integer" }))
            .unwrap();
        assert!(compiled.is_valid(&json!("abc")));
        assert!(!compiled.is_valid(&json!(1)));
    }

    #[test]
    fn mirror_fetcher_supplies_unknown_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("item.json"),
            r#"{ "properties": { "id": { "$ref": "common.json#/$defs/id" } } }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("common.json"),
            r#"{ "$defs": { "id": { "type": "string", "minLength": 1 } } }"#,
        )
        .unwrap();

        let registry = SchemaRegistry::new().with_fetcher(Arc::new(MirrorFetcher::new(
            "https://example.com/schemas/",
            dir.path(),
        )));
        let options = options().with_schema_registry(Arc::new(registry));
        let schema = json!({ "items": { "$ref": "https://example.com/schemas/item.json" } });
        let compiled = compile(&schema, &options).unwrap();

        assert!(compiled.is_valid(&json!([{ "id": "a" }])));
        assert!(!compiled.is_valid(&json!([{ "id": "" }])));
        assert!(options.schemas().contains("https://example.com/schemas/common.json"));
    }

    #[test]
    fn fetch_failures_are_compile_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::new().with_fetcher(Arc::new(MirrorFetcher::new(
            "https://example.com/schemas/",
            dir.path(),
        )));
        let options = options().with_schema_registry(Arc::new(registry));
        let err = compile(&json!({ "$ref": "https://example.com/schemas/missing.json" }), &options)
            .unwrap_err();
        assert!(matches!(err, CompileError::Load(_)));
    }
}
