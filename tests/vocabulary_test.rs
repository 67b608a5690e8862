//! Integration tests for custom keywords, vocabularies and dialects.

use std::sync::Arc;

use json_constraint::keywords::vocab;
use json_constraint::{
    compile, ChildDependency, CompileContext, CompileError, EvaluationOptions, InstanceLocator,
    JsonPointer, Keyword, KeywordConstraint, KeywordDescriptor, Located, MessageTemplates,
    SchemaRegistry, SchemaTarget, SpecVersion, Vocabulary, VocabularyRegistry,
};
use serde_json::{json, Value};

const PARITY: &str = "https://example.com/vocab/parity";

/// `x-even: true` rejects odd integers.
#[derive(Debug)]
struct Even {
    payload: Value,
}

fn even(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    if !payload.is_boolean() {
        return Err("expected a boolean".into());
    }
    Ok(Box::new(Even {
        payload: payload.clone(),
    }))
}

impl Keyword for Even {
    fn name(&self) -> &str {
        "x-even"
    }

    fn payload(&self) -> Value {
        self.payload.clone()
    }

    fn constraint(
        &self,
        _ctx: &mut CompileContext<'_>,
        _siblings: &[KeywordConstraint],
    ) -> Result<KeywordConstraint, CompileError> {
        if self.payload == Value::Bool(false) {
            return Ok(KeywordConstraint::skip("x-even"));
        }
        Ok(KeywordConstraint::new("x-even", |eval| {
            match eval.instance().as_i64() {
                Some(n) if n % 2 != 0 => eval.fail("x-even", [("received", json!(n))]),
                Some(_) => {}
                None => eval.mark_skipped(),
            }
        }))
    }
}

/// `x-propertyCount` annotates how many properties `properties` evaluated.
#[derive(Debug)]
struct PropertyCount;

fn property_count(_: &Value) -> Result<Box<dyn Keyword>, String> {
    Ok(Box::new(PropertyCount))
}

impl Keyword for PropertyCount {
    fn name(&self) -> &str {
        "x-propertyCount"
    }

    fn payload(&self) -> Value {
        Value::Bool(true)
    }

    fn constraint(
        &self,
        _ctx: &mut CompileContext<'_>,
        _siblings: &[KeywordConstraint],
    ) -> Result<KeywordConstraint, CompileError> {
        Ok(KeywordConstraint::new("x-propertyCount", |eval| {
            let count = eval
                .sibling_annotation("properties")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            eval.annotate(json!(count));
        })
        .after("properties"))
    }
}

/// `x-values` applies a schema to every property value.
#[derive(Debug)]
struct Values {
    payload: Value,
}

fn values(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    if !(payload.is_object() || payload.is_boolean()) {
        return Err("expected a schema".into());
    }
    Ok(Box::new(Values {
        payload: payload.clone(),
    }))
}

impl Keyword for Values {
    fn name(&self) -> &str {
        "x-values"
    }

    fn payload(&self) -> Value {
        self.payload.clone()
    }

    fn constraint(
        &self,
        ctx: &mut CompileContext<'_>,
        _siblings: &[KeywordConstraint],
    ) -> Result<KeywordConstraint, CompileError> {
        let target = ctx.subschema(&["x-values"])?;
        let locator = InstanceLocator::custom(|instance, _| {
            instance
                .as_object()
                .map(|map| {
                    map.iter()
                        .map(|(name, value)| Located::child(name.clone(), value))
                        .collect()
                })
                .unwrap_or_default()
        });
        Ok(KeywordConstraint::new("x-values", |eval| {
            if eval.children().iter().any(|child| !child.results.is_valid()) {
                eval.fail_plain();
            }
        })
        .with_child(ChildDependency::new(
            SchemaTarget::Static(target),
            JsonPointer::from_segments(["x-values"]),
            locator,
        )))
    }
}

/// A keyword that waits for a sibling named by its payload.
#[derive(Debug)]
struct Waits {
    name: &'static str,
    payload: Value,
}

impl Keyword for Waits {
    fn name(&self) -> &str {
        self.name
    }

    fn payload(&self) -> Value {
        self.payload.clone()
    }

    fn constraint(
        &self,
        _ctx: &mut CompileContext<'_>,
        _siblings: &[KeywordConstraint],
    ) -> Result<KeywordConstraint, CompileError> {
        let other = self.payload.as_str().unwrap_or_default().to_string();
        Ok(KeywordConstraint::new(self.name, |_| {}).after(other))
    }
}

fn waits_a(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    Ok(Box::new(Waits {
        name: "x-a",
        payload: payload.clone(),
    }))
}

fn waits_b(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    Ok(Box::new(Waits {
        name: "x-b",
        payload: payload.clone(),
    }))
}

fn parity_options() -> EvaluationOptions {
    let mut registry = VocabularyRegistry::standard();
    registry.register(Vocabulary::new(
        PARITY,
        vec![
            KeywordDescriptor::new("x-even", SpecVersion::ALL, even),
            KeywordDescriptor::new("x-propertyCount", SpecVersion::ALL, property_count),
            KeywordDescriptor::new("x-values", SpecVersion::ALL, values),
            KeywordDescriptor::new("x-a", SpecVersion::ALL, waits_a),
            KeywordDescriptor::new("x-b", SpecVersion::ALL, waits_b),
        ],
    ));
    EvaluationOptions::default().with_vocabularies(Arc::new(registry))
}

fn with_meta_schema(options: EvaluationOptions, vocabularies: Value) -> EvaluationOptions {
    let registry = SchemaRegistry::new();
    registry
        .register_document(
            "https://example.com/meta",
            json!({
                "$schema": "https://json-schema.org/draft/2020-12/schema",
                "$id": "https://example.com/meta",
                "$vocabulary": vocabularies
            }),
        )
        .unwrap();
    options.with_schema_registry(Arc::new(registry))
}

// === Custom Keywords ===

mod custom_keywords {
    use super::*;

    #[test]
    fn registered_keyword_asserts() {
        let options = parity_options();
        let compiled = compile(&json!({ "x-even": true }), &options).unwrap();
        assert!(compiled.is_valid(&json!(4)));
        assert!(compiled.is_valid(&json!("odd strings are fine")));
        let results = compiled.evaluate(&json!(3)).unwrap();
        assert_eq!(
            results.error("x-even").unwrap().substitution("received"),
            Some(&json!(3))
        );

        // without the vocabulary the keyword is just an annotation
        let plain = compile(&json!({ "x-even": true }), &EvaluationOptions::default()).unwrap();
        assert!(plain.is_valid(&json!(3)));
    }

    #[test]
    fn custom_message_template() {
        let options = parity_options()
            .with_messages(MessageTemplates::new().with_template("x-even", "[[received]] is odd"));
        let compiled = compile(&json!({ "x-even": true }), &options).unwrap();
        let results = compiled.evaluate(&json!(7)).unwrap();
        let errors = results.collect_errors(compiled.options().messages());
        assert_eq!(errors[0].message, "7 is odd");
    }

    #[test]
    fn factory_errors_are_malformed_keywords() {
        let err = compile(&json!({ "x-even": "yes" }), &parity_options()).unwrap_err();
        match err {
            CompileError::MalformedKeyword { keyword, message, .. } => {
                assert_eq!(keyword, "x-even");
                assert_eq!(message, "expected a boolean");
            }
            other => panic!("expected a malformed keyword, got {other:?}"),
        }
    }

    #[test]
    fn sibling_dependency_orders_evaluation() {
        // declared before `properties`, still sees its annotation
        let schema = json!({
            "x-propertyCount": true,
            "properties": { "a": true, "b": true, "c": true }
        });
        let compiled = compile(&schema, &parity_options()).unwrap();
        let order: Vec<&str> = compiled
            .constraint(compiled.root())
            .keywords()
            .iter()
            .map(KeywordConstraint::keyword)
            .collect();
        assert_eq!(order, ["properties", "x-propertyCount"]);

        let results = compiled.evaluate(&json!({ "a": 1, "c": 2, "z": 3 })).unwrap();
        assert_eq!(results.annotation("x-propertyCount"), Some(&json!(2)));
    }

    #[test]
    fn skipped_dependency_skips_dependent() {
        let schema = json!({
            "x-propertyCount": true,
            "properties": { "a": true }
        });
        let compiled = compile(&schema, &parity_options()).unwrap();
        let results = compiled.evaluate(&json!([1, 2])).unwrap();
        assert!(results.is_valid());
        assert!(results.annotation("x-propertyCount").is_none());
    }

    #[test]
    fn child_dependencies_on_custom_keywords() {
        let schema = json!({ "x-values": { "x-even": true } });
        let compiled = compile(&schema, &parity_options()).unwrap();
        assert!(compiled.is_valid(&json!({ "a": 2, "b": 4 })));
        let results = compiled.evaluate(&json!({ "a": 2, "b": 5 })).unwrap();
        assert!(!results.is_valid());
        let errors = results.collect_errors(compiled.options().messages());
        let leaf = errors.iter().find(|e| e.keyword == "x-even").unwrap();
        assert_eq!(leaf.instance_location.to_string(), "/b");
        assert_eq!(leaf.evaluation_path.to_string(), "/x-values/x-even");
    }

    #[test]
    fn cyclic_sibling_dependencies_fail_compilation() {
        let schema = json!({ "x-a": "x-b", "x-b": "x-a" });
        let err = compile(&schema, &parity_options()).unwrap_err();
        assert!(matches!(err, CompileError::CyclicKeywordDependency { .. }));

        // a dependency on an absent sibling is ignored
        let schema = json!({ "x-a": "x-missing" });
        assert!(compile(&schema, &parity_options()).is_ok());
    }

    #[test]
    fn later_registration_replaces_vocabulary() {
        let mut registry = VocabularyRegistry::standard();
        registry.register(Vocabulary::new(
            PARITY,
            vec![KeywordDescriptor::new("x-even", SpecVersion::ALL, even)],
        ));
        registry.register(Vocabulary::new(PARITY, vec![]));
        let options = EvaluationOptions::default().with_vocabularies(Arc::new(registry));
        let compiled = compile(&json!({ "x-even": true }), &options).unwrap();
        assert!(compiled.is_valid(&json!(3)));
    }
}

// === Dialects And $vocabulary ===

mod dialects {
    use super::*;

    #[test]
    fn unknown_required_vocabulary_is_rejected() {
        let options = with_meta_schema(
            EvaluationOptions::default(),
            json!({
                (vocab::CORE_2020_12): true,
                "https://example.com/vocab/unknown": true
            }),
        );
        let err = compile(&json!({ "$schema": "https://example.com/meta" }), &options).unwrap_err();
        match err {
            CompileError::UnknownVocabularyRequired { vocabulary } => {
                assert_eq!(vocabulary, "https://example.com/vocab/unknown");
            }
            other => panic!("expected an unknown vocabulary error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_optional_vocabulary_is_ignored() {
        let options = with_meta_schema(
            EvaluationOptions::default(),
            json!({
                (vocab::CORE_2020_12): true,
                (vocab::VALIDATION_2020_12): true,
                "https://example.com/vocab/unknown": false
            }),
        );
        let compiled = compile(
            &json!({ "$schema": "https://example.com/meta", "minimum": 5 }),
            &options,
        )
        .unwrap();
        assert!(!compiled.is_valid(&json!(3)));
    }

    #[test]
    fn inactive_vocabularies_become_annotations() {
        let options = with_meta_schema(
            EvaluationOptions::default(),
            json!({
                (vocab::CORE_2020_12): true,
                (vocab::APPLICATOR_2020_12): true
            }),
        );
        let schema = json!({
            "$schema": "https://example.com/meta",
            "properties": { "a": { "minimum": 5 } }
        });
        let compiled = compile(&schema, &options).unwrap();
        assert!(compiled.is_valid(&json!({ "a": 1 })));
    }

    #[test]
    fn custom_vocabulary_enabled_by_meta_schema() {
        let options = with_meta_schema(
            parity_options(),
            json!({ (vocab::CORE_2020_12): true, PARITY: true }),
        );
        let compiled = compile(
            &json!({ "$schema": "https://example.com/meta", "x-even": true }),
            &options,
        )
        .unwrap();
        assert!(!compiled.is_valid(&json!(3)));
    }

    #[test]
    fn format_assertion_vocabulary_asserts() {
        let options = with_meta_schema(
            EvaluationOptions::default(),
            json!({
                (vocab::CORE_2020_12): true,
                (vocab::FORMAT_ASSERTION_2020_12): true
            }),
        );
        let compiled = compile(
            &json!({ "$schema": "https://example.com/meta", "format": "ipv4" }),
            &options,
        )
        .unwrap();
        assert!(compiled.is_valid(&json!("10.0.0.1")));
        assert!(!compiled.is_valid(&json!("10.0.0.256")));
    }

    #[test]
    fn schema_declaring_unknown_required_vocabulary() {
        let schema = json!({
            "$vocabulary": { "https://example.com/vocab/unknown": true }
        });
        let err = compile(&schema, &EvaluationOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnknownVocabularyRequired { .. }));
    }

    #[test]
    fn unregistered_meta_schema_is_rejected() {
        let err = compile(
            &json!({ "$schema": "https://example.com/missing-meta" }),
            &EvaluationOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::UnknownMetaSchema { .. }));
    }

    #[test]
    fn nested_schema_keyword_switches_draft() {
        let schema = json!({
            "properties": {
                "legacy": {
                    "$schema": "http://json-schema.org/draft-07/schema#",
                    "dependencies": { "a": ["b"] }
                }
            }
        });
        let compiled = compile(&schema, &EvaluationOptions::default()).unwrap();
        assert!(!compiled.is_valid(&json!({ "legacy": { "a": 1 } })));
        assert!(compiled.is_valid(&json!({ "legacy": { "a": 1, "b": 2 } })));
    }
}
