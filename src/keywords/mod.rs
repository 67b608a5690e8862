//! The standard keyword set and the vocabularies that group it.
//!
//! Most keywords are a [`Simple`]: the raw payload plus a build function.
//! The factory checks the payload shape up front so a malformed keyword is
//! reported before anything is compiled.

use std::fmt;

use serde_json::{Map, Number, Value};

use crate::compiler::CompileContext;
use crate::error::CompileError;
use crate::keyword::{ChildDependency, InstanceLocator, Keyword, KeywordConstraint, SchemaTarget};
use crate::pointer::JsonPointer;
use crate::types::SpecVersion;
use crate::vocabulary::{KeywordDescriptor, Vocabulary};

pub mod annotation;
pub mod applicator;
pub mod format;
pub mod references;
pub mod unevaluated;
pub mod validation;

/// Vocabulary URIs.
pub mod vocab {
    pub const CORE_2019_09: &str = "https://json-schema.org/draft/2019-09/vocab/core";
    pub const APPLICATOR_2019_09: &str = "https://json-schema.org/draft/2019-09/vocab/applicator";
    pub const VALIDATION_2019_09: &str = "https://json-schema.org/draft/2019-09/vocab/validation";
    pub const META_DATA_2019_09: &str = "https://json-schema.org/draft/2019-09/vocab/meta-data";
    pub const FORMAT_2019_09: &str = "https://json-schema.org/draft/2019-09/vocab/format";
    pub const CONTENT_2019_09: &str = "https://json-schema.org/draft/2019-09/vocab/content";

    pub const CORE_2020_12: &str = "https://json-schema.org/draft/2020-12/vocab/core";
    pub const APPLICATOR_2020_12: &str = "https://json-schema.org/draft/2020-12/vocab/applicator";
    pub const UNEVALUATED_2020_12: &str = "https://json-schema.org/draft/2020-12/vocab/unevaluated";
    pub const VALIDATION_2020_12: &str = "https://json-schema.org/draft/2020-12/vocab/validation";
    pub const META_DATA_2020_12: &str = "https://json-schema.org/draft/2020-12/vocab/meta-data";
    pub const FORMAT_ANNOTATION_2020_12: &str =
        "https://json-schema.org/draft/2020-12/vocab/format-annotation";
    pub const FORMAT_ASSERTION_2020_12: &str =
        "https://json-schema.org/draft/2020-12/vocab/format-assertion";
    pub const CONTENT_2020_12: &str = "https://json-schema.org/draft/2020-12/vocab/content";

    pub const CORE_NEXT: &str = "https://json-schema.org/draft/next/vocab/core";
    pub const APPLICATOR_NEXT: &str = "https://json-schema.org/draft/next/vocab/applicator";
    pub const UNEVALUATED_NEXT: &str = "https://json-schema.org/draft/next/vocab/unevaluated";
    pub const VALIDATION_NEXT: &str = "https://json-schema.org/draft/next/vocab/validation";
    pub const META_DATA_NEXT: &str = "https://json-schema.org/draft/next/vocab/meta-data";
    pub const FORMAT_ANNOTATION_NEXT: &str =
        "https://json-schema.org/draft/next/vocab/format-annotation";
    pub const FORMAT_ASSERTION_NEXT: &str =
        "https://json-schema.org/draft/next/vocab/format-assertion";
    pub const CONTENT_NEXT: &str = "https://json-schema.org/draft/next/vocab/content";

    /// Keywords that only exist in drafts 6 and 7.
    pub const DRAFT7_LEGACY: &str = "http://json-schema.org/draft-07/schema#";

    /// Core vocabularies are always active, whatever `$vocabulary` says.
    pub const CORE: &[&str] = &[CORE_2019_09, CORE_2020_12, CORE_NEXT];

    pub const FORMAT_ASSERTION: &[&str] = &[FORMAT_ASSERTION_2020_12, FORMAT_ASSERTION_NEXT];
}

/// Run before everything else.
pub const FIRST: i64 = i64::MIN;
/// Run after every keyword that could annotate.
pub const LAST: i64 = i64::MAX;
/// `then`/`else`.
pub const CONDITIONAL: i64 = 10;

/// Builds a keyword's constraint from its raw payload.
pub type Build = fn(&Value, &mut CompileContext<'_>, &[KeywordConstraint]) -> Result<KeywordConstraint, CompileError>;

/// A keyword kept as its raw payload plus the function that compiles it.
///
/// Without a build function the keyword compiles to a skip constraint.
pub struct Simple {
    name: &'static str,
    payload: Value,
    build: Option<Build>,
}

impl Simple {
    pub fn boxed(name: &'static str, payload: &Value, build: Build) -> Box<dyn Keyword> {
        Box::new(Self {
            name,
            payload: payload.clone(),
            build: Some(build),
        })
    }

    /// A keyword that only carries its payload, e.g. `$id` or `$defs`.
    pub fn inert(name: &'static str, payload: &Value) -> Box<dyn Keyword> {
        Box::new(Self {
            name,
            payload: payload.clone(),
            build: None,
        })
    }
}

impl fmt::Debug for Simple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simple")
            .field("name", &self.name)
            .field("payload", &self.payload)
            .finish()
    }
}

impl Keyword for Simple {
    fn name(&self) -> &str {
        self.name
    }

    fn payload(&self) -> Value {
        self.payload.clone()
    }

    fn constraint(
        &self,
        ctx: &mut CompileContext<'_>,
        siblings: &[KeywordConstraint],
    ) -> Result<KeywordConstraint, CompileError> {
        match self.build {
            Some(build) => build(&self.payload, ctx, siblings),
            None => Ok(KeywordConstraint::skip(self.name)),
        }
    }
}

/// A keyword no active vocabulary defines. It never fails and annotates its
/// raw payload.
#[derive(Debug, Clone)]
pub struct Unrecognized {
    name: String,
    payload: Value,
}

impl Unrecognized {
    pub fn new(name: impl Into<String>, payload: &Value) -> Self {
        Self {
            name: name.into(),
            payload: payload.clone(),
        }
    }
}

impl Keyword for Unrecognized {
    fn name(&self) -> &str {
        &self.name
    }

    fn payload(&self) -> Value {
        self.payload.clone()
    }

    fn constraint(
        &self,
        _ctx: &mut CompileContext<'_>,
        _siblings: &[KeywordConstraint],
    ) -> Result<KeywordConstraint, CompileError> {
        let payload = self.payload.clone();
        Ok(KeywordConstraint::new(self.name.clone(), move |eval| {
            eval.annotate(payload.clone())
        }))
    }
}

// Payload shape checks shared by factories and build functions.

pub(crate) fn expect_schema(payload: &Value) -> Result<(), String> {
    match payload {
        Value::Bool(_) | Value::Object(_) => Ok(()),
        _ => Err("expected a schema (object or boolean)".into()),
    }
}

pub(crate) fn expect_schema_map(payload: &Value) -> Result<&Map<String, Value>, String> {
    let map = payload
        .as_object()
        .ok_or("expected an object of schemas")?;
    for (key, value) in map {
        expect_schema(value).map_err(|_| format!("value for \"{key}\" is not a schema"))?;
    }
    Ok(map)
}

pub(crate) fn expect_schema_array(payload: &Value) -> Result<&Vec<Value>, String> {
    let items = payload
        .as_array()
        .ok_or("expected a non-empty array of schemas")?;
    if items.is_empty() {
        return Err("expected a non-empty array of schemas".into());
    }
    for (i, item) in items.iter().enumerate() {
        expect_schema(item).map_err(|_| format!("item {i} is not a schema"))?;
    }
    Ok(items)
}

pub(crate) fn expect_number(payload: &Value) -> Result<&Number, String> {
    payload.as_number().ok_or_else(|| "expected a number".into())
}

pub(crate) fn expect_non_negative_integer(payload: &Value) -> Result<u64, String> {
    let error = || String::from("expected a non-negative integer");
    let number = payload.as_number().ok_or_else(error)?;
    if let Some(n) = number.as_u64() {
        return Ok(n);
    }
    match number.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        _ => Err(error()),
    }
}

pub(crate) fn expect_string(payload: &Value) -> Result<&str, String> {
    payload.as_str().ok_or_else(|| "expected a string".into())
}

pub(crate) fn expect_bool(payload: &Value) -> Result<bool, String> {
    payload.as_bool().ok_or_else(|| "expected a boolean".into())
}

pub(crate) fn expect_string_array(payload: &Value) -> Result<Vec<String>, String> {
    payload
        .as_array()
        .ok_or("expected an array of strings")?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| "expected an array of strings".into())
        })
        .collect()
}

/// Turn a shape error into a `MalformedKeyword` for the current node.
pub(crate) fn shape<T>(ctx: &CompileContext<'_>, keyword: &str, checked: Result<T, String>) -> Result<T, CompileError> {
    checked.map_err(|message| ctx.malformed(keyword, message))
}

/// Relative path of a child dependency, e.g. `/properties/name`.
pub(crate) fn path(segments: &[&str]) -> JsonPointer {
    JsonPointer::from_segments(segments.iter().copied())
}

/// One child evaluated at the same instance location.
pub(crate) fn same_location(target: SchemaTarget, keyword: &str) -> ChildDependency {
    ChildDependency::new(target, path(&[keyword]), InstanceLocator::Same)
}

fn descriptor(name: &str, versions: &[SpecVersion], factory: crate::keyword::KeywordFactory) -> KeywordDescriptor {
    KeywordDescriptor::new(name, versions, factory)
}

/// Every standard vocabulary, oldest first.
pub fn standard_vocabularies() -> Vec<Vocabulary> {
    use SpecVersion::{Draft201909, Draft202012, Draft6, Draft7, DraftNext};

    const SINCE_6: &[SpecVersion] = &[Draft6, Draft7, Draft201909];
    const SINCE_7: &[SpecVersion] = &[Draft7, Draft201909];
    const ONLY_2019: &[SpecVersion] = &[Draft201909];
    const LEGACY: &[SpecVersion] = &[Draft6, Draft7];

    let mut vocabularies = vec![
        Vocabulary::new(
            vocab::DRAFT7_LEGACY,
            vec![
                descriptor("definitions", LEGACY, references::definitions),
                descriptor("dependencies", LEGACY, applicator::dependencies),
            ],
        ),
        Vocabulary::new(
            vocab::CORE_2019_09,
            vec![
                descriptor("$schema", SINCE_6, references::schema).with_priority(FIRST),
                descriptor("$vocabulary", ONLY_2019, references::vocabulary).with_priority(FIRST),
                descriptor("$id", SINCE_6, references::id),
                descriptor("$anchor", ONLY_2019, references::anchor),
                descriptor("$recursiveAnchor", ONLY_2019, references::recursive_anchor),
                descriptor("$ref", SINCE_6, references::reference),
                descriptor("$recursiveRef", ONLY_2019, references::recursive_reference),
                descriptor("$comment", SINCE_7, references::comment),
                descriptor("$defs", ONLY_2019, references::defs),
            ],
        ),
        Vocabulary::new(
            vocab::APPLICATOR_2019_09,
            vec![
                descriptor("allOf", SINCE_6, applicator::all_of),
                descriptor("anyOf", SINCE_6, applicator::any_of),
                descriptor("oneOf", SINCE_6, applicator::one_of),
                descriptor("not", SINCE_6, applicator::not),
                descriptor("if", SINCE_7, applicator::if_),
                descriptor("then", SINCE_7, applicator::then).with_priority(CONDITIONAL),
                descriptor("else", SINCE_7, applicator::else_).with_priority(CONDITIONAL),
                descriptor("dependentSchemas", ONLY_2019, applicator::dependent_schemas),
                descriptor("items", SINCE_6, applicator::legacy_items),
                descriptor("additionalItems", SINCE_6, applicator::additional_items),
                descriptor("contains", SINCE_6, applicator::contains),
                descriptor("properties", SINCE_6, applicator::properties),
                descriptor("patternProperties", SINCE_6, applicator::pattern_properties),
                descriptor("additionalProperties", SINCE_6, applicator::additional_properties),
                descriptor("propertyNames", SINCE_6, applicator::property_names),
                descriptor("unevaluatedItems", ONLY_2019, unevaluated::unevaluated_items)
                    .with_priority(LAST),
                descriptor("unevaluatedProperties", ONLY_2019, unevaluated::unevaluated_properties)
                    .with_priority(LAST),
            ],
        ),
        Vocabulary::new(vocab::VALIDATION_2019_09, validation_keywords(SINCE_6, ONLY_2019)),
        Vocabulary::new(vocab::META_DATA_2019_09, meta_data_keywords(SINCE_6, SINCE_7, ONLY_2019)),
        Vocabulary::new(
            vocab::FORMAT_2019_09,
            vec![descriptor("format", SINCE_6, format::format)],
        ),
        Vocabulary::new(
            vocab::CONTENT_2019_09,
            vec![
                descriptor("contentEncoding", SINCE_7, annotation::content_encoding),
                descriptor("contentMediaType", SINCE_7, annotation::content_media_type),
                descriptor("contentSchema", ONLY_2019, annotation::content_schema),
            ],
        ),
    ];

    let generations: [(&[SpecVersion], [&str; 8]); 2] = [
        (
            &[Draft202012],
            [
                vocab::CORE_2020_12,
                vocab::APPLICATOR_2020_12,
                vocab::UNEVALUATED_2020_12,
                vocab::VALIDATION_2020_12,
                vocab::META_DATA_2020_12,
                vocab::FORMAT_ANNOTATION_2020_12,
                vocab::FORMAT_ASSERTION_2020_12,
                vocab::CONTENT_2020_12,
            ],
        ),
        (
            &[DraftNext],
            [
                vocab::CORE_NEXT,
                vocab::APPLICATOR_NEXT,
                vocab::UNEVALUATED_NEXT,
                vocab::VALIDATION_NEXT,
                vocab::META_DATA_NEXT,
                vocab::FORMAT_ANNOTATION_NEXT,
                vocab::FORMAT_ASSERTION_NEXT,
                vocab::CONTENT_NEXT,
            ],
        ),
    ];
    for (versions, [core_id, applicator_id, unevaluated_id, validation_id, meta_id, format_annotation_id, format_assertion_id, content_id]) in generations {
        vocabularies.extend([
            Vocabulary::new(
                core_id,
                vec![
                    descriptor("$schema", versions, references::schema).with_priority(FIRST),
                    descriptor("$vocabulary", versions, references::vocabulary).with_priority(FIRST),
                    descriptor("$id", versions, references::id),
                    descriptor("$anchor", versions, references::anchor),
                    descriptor("$dynamicAnchor", versions, references::dynamic_anchor),
                    descriptor("$ref", versions, references::reference),
                    descriptor("$dynamicRef", versions, references::dynamic_reference),
                    descriptor("$comment", versions, references::comment),
                    descriptor("$defs", versions, references::defs),
                ],
            ),
            Vocabulary::new(
                applicator_id,
                vec![
                    descriptor("allOf", versions, applicator::all_of),
                    descriptor("anyOf", versions, applicator::any_of),
                    descriptor("oneOf", versions, applicator::one_of),
                    descriptor("not", versions, applicator::not),
                    descriptor("if", versions, applicator::if_),
                    descriptor("then", versions, applicator::then).with_priority(CONDITIONAL),
                    descriptor("else", versions, applicator::else_).with_priority(CONDITIONAL),
                    descriptor("dependentSchemas", versions, applicator::dependent_schemas),
                    descriptor("prefixItems", versions, applicator::prefix_items),
                    descriptor("items", versions, applicator::items),
                    descriptor("contains", versions, applicator::contains),
                    descriptor("properties", versions, applicator::properties),
                    descriptor("patternProperties", versions, applicator::pattern_properties),
                    descriptor("additionalProperties", versions, applicator::additional_properties),
                    descriptor("propertyNames", versions, applicator::property_names),
                ],
            ),
            Vocabulary::new(
                unevaluated_id,
                vec![
                    descriptor("unevaluatedItems", versions, unevaluated::unevaluated_items)
                        .with_priority(LAST),
                    descriptor("unevaluatedProperties", versions, unevaluated::unevaluated_properties)
                        .with_priority(LAST),
                ],
            ),
            Vocabulary::new(validation_id, validation_keywords(versions, versions)),
            Vocabulary::new(meta_id, meta_data_keywords(versions, versions, versions)),
            Vocabulary::new(
                format_annotation_id,
                vec![descriptor("format", versions, format::format)],
            ),
            Vocabulary::new(
                format_assertion_id,
                vec![descriptor("format", versions, format::format)],
            ),
            Vocabulary::new(
                content_id,
                vec![
                    descriptor("contentEncoding", versions, annotation::content_encoding),
                    descriptor("contentMediaType", versions, annotation::content_media_type),
                    descriptor("contentSchema", versions, annotation::content_schema),
                ],
            ),
        ]);
    }
    vocabularies
}

/// `common` for keywords present since draft 6, `modern` for 2019-09 additions.
fn validation_keywords(common: &[SpecVersion], modern: &[SpecVersion]) -> Vec<KeywordDescriptor> {
    vec![
        descriptor("type", common, validation::type_),
        descriptor("enum", common, validation::enum_),
        descriptor("const", common, validation::const_),
        descriptor("multipleOf", common, validation::multiple_of),
        descriptor("maximum", common, validation::maximum),
        descriptor("exclusiveMaximum", common, validation::exclusive_maximum),
        descriptor("minimum", common, validation::minimum),
        descriptor("exclusiveMinimum", common, validation::exclusive_minimum),
        descriptor("maxLength", common, validation::max_length),
        descriptor("minLength", common, validation::min_length),
        descriptor("pattern", common, validation::pattern),
        descriptor("maxItems", common, validation::max_items),
        descriptor("minItems", common, validation::min_items),
        descriptor("uniqueItems", common, validation::unique_items),
        descriptor("maxContains", modern, validation::max_contains),
        descriptor("minContains", modern, validation::min_contains),
        descriptor("maxProperties", common, validation::max_properties),
        descriptor("minProperties", common, validation::min_properties),
        descriptor("required", common, validation::required),
        descriptor("dependentRequired", modern, validation::dependent_required),
    ]
}

fn meta_data_keywords(
    since_6: &[SpecVersion],
    since_7: &[SpecVersion],
    modern: &[SpecVersion],
) -> Vec<KeywordDescriptor> {
    vec![
        descriptor("title", since_6, annotation::title),
        descriptor("description", since_6, annotation::description),
        descriptor("default", since_6, annotation::default),
        descriptor("examples", since_6, annotation::examples),
        descriptor("readOnly", since_7, annotation::read_only),
        descriptor("writeOnly", since_7, annotation::write_only),
        descriptor("deprecated", modern, annotation::deprecated),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shape_checks() {
        assert!(expect_schema(&json!(true)).is_ok());
        assert!(expect_schema(&json!("x")).is_err());
        assert!(expect_schema_array(&json!([])).is_err());
        assert!(expect_schema_array(&json!([{}, false])).is_ok());
        assert_eq!(expect_non_negative_integer(&json!(3.0)), Ok(3));
        assert!(expect_non_negative_integer(&json!(-1)).is_err());
        assert!(expect_non_negative_integer(&json!(1.5)).is_err());
        assert!(expect_string_array(&json!(["a", 1])).is_err());
    }

    #[test]
    fn every_generation_defines_core_keywords() {
        let vocabularies = standard_vocabularies();
        for id in vocab::CORE {
            let core = vocabularies.iter().find(|v| v.id() == *id).unwrap();
            assert!(core.keywords().iter().any(|k| k.name() == "$ref"));
        }
    }
}
