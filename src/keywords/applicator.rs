//! Keywords that apply subschemas: combinators, conditionals, and the
//! object and array applicators.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Value};

use super::{
    expect_schema, expect_schema_array, expect_schema_map, expect_string_array, path, shape,
    Simple,
};
use crate::compiler::CompileContext;
use crate::error::CompileError;
use crate::keyword::{
    ChildDependency, ChildEvaluation, InstanceLocator, Keyword, KeywordConstraint,
    KeywordEvaluation, Located, SchemaTarget,
};
use crate::types::SpecVersion;

/// Compile the subschema at `segments` and attach it with `locator`.
fn child(
    ctx: &mut CompileContext<'_>,
    segments: &[&str],
    locator: InstanceLocator,
) -> Result<ChildDependency, CompileError> {
    let target = ctx.subschema(segments)?;
    Ok(ChildDependency::new(
        SchemaTarget::Static(target),
        path(segments),
        locator,
    ))
}

/// One child per array entry, all at the current instance location.
fn each_schema(
    keyword: &'static str,
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    constraint: KeywordConstraint,
) -> Result<KeywordConstraint, CompileError> {
    let count = shape(ctx, keyword, expect_schema_array(payload))?.len();
    (0..count).try_fold(constraint, |constraint, i| {
        let index = i.to_string();
        Ok(constraint.with_child(child(ctx, &[keyword, &index], InstanceLocator::Same)?))
    })
}

fn failed<'e>(eval: &KeywordEvaluation<'e>) -> Vec<&'e ChildEvaluation> {
    eval.children()
        .iter()
        .filter(|child| !child.results.is_valid())
        .collect()
}

fn valid_count(eval: &KeywordEvaluation<'_>) -> usize {
    eval.children()
        .iter()
        .filter(|child| child.results.is_valid())
        .count()
}

/// Instance segments of `children` as a JSON array of strings.
fn segments<'c>(children: impl IntoIterator<Item = &'c ChildEvaluation>) -> Vec<Value> {
    let mut seen = HashSet::new();
    children
        .into_iter()
        .filter_map(|child| child.segment.clone())
        .filter(|segment| seen.insert(segment.clone()))
        .map(Value::String)
        .collect()
}

/// Instance segments of `children` as a JSON array of indices.
fn indices<'c>(children: impl IntoIterator<Item = &'c ChildEvaluation>) -> Vec<Value> {
    children
        .into_iter()
        .filter_map(|child| child.segment.as_deref()?.parse::<u64>().ok())
        .map(Value::from)
        .collect()
}

pub fn all_of(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema_array(payload)?;
    Ok(Simple::boxed("allOf", payload, build_all_of))
}

fn build_all_of(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let constraint = KeywordConstraint::new("allOf", |eval| {
        if !failed(eval).is_empty() {
            eval.fail_plain();
        }
    });
    each_schema("allOf", payload, ctx, constraint)
}

pub fn any_of(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema_array(payload)?;
    Ok(Simple::boxed("anyOf", payload, build_any_of))
}

fn build_any_of(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let constraint = KeywordConstraint::new("anyOf", |eval| {
        if valid_count(eval) == 0 {
            eval.fail_plain();
        }
    });
    each_schema("anyOf", payload, ctx, constraint)
}

pub fn one_of(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema_array(payload)?;
    Ok(Simple::boxed("oneOf", payload, build_one_of))
}

fn build_one_of(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let constraint = KeywordConstraint::new("oneOf", |eval| {
        let count = valid_count(eval);
        if count != 1 {
            eval.fail("oneOf", [("count", json!(count))]);
        }
    });
    each_schema("oneOf", payload, ctx, constraint)
}

pub fn not(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("not", payload, build_not))
}

fn build_not(
    _: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    Ok(KeywordConstraint::new("not", |eval| {
        if valid_count(eval) > 0 {
            eval.fail_plain();
        }
    })
    .with_child(child(ctx, &["not"], InstanceLocator::Same)?))
}

pub fn if_(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("if", payload, build_if))
}

/// Never fails; annotates whether the condition held so `then`/`else` can
/// pick a branch.
fn build_if(
    _: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    Ok(KeywordConstraint::new("if", |eval| {
        let matched = failed(eval).is_empty();
        eval.annotate(Value::Bool(matched));
    })
    .with_child(child(ctx, &["if"], InstanceLocator::Same)?))
}

pub fn then(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("then", payload, |_, ctx, _| branch("then", true, ctx)))
}

pub fn else_(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("else", payload, |_, ctx, _| branch("else", false, ctx)))
}

/// `then`/`else`: evaluated only when `if` annotated `taken`.
fn branch(
    keyword: &'static str,
    taken: bool,
    ctx: &mut CompileContext<'_>,
) -> Result<KeywordConstraint, CompileError> {
    let target = ctx.subschema(&[keyword])?;
    let locator = InstanceLocator::custom(move |instance, node| {
        if node.annotation("if") == Some(&Value::Bool(taken)) {
            vec![Located::same(instance)]
        } else {
            Vec::new()
        }
    });
    Ok(KeywordConstraint::new(keyword, |eval| match eval.children().first() {
        None => eval.mark_skipped(),
        Some(child) if !child.results.is_valid() => eval.fail_plain(),
        Some(_) => {}
    })
    .after("if")
    .with_child(ChildDependency::new(
        SchemaTarget::Static(target),
        path(&[keyword]),
        locator,
    )))
}

/// Evaluate the whole instance when `property` is present.
fn when_present(property: String) -> InstanceLocator {
    InstanceLocator::custom(move |instance, _| {
        if instance
            .as_object()
            .is_some_and(|map| map.contains_key(&property))
        {
            vec![Located::same(instance)]
        } else {
            Vec::new()
        }
    })
}

pub fn dependent_schemas(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema_map(payload)?;
    Ok(Simple::boxed("dependentSchemas", payload, build_dependent_schemas))
}

fn build_dependent_schemas(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let names: Vec<String> = shape(ctx, "dependentSchemas", expect_schema_map(payload))?
        .keys()
        .cloned()
        .collect();
    let owners = names.clone();
    let mut constraint = KeywordConstraint::new("dependentSchemas", move |eval| {
        if !eval.instance().is_object() {
            return eval.mark_skipped();
        }
        let failed: Vec<Value> = failed(eval)
            .into_iter()
            .map(|child| Value::String(owners[child.dependency].clone()))
            .collect();
        if !failed.is_empty() {
            eval.fail("dependentSchemas", [("failed", Value::Array(failed))]);
        }
    });
    for name in names {
        let dependency = child(ctx, &["dependentSchemas", &name], when_present(name.clone()))?;
        constraint = constraint.with_child(dependency);
    }
    Ok(constraint)
}

/// Draft 6/7 `dependencies`: each entry is either a list of required
/// property names or a schema.
pub fn dependencies(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    let map = payload
        .as_object()
        .ok_or("expected an object of schemas or string arrays")?;
    for (key, value) in map {
        if value.is_array() {
            expect_string_array(value).map_err(|_| format!("\"{key}\" is not an array of strings"))?;
        } else {
            expect_schema(value).map_err(|_| format!("\"{key}\" is not a schema"))?;
        }
    }
    Ok(Simple::boxed("dependencies", payload, build_dependencies))
}

fn build_dependencies(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let mut required: Vec<(String, Vec<String>)> = Vec::new();
    let mut schemas: Vec<String> = Vec::new();
    for (key, value) in payload.as_object().into_iter().flatten() {
        if value.is_array() {
            required.push((key.clone(), shape(ctx, "dependencies", expect_string_array(value))?));
        } else {
            schemas.push(key.clone());
        }
    }
    let owners = schemas.clone();
    let mut constraint = KeywordConstraint::new("dependencies", move |eval| {
        let Some(map) = eval.instance().as_object() else {
            return eval.mark_skipped();
        };
        let failed: Vec<Value> = failed(eval)
            .into_iter()
            .map(|child| Value::String(owners[child.dependency].clone()))
            .collect();
        if !failed.is_empty() {
            return eval.fail("dependentSchemas", [("failed", Value::Array(failed))]);
        }
        let mut missing = serde_json::Map::new();
        for (property, needs) in &required {
            if !map.contains_key(property) {
                continue;
            }
            let absent: Vec<Value> = needs
                .iter()
                .filter(|need| !map.contains_key(*need))
                .map(|need| Value::String(need.clone()))
                .collect();
            if !absent.is_empty() {
                missing.insert(property.clone(), Value::Array(absent));
            }
        }
        if !missing.is_empty() {
            eval.fail("dependentRequired", [("missing", Value::Object(missing))]);
        }
    });
    for name in schemas {
        let dependency = child(ctx, &["dependencies", &name], when_present(name.clone()))?;
        constraint = constraint.with_child(dependency);
    }
    Ok(constraint)
}

pub fn prefix_items(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema_array(payload)?;
    Ok(Simple::boxed("prefixItems", payload, |payload, ctx, _| {
        positional("prefixItems", payload, ctx)
    }))
}

/// One schema per array position. Annotates the largest index evaluated, or
/// `true` when every item was.
fn positional(
    keyword: &'static str,
    payload: &Value,
    ctx: &mut CompileContext<'_>,
) -> Result<KeywordConstraint, CompileError> {
    let count = payload.as_array().map(Vec::len).unwrap_or(0);
    let mut constraint = KeywordConstraint::new(keyword, move |eval| {
        let Some(items) = eval.instance().as_array() else {
            return eval.mark_skipped();
        };
        let failed = indices(failed(eval));
        if !failed.is_empty() {
            return eval.fail(keyword, [("indices", Value::Array(failed))]);
        }
        if items.len() <= count {
            eval.annotate(Value::Bool(true));
        } else if count > 0 {
            eval.annotate(json!(count - 1));
        }
    });
    for i in 0..count {
        let index = i.to_string();
        constraint = constraint.with_child(child(ctx, &[keyword, &index], InstanceLocator::Item(i))?);
    }
    Ok(constraint)
}

/// One schema for every item from `start` on. Annotates `true` when it
/// evaluated anything.
fn trailing(
    keyword: &'static str,
    start: usize,
    ctx: &mut CompileContext<'_>,
) -> Result<KeywordConstraint, CompileError> {
    Ok(KeywordConstraint::new(keyword, move |eval| {
        if !eval.instance().is_array() {
            return eval.mark_skipped();
        }
        let failed = indices(failed(eval));
        if !failed.is_empty() {
            eval.fail(keyword, [("indices", Value::Array(failed))]);
        } else if !eval.children().is_empty() {
            eval.annotate(Value::Bool(true));
        }
    })
    .with_child(child(ctx, &[keyword], InstanceLocator::Items { start })?))
}

/// 2020-12 `items`: the items after `prefixItems`.
pub fn items(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("items", payload, |_, ctx, _| {
        let start = ctx
            .sibling_payload("prefixItems")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        Ok(trailing("items", start, ctx)?.after("prefixItems"))
    }))
}

/// Drafts 6 to 2019-09 `items`: a schema for every item, or an array of
/// positional schemas.
pub fn legacy_items(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    match payload {
        Value::Array(entries) => {
            for (i, entry) in entries.iter().enumerate() {
                expect_schema(entry).map_err(|_| format!("item {i} is not a schema"))?;
            }
        }
        other => expect_schema(other)?,
    }
    Ok(Simple::boxed("items", payload, |payload, ctx, _| {
        if payload.is_array() {
            positional("items", payload, ctx)
        } else {
            trailing("items", 0, ctx)
        }
    }))
}

/// Applies only after an array-form `items`.
pub fn additional_items(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("additionalItems", payload, |_, ctx, _| {
        let Some(start) = ctx
            .sibling_payload("items")
            .and_then(Value::as_array)
            .map(Vec::len)
        else {
            return Ok(KeywordConstraint::skip("additionalItems"));
        };
        Ok(trailing("additionalItems", start, ctx)?.after("items"))
    }))
}

pub fn contains(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("contains", payload, build_contains))
}

/// Annotates the matching indices. `minContains` (2019-09 on) lowers or
/// raises the required match count; `maxContains` reads the annotation.
fn build_contains(
    _: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let minimum = if ctx.spec_version() >= SpecVersion::Draft201909 {
        ctx.sibling_payload("minContains")
            .and_then(|value| super::expect_non_negative_integer(value).ok())
            .unwrap_or(1)
    } else {
        1
    };
    Ok(KeywordConstraint::new("contains", move |eval| {
        if !eval.instance().is_array() {
            return eval.mark_skipped();
        }
        let matched = indices(
            eval.children()
                .iter()
                .filter(|child| child.results.is_valid()),
        );
        if (matched.len() as u64) < minimum {
            eval.fail(
                "contains",
                [("minimum", json!(minimum)), ("received", json!(matched.len()))],
            );
        } else {
            eval.annotate(Value::Array(matched));
        }
    })
    .with_child(child(ctx, &["contains"], InstanceLocator::Items { start: 0 })?))
}

pub fn properties(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema_map(payload)?;
    Ok(Simple::boxed("properties", payload, build_properties))
}

fn build_properties(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let names: Vec<String> = shape(ctx, "properties", expect_schema_map(payload))?
        .keys()
        .cloned()
        .collect();
    let mut constraint = object_applicator("properties");
    for name in names {
        let dependency = child(ctx, &["properties", &name], InstanceLocator::Property(name.clone()))?;
        constraint = constraint.with_child(dependency);
    }
    Ok(constraint)
}

/// Fails with the names of failing properties, otherwise annotates the
/// names it evaluated.
fn object_applicator(keyword: &'static str) -> KeywordConstraint {
    KeywordConstraint::new(keyword, move |eval| {
        if !eval.instance().is_object() {
            return eval.mark_skipped();
        }
        let failed = segments(failed(eval));
        if failed.is_empty() {
            let evaluated = segments(eval.children().iter());
            eval.annotate(Value::Array(evaluated));
        } else {
            eval.fail(keyword, [("properties", Value::Array(failed))]);
        }
    })
}

/// Properties whose names satisfy `select`.
fn matching_properties<F>(select: F) -> InstanceLocator
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    InstanceLocator::custom(move |instance, _| {
        instance
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(name, _)| select(name.as_str()))
                    .map(|(name, value)| Located::child(name.clone(), value))
                    .collect()
            })
            .unwrap_or_default()
    })
}

pub fn pattern_properties(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema_map(payload)?;
    Ok(Simple::boxed("patternProperties", payload, build_pattern_properties))
}

fn build_pattern_properties(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let patterns: Vec<String> = shape(ctx, "patternProperties", expect_schema_map(payload))?
        .keys()
        .cloned()
        .collect();
    let mut constraint = object_applicator("patternProperties");
    for pattern in patterns {
        let regex = ctx.regex(&pattern)?;
        let locator = matching_properties(move |name| regex.is_match(name));
        constraint = constraint.with_child(child(ctx, &["patternProperties", &pattern], locator)?);
    }
    Ok(constraint)
}

pub fn additional_properties(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("additionalProperties", payload, build_additional_properties))
}

/// Applies to properties matched by neither `properties` nor
/// `patternProperties`.
fn build_additional_properties(
    _: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let known: HashSet<String> = ctx
        .sibling_payload("properties")
        .and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    let sources: Vec<String> = ctx
        .sibling_payload("patternProperties")
        .and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    let patterns: Vec<Arc<Regex>> = sources
        .iter()
        .map(|pattern| ctx.regex(pattern))
        .collect::<Result<_, _>>()?;
    let locator = matching_properties(move |name| {
        !known.contains(name) && !patterns.iter().any(|regex| regex.is_match(name))
    });
    Ok(object_applicator("additionalProperties")
        .after_all(["properties", "patternProperties"])
        .with_child(child(ctx, &["additionalProperties"], locator)?))
}

pub fn property_names(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("propertyNames", payload, build_property_names))
}

fn build_property_names(
    _: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    Ok(KeywordConstraint::new("propertyNames", |eval| {
        if !eval.instance().is_object() {
            return eval.mark_skipped();
        }
        let failed = segments(failed(eval));
        if !failed.is_empty() {
            eval.fail("propertyNames", [("properties", Value::Array(failed))]);
        }
    })
    .with_child(child(ctx, &["propertyNames"], InstanceLocator::PropertyNames)?))
}
