//! Identifier, anchor and reference keywords.
//!
//! Identifiers and anchors are indexed by the schema registry when a document
//! is registered, so here they only check their payload.

use serde_json::Value;

use super::{expect_bool, expect_schema_map, expect_string, same_location, shape, Simple};
use crate::compiler::CompileContext;
use crate::error::CompileError;
use crate::keyword::{Keyword, KeywordConstraint, SchemaTarget};

pub fn schema(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::inert("$schema", payload))
}

pub fn id(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::inert("$id", payload))
}

pub fn anchor(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    check_anchor_name(payload)?;
    Ok(Simple::inert("$anchor", payload))
}

pub fn dynamic_anchor(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    check_anchor_name(payload)?;
    Ok(Simple::inert("$dynamicAnchor", payload))
}

fn check_anchor_name(payload: &Value) -> Result<(), String> {
    let name = expect_string(payload)?;
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(format!("\"{name}\" is not a valid anchor name"))
    }
}

pub fn recursive_anchor(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_bool(payload)?;
    Ok(Simple::inert("$recursiveAnchor", payload))
}

pub fn comment(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::inert("$comment", payload))
}

/// Definitions compile only when referenced.
pub fn defs(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema_map(payload)?;
    Ok(Simple::inert("$defs", payload))
}

pub fn definitions(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema_map(payload)?;
    Ok(Simple::inert("definitions", payload))
}

pub fn vocabulary(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    let map = payload
        .as_object()
        .ok_or("expected an object of vocabulary URIs to booleans")?;
    if map.values().any(|required| !required.is_boolean()) {
        return Err("expected an object of vocabulary URIs to booleans".into());
    }
    Ok(Simple::boxed("$vocabulary", payload, build_vocabulary))
}

fn build_vocabulary(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let registry = ctx.options().vocabularies();
    let missing = payload
        .as_object()
        .into_iter()
        .flatten()
        .find(|(id, required)| required.as_bool() == Some(true) && !registry.is_known(id));
    if let Some((id, _)) = missing {
        return Err(CompileError::UnknownVocabularyRequired {
            vocabulary: id.clone(),
        });
    }
    Ok(KeywordConstraint::skip("$vocabulary"))
}

pub fn reference(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::boxed("$ref", payload, build_reference))
}

fn build_reference(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let reference = shape(ctx, "$ref", expect_string(payload))?.to_string();
    let target = ctx.reference(&reference)?;
    Ok(follow("$ref", SchemaTarget::Static(target), reference))
}

pub fn dynamic_reference(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::boxed("$dynamicRef", payload, build_dynamic_reference))
}

fn build_dynamic_reference(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let reference = shape(ctx, "$dynamicRef", expect_string(payload))?.to_string();
    let target = ctx.dynamic_reference(&reference)?;
    Ok(follow("$dynamicRef", target, reference))
}

pub fn recursive_reference(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::boxed("$recursiveRef", payload, build_recursive_reference))
}

fn build_recursive_reference(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let reference = shape(ctx, "$recursiveRef", expect_string(payload))?.to_string();
    let target = ctx.recursive_reference(&reference)?;
    Ok(follow("$recursiveRef", target, reference))
}

/// Evaluate `target` at the same location and fail when it fails.
fn follow(keyword: &'static str, target: SchemaTarget, reference: String) -> KeywordConstraint {
    KeywordConstraint::new(keyword, move |eval| {
        if eval.children().iter().any(|child| !child.results.is_valid()) {
            eval.fail("$ref", [("reference", Value::String(reference.clone()))]);
        }
    })
    .with_child(same_location(target, keyword))
}
