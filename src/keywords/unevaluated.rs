//! `unevaluatedProperties` and `unevaluatedItems`.
//!
//! Both run last and read the annotations left at the same instance
//! location by their siblings and by valid subschemas, including those
//! reached through references and conditionals.

use std::collections::HashSet;

use serde_json::Value;

use super::{expect_schema, path, Simple};
use crate::compiler::CompileContext;
use crate::error::CompileError;
use crate::keyword::{
    ChildDependency, InstanceLocator, Keyword, KeywordConstraint, Located, SchemaTarget,
};
use crate::results::EvaluationResults;
use crate::types::SpecVersion;

const PROPERTY_ANNOTATIONS: [&str; 4] = [
    "properties",
    "patternProperties",
    "additionalProperties",
    "unevaluatedProperties",
];

/// Property names some keyword already evaluated.
fn evaluated_properties(node: &EvaluationResults) -> HashSet<String> {
    let mut names = HashSet::new();
    for keyword in PROPERTY_ANNOTATIONS {
        for annotation in node.annotations_at_location(keyword) {
            let listed = annotation.as_array().into_iter().flatten();
            names.extend(listed.filter_map(Value::as_str).map(str::to_string));
        }
    }
    names
}

/// Item indices some keyword already evaluated; `None` means all of them.
///
/// `contains` matches count only when `with_contains` is set (2020-12 on).
fn evaluated_items(node: &EvaluationResults, with_contains: bool) -> Option<HashSet<usize>> {
    let mut indices = HashSet::new();
    for keyword in ["prefixItems", "items"] {
        for annotation in node.annotations_at_location(keyword) {
            match annotation {
                Value::Bool(true) => return None,
                Value::Number(largest) => {
                    let largest = largest.as_u64().unwrap_or(0) as usize;
                    indices.extend(0..=largest);
                }
                _ => {}
            }
        }
    }
    for keyword in ["additionalItems", "unevaluatedItems"] {
        if node
            .annotations_at_location(keyword)
            .into_iter()
            .any(|annotation| annotation == &Value::Bool(true))
        {
            return None;
        }
    }
    if !with_contains {
        return Some(indices);
    }
    for annotation in node.annotations_at_location("contains") {
        let matched = annotation.as_array().into_iter().flatten();
        indices.extend(matched.filter_map(Value::as_u64).map(|i| i as usize));
    }
    Some(indices)
}

pub fn unevaluated_properties(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("unevaluatedProperties", payload, build_unevaluated_properties))
}

fn build_unevaluated_properties(
    _: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let target = ctx.subschema(&["unevaluatedProperties"])?;
    let locator = InstanceLocator::custom(|instance, node| {
        let Some(map) = instance.as_object() else {
            return Vec::new();
        };
        let evaluated = evaluated_properties(node);
        map.iter()
            .filter(|(name, _)| !evaluated.contains(name.as_str()))
            .map(|(name, value)| Located::child(name.clone(), value))
            .collect()
    });
    Ok(KeywordConstraint::new("unevaluatedProperties", |eval| {
        if !eval.instance().is_object() {
            return eval.mark_skipped();
        }
        let mut failed: Vec<Value> = Vec::new();
        let mut passed: Vec<Value> = Vec::new();
        for child in eval.children() {
            let Some(name) = child.segment.clone() else {
                continue;
            };
            if child.results.is_valid() {
                passed.push(Value::String(name));
            } else {
                failed.push(Value::String(name));
            }
        }
        if failed.is_empty() {
            eval.annotate(Value::Array(passed));
        } else {
            eval.fail("unevaluatedProperties", [("properties", Value::Array(failed))]);
        }
    })
    .with_child(ChildDependency::new(
        SchemaTarget::Static(target),
        path(&["unevaluatedProperties"]),
        locator,
    )))
}

pub fn unevaluated_items(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("unevaluatedItems", payload, build_unevaluated_items))
}

fn build_unevaluated_items(
    _: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let target = ctx.subschema(&["unevaluatedItems"])?;
    let with_contains = ctx.spec_version() >= SpecVersion::Draft202012;
    let locator = InstanceLocator::custom(move |instance, node| {
        let Some(items) = instance.as_array() else {
            return Vec::new();
        };
        let Some(evaluated) = evaluated_items(node, with_contains) else {
            return Vec::new();
        };
        items
            .iter()
            .enumerate()
            .filter(|(i, _)| !evaluated.contains(i))
            .map(|(i, item)| Located::child(i.to_string(), item))
            .collect()
    });
    Ok(KeywordConstraint::new("unevaluatedItems", |eval| {
        if !eval.instance().is_array() {
            return eval.mark_skipped();
        }
        let failed: Vec<Value> = eval
            .children()
            .iter()
            .filter(|child| !child.results.is_valid())
            .filter_map(|child| child.segment.as_deref()?.parse::<u64>().ok())
            .map(Value::from)
            .collect();
        if !failed.is_empty() {
            eval.fail("unevaluatedItems", [("indices", Value::Array(failed))]);
        } else if !eval.children().is_empty() {
            eval.annotate(Value::Bool(true));
        }
    })
    .with_child(ChildDependency::new(
        SchemaTarget::Static(target),
        path(&["unevaluatedItems"]),
        locator,
    )))
}
