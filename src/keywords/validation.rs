//! Assertions on a single instance value.
//!
//! None of these annotate. A keyword that does not apply to the instance's
//! type marks itself skipped.

use std::cmp::Ordering;

use serde_json::{json, Map, Number, Value};

use super::{
    expect_bool, expect_non_negative_integer, expect_number, expect_string, expect_string_array,
    shape, Simple,
};
use crate::compiler::CompileContext;
use crate::error::CompileError;
use crate::keyword::{Keyword, KeywordConstraint};
use crate::value::{compare_numbers, first_duplicate, is_multiple_of, json_equals, SchemaValueType};

pub fn type_(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    parse_types(payload)?;
    Ok(Simple::boxed("type", payload, build_type))
}

fn parse_types(payload: &Value) -> Result<Vec<SchemaValueType>, String> {
    let names = match payload {
        Value::String(name) => vec![name.clone()],
        Value::Array(_) => expect_string_array(payload)?,
        _ => return Err("expected a type name or an array of type names".into()),
    };
    names
        .iter()
        .map(|name| SchemaValueType::parse(name).ok_or_else(|| format!("unknown type \"{name}\"")))
        .collect()
}

fn build_type(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let types = shape(ctx, "type", parse_types(payload))?;
    let expected = types
        .iter()
        .map(SchemaValueType::as_str)
        .collect::<Vec<_>>()
        .join(" or ");
    Ok(KeywordConstraint::new("type", move |eval| {
        let instance = eval.instance();
        if !types.iter().any(|declared| declared.matches(instance)) {
            let received = SchemaValueType::of(instance).as_str();
            eval.fail(
                "type",
                [("received", json!(received)), ("expected", json!(expected))],
            );
        }
    }))
}

pub fn enum_(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    payload.as_array().ok_or("expected an array")?;
    Ok(Simple::boxed("enum", payload, |payload, _, _| {
        let allowed = payload.as_array().cloned().unwrap_or_default();
        Ok(KeywordConstraint::new("enum", move |eval| {
            let instance = eval.instance();
            if !allowed.iter().any(|value| json_equals(value, instance)) {
                eval.fail_plain();
            }
        }))
    }))
}

pub fn const_(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    Ok(Simple::boxed("const", payload, |payload, _, _| {
        let expected = payload.clone();
        Ok(KeywordConstraint::new("const", move |eval| {
            if !json_equals(&expected, eval.instance()) {
                eval.fail("const", [("value", expected.clone())]);
            }
        }))
    }))
}

pub fn multiple_of(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    let divisor = expect_number(payload)?;
    if divisor.as_f64().map_or(true, |f| f <= 0.0) {
        return Err("expected a number greater than 0".into());
    }
    Ok(Simple::boxed("multipleOf", payload, build_multiple_of))
}

fn build_multiple_of(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let divisor = shape(ctx, "multipleOf", expect_number(payload))?.clone();
    Ok(KeywordConstraint::new("multipleOf", move |eval| {
        let Some(received) = eval.instance().as_number() else {
            return eval.mark_skipped();
        };
        if !is_multiple_of(received, &divisor) {
            eval.fail(
                "multipleOf",
                [
                    ("received", Value::Number(received.clone())),
                    ("divisor", Value::Number(divisor.clone())),
                ],
            );
        }
    }))
}

/// A numeric bound: passes when `holds(instance.cmp(limit))`.
fn bound(
    keyword: &'static str,
    payload: &Value,
    ctx: &CompileContext<'_>,
    holds: fn(Ordering) -> bool,
) -> Result<KeywordConstraint, CompileError> {
    let limit: Number = shape(ctx, keyword, expect_number(payload))?.clone();
    Ok(KeywordConstraint::new(keyword, move |eval| {
        let Some(received) = eval.instance().as_number() else {
            return eval.mark_skipped();
        };
        if !compare_numbers(received, &limit).is_some_and(holds) {
            eval.fail(
                keyword,
                [
                    ("received", Value::Number(received.clone())),
                    ("limit", Value::Number(limit.clone())),
                ],
            );
        }
    }))
}

pub fn maximum(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_number(payload)?;
    Ok(Simple::boxed("maximum", payload, |payload, ctx, _| {
        bound("maximum", payload, ctx, Ordering::is_le)
    }))
}

pub fn exclusive_maximum(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_number(payload)?;
    Ok(Simple::boxed("exclusiveMaximum", payload, |payload, ctx, _| {
        bound("exclusiveMaximum", payload, ctx, Ordering::is_lt)
    }))
}

pub fn minimum(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_number(payload)?;
    Ok(Simple::boxed("minimum", payload, |payload, ctx, _| {
        bound("minimum", payload, ctx, Ordering::is_ge)
    }))
}

pub fn exclusive_minimum(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_number(payload)?;
    Ok(Simple::boxed("exclusiveMinimum", payload, |payload, ctx, _| {
        bound("exclusiveMinimum", payload, ctx, Ordering::is_gt)
    }))
}

/// A size limit on strings, arrays or objects. `measure` returns `None` for
/// instances the keyword does not apply to.
fn size_limit(
    keyword: &'static str,
    payload: &Value,
    ctx: &CompileContext<'_>,
    measure: fn(&Value) -> Option<u64>,
    within: fn(u64, u64) -> bool,
) -> Result<KeywordConstraint, CompileError> {
    let limit = shape(ctx, keyword, expect_non_negative_integer(payload))?;
    Ok(KeywordConstraint::new(keyword, move |eval| {
        let Some(size) = measure(eval.instance()) else {
            return eval.mark_skipped();
        };
        if !within(size, limit) {
            eval.fail(keyword, [("limit", json!(limit)), ("received", json!(size))]);
        }
    }))
}

/// Length in Unicode code points.
fn string_length(value: &Value) -> Option<u64> {
    value.as_str().map(|s| s.chars().count() as u64)
}

fn item_count(value: &Value) -> Option<u64> {
    value.as_array().map(|items| items.len() as u64)
}

fn property_count(value: &Value) -> Option<u64> {
    value.as_object().map(|map| map.len() as u64)
}

fn at_most(size: u64, limit: u64) -> bool {
    size <= limit
}

fn at_least(size: u64, limit: u64) -> bool {
    size >= limit
}

pub fn max_length(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_non_negative_integer(payload)?;
    Ok(Simple::boxed("maxLength", payload, |payload, ctx, _| {
        size_limit("maxLength", payload, ctx, string_length, at_most)
    }))
}

pub fn min_length(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_non_negative_integer(payload)?;
    Ok(Simple::boxed("minLength", payload, |payload, ctx, _| {
        size_limit("minLength", payload, ctx, string_length, at_least)
    }))
}

pub fn max_items(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_non_negative_integer(payload)?;
    Ok(Simple::boxed("maxItems", payload, |payload, ctx, _| {
        size_limit("maxItems", payload, ctx, item_count, at_most)
    }))
}

pub fn min_items(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_non_negative_integer(payload)?;
    Ok(Simple::boxed("minItems", payload, |payload, ctx, _| {
        size_limit("minItems", payload, ctx, item_count, at_least)
    }))
}

pub fn max_properties(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_non_negative_integer(payload)?;
    Ok(Simple::boxed("maxProperties", payload, |payload, ctx, _| {
        size_limit("maxProperties", payload, ctx, property_count, at_most)
    }))
}

pub fn min_properties(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_non_negative_integer(payload)?;
    Ok(Simple::boxed("minProperties", payload, |payload, ctx, _| {
        size_limit("minProperties", payload, ctx, property_count, at_least)
    }))
}

pub fn pattern(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::boxed("pattern", payload, build_pattern))
}

fn build_pattern(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let source = shape(ctx, "pattern", expect_string(payload))?.to_string();
    let regex = ctx.regex(&source)?;
    Ok(KeywordConstraint::new("pattern", move |eval| {
        let Some(text) = eval.instance().as_str() else {
            return eval.mark_skipped();
        };
        if !regex.is_match(text) {
            eval.fail("pattern", [("pattern", Value::String(source.clone()))]);
        }
    }))
}

pub fn unique_items(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_bool(payload)?;
    Ok(Simple::boxed("uniqueItems", payload, |payload, _, _| {
        if payload != &Value::Bool(true) {
            return Ok(KeywordConstraint::skip("uniqueItems"));
        }
        Ok(KeywordConstraint::new("uniqueItems", |eval| {
            let Some(items) = eval.instance().as_array() else {
                return eval.mark_skipped();
            };
            if let Some((first, second)) = first_duplicate(items) {
                eval.fail("uniqueItems", [("duplicates", json!([[first, second]]))]);
            }
        }))
    }))
}

/// Read by `contains` when it builds.
pub fn min_contains(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_non_negative_integer(payload)?;
    Ok(Simple::inert("minContains", payload))
}

pub fn max_contains(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_non_negative_integer(payload)?;
    Ok(Simple::boxed("maxContains", payload, build_max_contains))
}

/// Counts the indices `contains` annotated; without that annotation there is
/// nothing to limit.
fn build_max_contains(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let limit = shape(ctx, "maxContains", expect_non_negative_integer(payload))?;
    Ok(KeywordConstraint::new("maxContains", move |eval| {
        let matched = eval
            .sibling_annotation("contains")
            .and_then(Value::as_array)
            .map(|indices| indices.len() as u64);
        match matched {
            None => eval.mark_skipped(),
            Some(count) if count > limit => eval.fail(
                "maxContains",
                [("limit", json!(limit)), ("received", json!(count))],
            ),
            Some(_) => {}
        }
    })
    .after("contains"))
}

pub fn required(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string_array(payload)?;
    Ok(Simple::boxed("required", payload, build_required))
}

fn build_required(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let names = shape(ctx, "required", expect_string_array(payload))?;
    Ok(KeywordConstraint::new("required", move |eval| {
        let Some(map) = eval.instance().as_object() else {
            return eval.mark_skipped();
        };
        let missing: Vec<&String> = names.iter().filter(|name| !map.contains_key(*name)).collect();
        if !missing.is_empty() {
            eval.fail("required", [("missing", json!(missing))]);
        }
    }))
}

pub fn dependent_required(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    parse_dependent_required(payload)?;
    Ok(Simple::boxed("dependentRequired", payload, build_dependent_required))
}

fn parse_dependent_required(payload: &Value) -> Result<Vec<(String, Vec<String>)>, String> {
    payload
        .as_object()
        .ok_or("expected an object of string arrays")?
        .iter()
        .map(|(name, needs)| {
            expect_string_array(needs)
                .map(|needs| (name.clone(), needs))
                .map_err(|_| format!("\"{name}\" is not an array of strings"))
        })
        .collect()
}

fn build_dependent_required(
    payload: &Value,
    ctx: &mut CompileContext<'_>,
    _: &[KeywordConstraint],
) -> Result<KeywordConstraint, CompileError> {
    let dependencies = shape(ctx, "dependentRequired", parse_dependent_required(payload))?;
    Ok(KeywordConstraint::new("dependentRequired", move |eval| {
        let Some(map) = eval.instance().as_object() else {
            return eval.mark_skipped();
        };
        let mut missing = Map::new();
        for (property, needs) in &dependencies {
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
    }))
}
