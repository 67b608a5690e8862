//! Meta-data and content keywords. They never fail; each annotates its own
//! payload.

use serde_json::Value;

use super::{expect_bool, expect_schema, expect_string, Simple};
use crate::keyword::{Keyword, KeywordConstraint};

fn annotating(keyword: &'static str, payload: &Value) -> KeywordConstraint {
    let payload = payload.clone();
    KeywordConstraint::new(keyword, move |eval| eval.annotate(payload.clone()))
}

pub fn title(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::boxed("title", payload, |payload, _, _| {
        Ok(annotating("title", payload))
    }))
}

pub fn description(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::boxed("description", payload, |payload, _, _| {
        Ok(annotating("description", payload))
    }))
}

/// Any value is a valid default.
pub fn default(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    Ok(Simple::boxed("default", payload, |payload, _, _| {
        Ok(annotating("default", payload))
    }))
}

pub fn examples(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    payload.as_array().ok_or("expected an array")?;
    Ok(Simple::boxed("examples", payload, |payload, _, _| {
        Ok(annotating("examples", payload))
    }))
}

pub fn read_only(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_bool(payload)?;
    Ok(Simple::boxed("readOnly", payload, |payload, _, _| {
        Ok(annotating("readOnly", payload))
    }))
}

pub fn write_only(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_bool(payload)?;
    Ok(Simple::boxed("writeOnly", payload, |payload, _, _| {
        Ok(annotating("writeOnly", payload))
    }))
}

pub fn deprecated(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_bool(payload)?;
    Ok(Simple::boxed("deprecated", payload, |payload, _, _| {
        Ok(annotating("deprecated", payload))
    }))
}

pub fn content_encoding(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::boxed("contentEncoding", payload, |payload, _, _| {
        Ok(annotating("contentEncoding", payload))
    }))
}

pub fn content_media_type(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_string(payload)?;
    Ok(Simple::boxed("contentMediaType", payload, |payload, _, _| {
        Ok(annotating("contentMediaType", payload))
    }))
}

/// Annotated as written; the decoded content is never validated.
pub fn content_schema(payload: &Value) -> Result<Box<dyn Keyword>, String> {
    expect_schema(payload)?;
    Ok(Simple::boxed("contentSchema", payload, |payload, _, _| {
        Ok(annotating("contentSchema", payload))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_shapes() {
        assert!(title(&json!("Person")).is_ok());
        assert!(title(&json!(1)).is_err());
        assert!(default(&json!({ "any": ["thing"] })).is_ok());
        assert!(examples(&json!("one")).is_err());
        assert!(read_only(&json!("yes")).is_err());
        assert!(content_schema(&json!({ "type": "object" })).is_ok());
    }
}
