//! Keyword-level view of a schema node.
//!
//! [`Schema`] parses a node with the same factories compilation uses, without
//! compiling anything, and serializes back to the original JSON. Keywords no
//! vocabulary knows are kept as they are.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::error::CompileError;
use crate::keyword::Keyword;
use crate::keywords::Unrecognized;
use crate::types::{EvaluationOptions, SpecVersion};
use crate::value::json_type_name;

/// A parsed schema node.
#[derive(Debug)]
pub enum Schema {
    Bool(bool),
    /// Keywords in declaration order.
    Object(Vec<Box<dyn Keyword>>),
}

impl Schema {
    /// Parse `value` into keyword instances.
    ///
    /// The draft comes from a top-level `$schema` naming a standard
    /// meta-schema, else from the options' default.
    pub fn from_value(value: &Value, options: &EvaluationOptions) -> Result<Self, CompileError> {
        let map = match value {
            Value::Bool(b) => return Ok(Schema::Bool(*b)),
            Value::Object(map) => map,
            other => {
                return Err(CompileError::NotASchema {
                    location: String::from("#"),
                    found: json_type_name(other),
                })
            }
        };
        let version = map
            .get("$schema")
            .and_then(Value::as_str)
            .and_then(SpecVersion::from_meta_schema_uri)
            .unwrap_or_else(|| options.default_version());
        let registry = options.vocabularies();
        let mut keywords: Vec<Box<dyn Keyword>> = Vec::with_capacity(map.len());
        for (name, payload) in map {
            let keyword = match registry.descriptor(name, version, None) {
                Some(descriptor) => (descriptor.factory())(payload).map_err(|message| {
                    CompileError::MalformedKeyword {
                        keyword: name.clone(),
                        location: String::from("#"),
                        message,
                    }
                })?,
                None => Box::new(Unrecognized::new(name, payload)),
            };
            keywords.push(keyword);
        }
        Ok(Schema::Object(keywords))
    }

    /// The keyword named `name`, if present.
    pub fn keyword(&self, name: &str) -> Option<&dyn Keyword> {
        match self {
            Schema::Bool(_) => None,
            Schema::Object(keywords) => keywords
                .iter()
                .find(|keyword| keyword.name() == name)
                .map(|keyword| keyword.as_ref()),
        }
    }

    pub fn keywords(&self) -> &[Box<dyn Keyword>] {
        match self {
            Schema::Bool(_) => &[],
            Schema::Object(keywords) => keywords,
        }
    }

    /// Back to JSON.
    pub fn to_value(&self) -> Value {
        match self {
            Schema::Bool(b) => Value::Bool(*b),
            Schema::Object(keywords) => Value::Object(
                keywords
                    .iter()
                    .map(|keyword| (keyword.name().to_string(), keyword.payload()))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Schema::Bool(b) => serializer.serialize_bool(*b),
            Schema::Object(keywords) => {
                let mut map = serializer.serialize_map(Some(keywords.len()))?;
                for keyword in keywords {
                    map.serialize_entry(keyword.name(), &keyword.payload())?;
                }
                map.end()
            }
        }
    }
}
