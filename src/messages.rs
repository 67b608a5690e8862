//! Error message templates.
//!
//! Keywords never format text. A failure carries a template key and a map of
//! substitutions; this module turns the pair into a message. Templates use
//! `[[token]]` placeholders and can be overridden per key.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::{Map, Value};

static DEFAULT_TEMPLATES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("false", "All values fail against the false schema"),
        ("type", "Value is \"[[received]]\" but should be [[expected]]"),
        ("enum", "Value should match one of the values specified by the enum"),
        ("const", "Expected \"[[value]]\""),
        ("multipleOf", "[[received]] is not a multiple of [[divisor]]"),
        ("maximum", "[[received]] is greater than [[limit]]"),
        ("exclusiveMaximum", "[[received]] is greater than or equal to [[limit]]"),
        ("minimum", "[[received]] is less than [[limit]]"),
        ("exclusiveMinimum", "[[received]] is less than or equal to [[limit]]"),
        ("maxLength", "Value is not shorter than or equal to [[limit]] characters"),
        ("minLength", "Value is not longer than or equal to [[limit]] characters"),
        ("pattern", "The string value does not match the required regular expression \"[[pattern]]\""),
        ("maxItems", "Value has more than [[limit]] items"),
        ("minItems", "Value has fewer than [[limit]] items"),
        ("uniqueItems", "Found duplicates at the following index pairs: [[duplicates]]"),
        ("contains", "Value must contain at least [[minimum]] matching item(s) but [[received]] matched"),
        ("maxContains", "Value must contain at most [[limit]] matching item(s) but [[received]] matched"),
        ("maxProperties", "Value has more than [[limit]] properties"),
        ("minProperties", "Value has fewer than [[limit]] properties"),
        ("required", "Required properties [[missing]] are not present"),
        ("dependentRequired", "Some required property dependencies are missing: [[missing]]"),
        ("dependentSchemas", "Value does not match the schemas required by properties [[failed]]"),
        ("allOf", "Value does not match all of the subschemas"),
        ("anyOf", "Value does not match any of the subschemas"),
        ("oneOf", "Expected exactly 1 matching subschema but found [[count]]"),
        ("not", "Value should not validate against the schema"),
        ("then", "Value does not match the \"then\" schema"),
        ("else", "Value does not match the \"else\" schema"),
        ("$ref", "Value does not match the referenced schema [[reference]]"),
        ("properties", "Values at [[properties]] do not match their property schemas"),
        ("patternProperties", "Values at [[properties]] do not match their pattern schemas"),
        ("additionalProperties", "Additional properties [[properties]] are not allowed"),
        ("unevaluatedProperties", "Unevaluated properties [[properties]] are not allowed"),
        ("propertyNames", "Property names [[properties]] are not valid"),
        ("items", "Items at [[indices]] do not match the item schema"),
        ("prefixItems", "Items at [[indices]] do not match their positional schemas"),
        ("additionalItems", "Additional items at [[indices]] are not allowed"),
        ("unevaluatedItems", "Unevaluated items at [[indices]] are not allowed"),
        ("format", "Value does not match format \"[[format]]\""),
    ])
});

/// Key-to-template lookup with per-key overrides.
#[derive(Debug, Clone, Default)]
pub struct MessageTemplates {
    overrides: HashMap<String, String>,
}

impl MessageTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the template for one key.
    pub fn with_template(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), template.into());
        self
    }

    /// The template used for `key`, if any is known.
    pub fn template(&self, key: &str) -> Option<&str> {
        self.overrides
            .get(key)
            .map(String::as_str)
            .or_else(|| DEFAULT_TEMPLATES.get(key).copied())
    }

    /// Render the message for a failure.
    ///
    /// String substitutions are inserted verbatim, every other value as
    /// compact JSON. Unknown keys render a generic message naming the key.
    pub fn render(&self, key: &str, substitutions: &Map<String, Value>) -> String {
        let Some(template) = self.template(key) else {
            return format!("Validation failed for \"{key}\"");
        };
        let mut message = template.to_string();
        for (token, value) in substitutions {
            let placeholder = format!("[[{token}]]");
            if !message.contains(&placeholder) {
                continue;
            }
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            message = message.replace(&placeholder, &text);
        }
        message
    }
}
