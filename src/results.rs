//! Evaluation result tree and output shaping.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::messages::MessageTemplates;
use crate::pointer::JsonPointer;
use crate::types::OutputFormat;

/// A keyword failure: a message template key plus its substitutions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordFailure {
    pub key: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub substitutions: Map<String, Value>,
}

impl KeywordFailure {
    pub fn message(&self, templates: &MessageTemplates) -> String {
        templates.render(&self.key, &self.substitutions)
    }

    pub fn substitution(&self, token: &str) -> Option<&Value> {
        self.substitutions.get(token)
    }
}

/// Result of evaluating one schema node against one instance location.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResults {
    pub valid: bool,
    pub evaluation_path: JsonPointer,
    pub schema_location: String,
    pub instance_location: JsonPointer,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub annotations: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub errors: IndexMap<String, KeywordFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<EvaluationResults>,
}

impl EvaluationResults {
    pub(crate) fn new(
        evaluation_path: JsonPointer,
        schema_location: String,
        instance_location: JsonPointer,
    ) -> Self {
        Self {
            valid: true,
            evaluation_path,
            schema_location,
            instance_location,
            annotations: IndexMap::new(),
            errors: IndexMap::new(),
            details: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn annotation(&self, keyword: &str) -> Option<&Value> {
        self.annotations.get(keyword)
    }

    pub fn error(&self, keyword: &str) -> Option<&KeywordFailure> {
        self.errors.get(keyword)
    }

    /// Every annotation named `keyword` in this node and in valid descendants
    /// at the same instance location.
    pub fn annotations_at_location<'r>(&'r self, keyword: &str) -> Vec<&'r Value> {
        let mut found = Vec::new();
        self.collect_local_annotations(keyword, &self.instance_location, &mut found);
        found
    }

    fn collect_local_annotations<'r>(
        &'r self,
        keyword: &str,
        location: &JsonPointer,
        found: &mut Vec<&'r Value>,
    ) {
        if let Some(value) = self.annotations.get(keyword) {
            found.push(value);
        }
        for detail in &self.details {
            if detail.valid && detail.instance_location == *location {
                detail.collect_local_annotations(keyword, location, found);
            }
        }
    }

    /// Reshape the tree for the requested output format.
    pub fn into_format(self, format: OutputFormat) -> Self {
        match format {
            OutputFormat::Hierarchical => self,
            OutputFormat::Flag => Self {
                annotations: IndexMap::new(),
                errors: IndexMap::new(),
                details: Vec::new(),
                ..self
            },
            OutputFormat::List => {
                let mut flat = Vec::new();
                for detail in self.details {
                    detail.flatten_into(&mut flat);
                }
                Self {
                    details: flat,
                    ..self
                }
            }
        }
    }

    fn flatten_into(self, flat: &mut Vec<EvaluationResults>) {
        let Self {
            valid,
            evaluation_path,
            schema_location,
            instance_location,
            annotations,
            errors,
            details,
        } = self;
        if !annotations.is_empty() || !errors.is_empty() {
            flat.push(Self {
                valid,
                evaluation_path,
                schema_location,
                instance_location,
                annotations,
                errors,
                details: Vec::new(),
            });
        }
        for detail in details {
            detail.flatten_into(flat);
        }
    }

    /// Failures along invalid branches, rendered with `templates`.
    ///
    /// Only children of failed keywords are visited, so failing `anyOf`
    /// branches that did not matter are left out.
    pub fn collect_errors(&self, templates: &MessageTemplates) -> Vec<SchemaError> {
        let mut errors = Vec::new();
        self.collect_errors_into(templates, &mut errors);
        errors
    }

    fn collect_errors_into(&self, templates: &MessageTemplates, out: &mut Vec<SchemaError>) {
        if self.valid {
            return;
        }
        for (keyword, failure) in &self.errors {
            out.push(SchemaError {
                instance_location: self.instance_location.clone(),
                evaluation_path: self.evaluation_path.join(keyword.clone()),
                keyword: keyword.clone(),
                message: failure.message(templates),
            });
        }
        for detail in &self.details {
            // only follow children of keywords that failed here
            let owner = detail.evaluation_path.segments().get(self.evaluation_path.len());
            if owner.is_some_and(|keyword| self.errors.contains_key(keyword)) {
                detail.collect_errors_into(templates, out);
            }
        }
    }
}
