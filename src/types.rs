//! Core option types shared by compilation and evaluation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::messages::MessageTemplates;
use crate::registry::SchemaRegistry;
use crate::vocabulary::VocabularyRegistry;

/// Default limit on nested schema evaluations.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// JSON Schema draft versions understood by the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SpecVersion {
    Draft6,
    Draft7,
    Draft201909,
    Draft202012,
    DraftNext,
}

impl SpecVersion {
    pub const ALL: &'static [SpecVersion] = &[
        SpecVersion::Draft6,
        SpecVersion::Draft7,
        SpecVersion::Draft201909,
        SpecVersion::Draft202012,
        SpecVersion::DraftNext,
    ];

    /// Detect a draft from a `$schema` URI. An empty trailing fragment is ignored.
    pub fn from_meta_schema_uri(uri: &str) -> Option<Self> {
        let uri = uri.trim_end_matches('#');
        match uri {
            "http://json-schema.org/draft-06/schema" => Some(SpecVersion::Draft6),
            "http://json-schema.org/draft-07/schema" => Some(SpecVersion::Draft7),
            "https://json-schema.org/draft/2019-09/schema" => Some(SpecVersion::Draft201909),
            "https://json-schema.org/draft/2020-12/schema" => Some(SpecVersion::Draft202012),
            "https://json-schema.org/draft/next/schema" => Some(SpecVersion::DraftNext),
            _ => None,
        }
    }

    pub fn meta_schema_uri(&self) -> &'static str {
        match self {
            SpecVersion::Draft6 => "http://json-schema.org/draft-06/schema#",
            SpecVersion::Draft7 => "http://json-schema.org/draft-07/schema#",
            SpecVersion::Draft201909 => "https://json-schema.org/draft/2019-09/schema",
            SpecVersion::Draft202012 => "https://json-schema.org/draft/2020-12/schema",
            SpecVersion::DraftNext => "https://json-schema.org/draft/next/schema",
        }
    }

    /// Drafts 6 and 7 ignore every sibling of `$ref`.
    pub fn ref_overrides_siblings(&self) -> bool {
        matches!(self, SpecVersion::Draft6 | SpecVersion::Draft7)
    }
}

/// Shape of the result tree handed back to the caller.
///
/// Evaluation always runs to completion; the format only prunes the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    /// Only the overall validity.
    Flag,
    /// One level of detail: every node with errors or annotations, flattened.
    List,
    /// The full tree.
    #[default]
    Hierarchical,
}

/// Options read by both compilation and evaluation.
///
/// Registries are shared behind `Arc`, so cloning options is cheap and
/// independent configurations can coexist.
#[derive(Debug, Clone)]
pub struct EvaluationOptions {
    /// Draft used when a schema has no `$schema`. Defaults to 2020-12.
    pub evaluate_as: Option<SpecVersion>,
    pub output_format: OutputFormat,
    /// Make `format` an assertion instead of an annotation.
    pub require_format_validation: bool,
    /// Maximum nesting of schema evaluations before aborting.
    pub max_depth: usize,
    /// Maximum number of schema evaluations per call.
    pub max_steps: Option<usize>,
    vocabularies: Arc<VocabularyRegistry>,
    schemas: Arc<SchemaRegistry>,
    messages: MessageTemplates,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            evaluate_as: None,
            output_format: OutputFormat::default(),
            require_format_validation: false,
            max_depth: DEFAULT_MAX_DEPTH,
            max_steps: None,
            vocabularies: Arc::new(VocabularyRegistry::standard()),
            schemas: Arc::new(SchemaRegistry::new()),
            messages: MessageTemplates::default(),
        }
    }
}

impl EvaluationOptions {
    /// Options with the standard vocabularies and an empty schema registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate_as(mut self, version: SpecVersion) -> Self {
        self.evaluate_as = Some(version);
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn require_format_validation(mut self, require: bool) -> Self {
        self.require_format_validation = require;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_vocabularies(mut self, vocabularies: Arc<VocabularyRegistry>) -> Self {
        self.vocabularies = vocabularies;
        self
    }

    pub fn with_schema_registry(mut self, schemas: Arc<SchemaRegistry>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn with_messages(mut self, messages: MessageTemplates) -> Self {
        self.messages = messages;
        self
    }

    pub fn vocabularies(&self) -> &VocabularyRegistry {
        &self.vocabularies
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn messages(&self) -> &MessageTemplates {
        &self.messages
    }

    /// The draft for a schema without `$schema`.
    pub fn default_version(&self) -> SpecVersion {
        self.evaluate_as.unwrap_or(SpecVersion::Draft202012)
    }
}
