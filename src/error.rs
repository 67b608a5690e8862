//! Error types for loading, compiling, evaluating and validating.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::pointer::JsonPointer;

/// Errors while obtaining a document from outside the engine.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("no document source for {uri}")]
    Unsupported { uri: String },
}

/// Errors that make a schema impossible to compile.
///
/// All of them are fatal: no partially compiled schema is ever returned.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("malformed `{keyword}` at {location}: {message}")]
    MalformedKeyword {
        keyword: String,
        location: String,
        message: String,
    },

    #[error("cannot resolve reference \"{reference}\" against {base}")]
    UnresolvableReference { reference: String, base: String },

    #[error("keywords at {location} depend on each other in a cycle involving `{keyword}`")]
    CyclicKeywordDependency { location: String, keyword: String },

    #[error("schema requires unknown vocabulary {vocabulary}")]
    UnknownVocabularyRequired { vocabulary: String },

    #[error("unknown meta-schema {uri}")]
    UnknownMetaSchema { uri: String },

    #[error("value at {location} is not a schema (found {found})")]
    NotASchema { location: String, found: &'static str },

    #[error("invalid URI \"{uri}\": {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid regular expression \"{pattern}\": {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Why an evaluation was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Nested schema evaluations went deeper than the configured limit.
    MaxDepth(usize),
    /// More schema evaluations than the configured budget.
    MaxSteps(usize),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::MaxDepth(limit) => write!(f, "nesting depth exceeded {limit}"),
            AbortReason::MaxSteps(limit) => write!(f, "step budget of {limit} exhausted"),
        }
    }
}

/// The only evaluation-time failure. An instance that does not match is a
/// normal, invalid result and never produces this error.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("evaluation aborted at {}: {reason}", display_location(instance_location))]
    Aborted {
        reason: AbortReason,
        instance_location: JsonPointer,
    },
}

/// Errors from the one-call validation facade.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<SchemaError> },
}

/// Single validation failure with location context.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the invalid value.
    pub instance_location: JsonPointer,
    /// Keyword path through the schema, following references.
    pub evaluation_path: JsonPointer,
    /// The failing keyword.
    pub keyword: String,
    /// Human-readable error message.
    pub message: String,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            display_location(&self.instance_location),
            self.message
        )
    }
}

fn display_location(pointer: &JsonPointer) -> String {
    if pointer.is_root() {
        String::from("<root>")
    } else {
        pointer.to_string()
    }
}
