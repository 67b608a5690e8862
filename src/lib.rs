//! JSON Constraint
//!
//! Compiles JSON Schema documents (drafts 6, 7, 2019-09, 2020-12 and next)
//! into reusable constraint graphs and evaluates JSON instances against them.
//!
//! Compilation resolves every reference once, including cycles, so a
//! [`CompiledSchema`] can be evaluated any number of times, from any number
//! of threads. Evaluation returns an [`EvaluationResults`] tree with the
//! verdict, failures and annotations of every schema node that ran.
//!
//! # Example
//!
//! ```
//! use json_constraint::{compile, EvaluationOptions};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "type": "object",
//!     "properties": {
//!         "id": { "type": "string" },
//!         "quantity": { "type": "integer", "minimum": 1 }
//!     },
//!     "required": ["id"]
//! });
//!
//! let compiled = compile(&schema, &EvaluationOptions::default()).unwrap();
//! assert!(compiled.is_valid(&json!({ "id": "a", "quantity": 2 })));
//!
//! let results = compiled.evaluate(&json!({ "quantity": 0 })).unwrap();
//! assert!(!results.is_valid());
//! let errors = results.collect_errors(compiled.options().messages());
//! assert!(errors.iter().any(|e| e.keyword == "required"));
//! assert!(errors.iter().any(|e| e.keyword == "minimum"));
//! ```
//!
//! # Extending
//!
//! Keywords are plain [`Keyword`] implementations grouped into
//! [`Vocabulary`]s. Register extra vocabularies on a [`VocabularyRegistry`]
//! and hand it to [`EvaluationOptions::with_vocabularies`]. Documents other
//! schemas point at go into a [`SchemaRegistry`], optionally backed by a
//! [`DocumentFetcher`] such as [`MirrorFetcher`].

mod compiler;
mod error;
mod evaluator;
mod keyword;
pub mod keywords;
mod loader;
mod messages;
mod pointer;
mod registry;
mod results;
mod schema;
mod types;
mod validator;
pub mod value;
mod vocabulary;

pub use compiler::{compile, compile_uri, CompileContext, CompiledSchema, ConstraintId, SchemaConstraint};
pub use error::{AbortReason, CompileError, EvaluationError, LoadError, SchemaError, ValidateError};
pub use keyword::{
    ChildDependency, ChildEvaluation, InstanceLocator, Keyword, KeywordConstraint,
    KeywordEvaluation, KeywordFactory, Located, Outcome, SchemaTarget,
};
pub use loader::{is_url, load_schema, load_schema_auto, load_schema_str, MirrorFetcher};
pub use messages::MessageTemplates;
pub use pointer::JsonPointer;
pub use registry::{Anchor, Document, DocumentFetcher, ResolvedNode, SchemaRegistry};
pub use results::{EvaluationResults, KeywordFailure};
pub use schema::Schema;
pub use types::{EvaluationOptions, OutputFormat, SpecVersion, DEFAULT_MAX_DEPTH};
pub use validator::{validate, validate_compiled};
pub use vocabulary::{KeywordDescriptor, Vocabulary, VocabularyRegistry};

#[cfg(feature = "remote")]
pub use loader::{load_schema_url, HttpFetcher};
