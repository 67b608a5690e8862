//! The uniform keyword contract.
//!
//! A keyword is parsed from its payload by a factory, then asked once per
//! schema node to contribute a [`KeywordConstraint`]: a name, an optional
//! evaluation function and its sibling/child dependencies. Everything a
//! keyword does at evaluation time goes through [`KeywordEvaluation`].

use std::borrow::Cow;
use std::fmt;

use serde_json::{Map, Value};

use crate::compiler::{CompileContext, ConstraintId};
use crate::error::CompileError;
use crate::pointer::JsonPointer;
use crate::results::{EvaluationResults, KeywordFailure};
use crate::types::EvaluationOptions;

/// A parsed schema keyword.
pub trait Keyword: fmt::Debug + Send + Sync {
    /// The keyword as it appears in the schema.
    fn name(&self) -> &str;

    /// The payload as it appears in the schema, for serialization.
    fn payload(&self) -> Value;

    /// Build the constraint for the node being compiled.
    ///
    /// `siblings` holds the constraints already built for this node, in
    /// priority order.
    fn constraint(
        &self,
        ctx: &mut CompileContext<'_>,
        siblings: &[KeywordConstraint],
    ) -> Result<KeywordConstraint, CompileError>;
}

/// Builds a keyword from its payload. The error is a shape description such
/// as `"expected a non-negative integer"`.
pub type KeywordFactory = fn(&Value) -> Result<Box<dyn Keyword>, String>;

type Evaluate = Box<dyn Fn(&mut KeywordEvaluation<'_>) + Send + Sync>;
type Locate =
    Box<dyn for<'a> Fn(&'a Value, &EvaluationResults) -> Vec<Located<'a>> + Send + Sync>;

/// The compiled, instance-independent form of one keyword.
pub struct KeywordConstraint {
    keyword: String,
    evaluator: Option<Evaluate>,
    sibling_dependencies: Vec<String>,
    child_dependencies: Vec<ChildDependency>,
    pub(crate) priority: i64,
    pub(crate) declaration: usize,
    pub(crate) resolved_siblings: Vec<usize>,
}

impl KeywordConstraint {
    pub fn new<F>(keyword: impl Into<String>, evaluator: F) -> Self
    where
        F: Fn(&mut KeywordEvaluation<'_>) + Send + Sync + 'static,
    {
        Self {
            keyword: keyword.into(),
            evaluator: Some(Box::new(evaluator)),
            sibling_dependencies: Vec::new(),
            child_dependencies: Vec::new(),
            priority: 0,
            declaration: 0,
            resolved_siblings: Vec::new(),
        }
    }

    /// A constraint that never runs and contributes nothing.
    pub fn skip(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            evaluator: None,
            sibling_dependencies: Vec::new(),
            child_dependencies: Vec::new(),
            priority: 0,
            declaration: 0,
            resolved_siblings: Vec::new(),
        }
    }

    /// Run after `keyword` if it is present in the same schema.
    pub fn after(mut self, keyword: impl Into<String>) -> Self {
        self.sibling_dependencies.push(keyword.into());
        self
    }

    pub fn after_all<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sibling_dependencies
            .extend(keywords.into_iter().map(Into::into));
        self
    }

    pub fn with_child(mut self, child: ChildDependency) -> Self {
        self.child_dependencies.push(child);
        self
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn sibling_dependencies(&self) -> &[String] {
        &self.sibling_dependencies
    }

    pub fn child_dependencies(&self) -> &[ChildDependency] {
        &self.child_dependencies
    }

    pub fn is_skip(&self) -> bool {
        self.evaluator.is_none()
    }

    pub(crate) fn evaluator(&self) -> Option<&Evaluate> {
        self.evaluator.as_ref()
    }
}

impl fmt::Debug for KeywordConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordConstraint")
            .field("keyword", &self.keyword)
            .field("skip", &self.evaluator.is_none())
            .field("sibling_dependencies", &self.sibling_dependencies)
            .field("child_dependencies", &self.child_dependencies)
            .finish()
    }
}

/// Which schema a child dependency evaluates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaTarget {
    Static(ConstraintId),
    /// Resolved against the dynamic scope at evaluation time, falling back
    /// to the statically resolved schema.
    Dynamic {
        anchor: String,
        fallback: ConstraintId,
    },
}

/// A nested schema a keyword needs evaluated before it runs.
#[derive(Debug)]
pub struct ChildDependency {
    pub(crate) target: SchemaTarget,
    pub(crate) relative_path: JsonPointer,
    pub(crate) locator: InstanceLocator,
}

impl ChildDependency {
    /// `relative_path` is the keyword path from the owning schema, e.g.
    /// `/properties/name`.
    pub fn new(target: SchemaTarget, relative_path: JsonPointer, locator: InstanceLocator) -> Self {
        Self {
            target,
            relative_path,
            locator,
        }
    }

    pub fn target(&self) -> &SchemaTarget {
        &self.target
    }

    pub fn relative_path(&self) -> &JsonPointer {
        &self.relative_path
    }
}

/// An instance value selected for a child evaluation.
#[derive(Debug, Clone)]
pub struct Located<'a> {
    /// Path segment relative to the current instance location; `None` is the
    /// same location.
    pub segment: Option<String>,
    pub value: Cow<'a, Value>,
}

impl<'a> Located<'a> {
    pub fn same(value: &'a Value) -> Self {
        Self {
            segment: None,
            value: Cow::Borrowed(value),
        }
    }

    pub fn child(segment: impl Into<String>, value: &'a Value) -> Self {
        Self {
            segment: Some(segment.into()),
            value: Cow::Borrowed(value),
        }
    }
}

/// Chooses the instance locations a child schema is evaluated at.
pub enum InstanceLocator {
    Same,
    /// The named property, when present.
    Property(String),
    /// Every array item from the given index on.
    Items { start: usize },
    /// A single array item, when present.
    Item(usize),
    /// Every property name, evaluated as a string instance.
    PropertyNames,
    /// Decided per instance, with the owning node's results so far.
    Custom(Locate),
}

impl InstanceLocator {
    pub fn custom<F>(locate: F) -> Self
    where
        F: for<'a> Fn(&'a Value, &EvaluationResults) -> Vec<Located<'a>> + Send + Sync + 'static,
    {
        InstanceLocator::Custom(Box::new(locate))
    }

    pub(crate) fn locate<'a>(&self, instance: &'a Value, node: &EvaluationResults) -> Vec<Located<'a>> {
        match self {
            InstanceLocator::Same => vec![Located::same(instance)],
            InstanceLocator::Property(name) => instance
                .as_object()
                .and_then(|map| map.get(name))
                .map(|value| vec![Located::child(name.clone(), value)])
                .unwrap_or_default(),
            InstanceLocator::Items { start } => instance
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .enumerate()
                        .skip(*start)
                        .map(|(i, item)| Located::child(i.to_string(), item))
                        .collect()
                })
                .unwrap_or_default(),
            InstanceLocator::Item(index) => instance
                .as_array()
                .and_then(|items| items.get(*index))
                .map(|item| vec![Located::child(index.to_string(), item)])
                .unwrap_or_default(),
            InstanceLocator::PropertyNames => instance
                .as_object()
                .map(|map| {
                    map.keys()
                        .map(|key| Located {
                            segment: Some(key.clone()),
                            value: Cow::Owned(Value::String(key.clone())),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            InstanceLocator::Custom(locate) => locate(instance, node),
        }
    }
}

impl fmt::Debug for InstanceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceLocator::Same => f.write_str("Same"),
            InstanceLocator::Property(name) => f.debug_tuple("Property").field(name).finish(),
            InstanceLocator::Items { start } => {
                f.debug_struct("Items").field("start", start).finish()
            }
            InstanceLocator::Item(index) => f.debug_tuple("Item").field(index).finish(),
            InstanceLocator::PropertyNames => f.write_str("PropertyNames"),
            InstanceLocator::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Outcome of one keyword for one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

/// One child evaluation requested by the current keyword.
#[derive(Debug)]
pub struct ChildEvaluation {
    /// Index into the keyword's child dependencies.
    pub dependency: usize,
    /// Instance path segment, `None` for the same location.
    pub segment: Option<String>,
    pub results: EvaluationResults,
}

/// The state a keyword's evaluation function works on.
pub struct KeywordEvaluation<'e> {
    keyword: &'e str,
    instance: &'e Value,
    instance_location: &'e JsonPointer,
    node: &'e mut EvaluationResults,
    children: &'e [ChildEvaluation],
    options: &'e EvaluationOptions,
    outcome: Outcome,
}

impl<'e> KeywordEvaluation<'e> {
    pub(crate) fn new(
        keyword: &'e str,
        instance: &'e Value,
        instance_location: &'e JsonPointer,
        node: &'e mut EvaluationResults,
        children: &'e [ChildEvaluation],
        options: &'e EvaluationOptions,
    ) -> Self {
        Self {
            keyword,
            instance,
            instance_location,
            node,
            children,
            options,
            outcome: Outcome::Passed,
        }
    }

    pub fn keyword(&self) -> &str {
        self.keyword
    }

    pub fn instance(&self) -> &'e Value {
        self.instance
    }

    pub fn instance_location(&self) -> &JsonPointer {
        self.instance_location
    }

    pub fn options(&self) -> &EvaluationOptions {
        self.options
    }

    /// Child results for this keyword, in dependency order.
    pub fn children(&self) -> &'e [ChildEvaluation] {
        self.children
    }

    /// Annotation recorded by an earlier sibling.
    pub fn sibling_annotation(&self, keyword: &str) -> Option<&Value> {
        self.node.annotations.get(keyword)
    }

    /// Whether an earlier sibling failed.
    pub fn sibling_failed(&self, keyword: &str) -> bool {
        self.node.errors.contains_key(keyword)
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// The keyword does not apply to this instance.
    pub fn mark_skipped(&mut self) {
        self.outcome = Outcome::Skipped;
        self.node.annotations.shift_remove(self.keyword);
    }

    pub fn annotate(&mut self, value: Value) {
        if self.outcome == Outcome::Passed {
            self.node.annotations.insert(self.keyword.to_string(), value);
        }
    }

    /// Record a failure under this keyword with a message template key.
    pub fn fail<'k, I>(&mut self, key: &str, substitutions: I)
    where
        I: IntoIterator<Item = (&'k str, Value)>,
    {
        let substitutions: Map<String, Value> = substitutions
            .into_iter()
            .map(|(token, value)| (token.to_string(), value))
            .collect();
        self.outcome = Outcome::Failed;
        self.node.annotations.shift_remove(self.keyword);
        self.node.errors.insert(
            self.keyword.to_string(),
            KeywordFailure {
                key: key.to_string(),
                substitutions,
            },
        );
    }

    /// Fail with the keyword's own template key and no substitutions.
    pub fn fail_plain(&mut self) {
        let key = self.keyword.to_string();
        self.fail(&key, std::iter::empty());
    }
}
