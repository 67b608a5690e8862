//! Schema compilation.
//!
//! A schema document is turned into an arena of [`SchemaConstraint`]s, one per
//! distinct schema node reached from the root. Nodes are identified by their
//! document URI and JSON Pointer. A node's slot is reserved before its keywords
//! are built, so a reference back to an ancestor yields the ancestor's id
//! instead of recursing.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::error::CompileError;
use crate::keyword::{Keyword, KeywordConstraint, SchemaTarget};
use crate::keywords::{vocab, Unrecognized};
use crate::pointer::JsonPointer;
use crate::registry::{split_reference, Document, ResolvedNode};
use crate::types::{EvaluationOptions, SpecVersion};
use crate::value::json_type_name;

/// Base for documents compiled without an absolute `$id`.
const ANONYMOUS_BASE: &str = "https://json-constraint.invalid/";

/// Index of a [`SchemaConstraint`] in a [`CompiledSchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

impl ConstraintId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The compiled form of one schema node.
#[derive(Debug)]
pub struct SchemaConstraint {
    id: ConstraintId,
    document: Url,
    base_uri: Url,
    location: JsonPointer,
    version: SpecVersion,
    resource_root: bool,
    keywords: Vec<KeywordConstraint>,
    dynamic_anchors: HashMap<String, ConstraintId>,
}

impl SchemaConstraint {
    fn reserved(
        id: ConstraintId,
        document: Url,
        base_uri: Url,
        location: JsonPointer,
        version: SpecVersion,
        resource_root: bool,
    ) -> Self {
        Self {
            id,
            document,
            base_uri,
            location,
            version,
            resource_root,
            keywords: Vec::new(),
            dynamic_anchors: HashMap::new(),
        }
    }

    pub fn id(&self) -> ConstraintId {
        self.id
    }

    pub fn document(&self) -> &Url {
        &self.document
    }

    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    /// Pointer of the node within its document.
    pub fn location(&self) -> &JsonPointer {
        &self.location
    }

    pub fn version(&self) -> SpecVersion {
        self.version
    }

    /// Whether the node starts a schema resource (document root or `$id`).
    pub fn is_resource_root(&self) -> bool {
        self.resource_root
    }

    /// Keyword constraints in evaluation order.
    pub fn keywords(&self) -> &[KeywordConstraint] {
        &self.keywords
    }

    /// Target of a dynamic anchor declared in this resource.
    pub fn dynamic_anchor(&self, name: &str) -> Option<ConstraintId> {
        self.dynamic_anchors.get(name).copied()
    }

    /// Absolute location, e.g. `https://example.com/s.json#/properties/a`.
    pub fn schema_location(&self) -> String {
        format!("{}#{}", self.document, self.location)
    }
}

/// An immutable, reusable compiled schema.
///
/// Evaluations only read it, so one instance can be shared across threads.
#[derive(Debug)]
pub struct CompiledSchema {
    constraints: Vec<SchemaConstraint>,
    root: ConstraintId,
    options: EvaluationOptions,
}

impl CompiledSchema {
    pub fn root(&self) -> ConstraintId {
        self.root
    }

    pub fn constraint(&self, id: ConstraintId) -> &SchemaConstraint {
        &self.constraints[id.0]
    }

    pub fn constraints(&self) -> &[SchemaConstraint] {
        &self.constraints
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }
}

/// Compile a schema value.
///
/// The value becomes an anonymous document unless it carries an absolute
/// `$id`. References to other documents go through the options' schema
/// registry.
pub fn compile(schema: &Value, options: &EvaluationOptions) -> Result<CompiledSchema, CompileError> {
    let version = schema
        .get("$schema")
        .and_then(Value::as_str)
        .and_then(SpecVersion::from_meta_schema_uri)
        .unwrap_or_else(|| options.default_version());
    let identified = !(version.ref_overrides_siblings() && schema.get("$ref").is_some());
    let uri = match schema.get("$id").and_then(Value::as_str).map(Url::parse) {
        Some(Ok(uri)) if identified => uri,
        _ => anonymous_uri()?,
    };
    let document = Arc::new(Document::new(uri, schema.clone(), options.default_version())?);
    let mut compiler = Compiler::new(options, Some(Arc::clone(&document)));
    compiler.run(document, JsonPointer::root())
}

/// Compile the schema at `uri` from the options' schema registry. A fragment
/// selects a subschema.
pub fn compile_uri(uri: &str, options: &EvaluationOptions) -> Result<CompiledSchema, CompileError> {
    let base = Url::parse(uri).map_err(|source| CompileError::InvalidUri {
        uri: uri.to_string(),
        source,
    })?;
    let mut compiler = Compiler::new(options, None);
    let target = compiler.resolve(&base, uri)?;
    compiler.run(target.document, target.pointer)
}

fn anonymous_uri() -> Result<Url, CompileError> {
    let raw = format!("{ANONYMOUS_BASE}{}", Uuid::new_v4());
    Url::parse(&raw).map_err(|source| CompileError::InvalidUri { uri: raw, source })
}

/// Draft and active vocabularies of a schema resource.
#[derive(Debug, Clone)]
struct Dialect {
    version: SpecVersion,
    /// `None` when the meta-schema does not restrict vocabularies.
    vocabularies: Option<Arc<[String]>>,
}

pub(crate) struct Compiler {
    options: EvaluationOptions,
    root_document: Option<Arc<Document>>,
    slots: Vec<SchemaConstraint>,
    memo: HashMap<(Url, JsonPointer), ConstraintId>,
    regexes: HashMap<String, Arc<Regex>>,
    dialects: HashMap<String, Dialect>,
}

impl Compiler {
    fn new(options: &EvaluationOptions, root_document: Option<Arc<Document>>) -> Self {
        Self {
            options: options.clone(),
            root_document,
            slots: Vec::new(),
            memo: HashMap::new(),
            regexes: HashMap::new(),
            dialects: HashMap::new(),
        }
    }

    fn run(mut self, document: Arc<Document>, pointer: JsonPointer) -> Result<CompiledSchema, CompileError> {
        tracing::debug!(document = %document.uri(), location = %pointer, "compiling schema");
        let root = self.compile_node(document, pointer)?;
        tracing::debug!(constraints = self.slots.len(), "schema compiled");
        Ok(CompiledSchema {
            constraints: self.slots,
            root,
            options: self.options,
        })
    }

    /// Resolve a reference, preferring the document being compiled over the
    /// registry.
    fn resolve(&self, base: &Url, reference: &str) -> Result<ResolvedNode, CompileError> {
        let (resource, fragment) = split_reference(base, reference)?;
        let local = self.root_document.as_ref().and_then(|document| {
            document
                .resource(&resource)
                .map(|pointer| (Arc::clone(document), pointer.clone()))
        });
        let found = match local {
            Some(found) => Some(found),
            None => self
                .options
                .schemas()
                .lookup_resource(&resource, self.options.default_version())?,
        };
        found
            .and_then(|(document, pointer)| document.locate(pointer, &fragment))
            .ok_or_else(|| CompileError::UnresolvableReference {
                reference: reference.to_string(),
                base: base.to_string(),
            })
    }

    fn compile_node(&mut self, document: Arc<Document>, pointer: JsonPointer) -> Result<ConstraintId, CompileError> {
        let key = (document.uri().clone(), pointer.clone());
        if let Some(&id) = self.memo.get(&key) {
            return Ok(id);
        }
        let value = document
            .node(&pointer)
            .ok_or_else(|| CompileError::UnresolvableReference {
                reference: format!("#{pointer}"),
                base: document.uri().to_string(),
            })?;
        let location = format!("{}#{}", document.uri(), pointer);
        let dialect = self.dialect(&document, &pointer)?;
        let base_uri = document.base_at(&pointer).clone();
        let resource_root = document.is_resource_root(&pointer);

        let id = ConstraintId(self.slots.len());
        self.memo.insert(key, id);
        self.slots.push(SchemaConstraint::reserved(
            id,
            document.uri().clone(),
            base_uri.clone(),
            pointer.clone(),
            dialect.version,
            resource_root,
        ));

        let keywords = match value {
            Value::Bool(true) => Vec::new(),
            Value::Bool(false) => vec![KeywordConstraint::new("false", |eval| eval.fail_plain())],
            Value::Object(map) => {
                let pending = self.instantiate(map, &dialect, &location)?;
                let mut ctx = CompileContext {
                    compiler: self,
                    document: Arc::clone(&document),
                    pointer: pointer.clone(),
                    base_uri: base_uri.clone(),
                    dialect: dialect.clone(),
                };
                let mut built: Vec<KeywordConstraint> = Vec::with_capacity(pending.len());
                for (priority, declaration, keyword) in &pending {
                    let mut constraint = keyword.constraint(&mut ctx, &built)?;
                    constraint.priority = *priority;
                    constraint.declaration = *declaration;
                    built.push(constraint);
                }
                order_constraints(built, &location)?
            }
            other => {
                return Err(CompileError::NotASchema {
                    location,
                    found: json_type_name(other),
                })
            }
        };

        let mut dynamic_anchors = HashMap::new();
        if resource_root {
            let anchors: Vec<(String, JsonPointer)> = document
                .dynamic_anchors(&base_uri)
                .map(|(name, target)| (name.to_string(), target.clone()))
                .collect();
            for (name, target) in anchors {
                let target = self.compile_node(Arc::clone(&document), target)?;
                dynamic_anchors.insert(name, target);
            }
            if dialect.version == SpecVersion::Draft201909
                && value.get("$recursiveAnchor") == Some(&Value::Bool(true))
            {
                dynamic_anchors.insert(String::new(), id);
            }
        }

        let slot = &mut self.slots[id.0];
        slot.keywords = keywords;
        slot.dynamic_anchors = dynamic_anchors;
        tracing::trace!(%location, keywords = slot.keywords.len(), "compiled schema node");
        Ok(id)
    }

    /// Build keyword instances for a schema object, sorted by
    /// (priority, declaration).
    fn instantiate(
        &self,
        map: &serde_json::Map<String, Value>,
        dialect: &Dialect,
        location: &str,
    ) -> Result<Vec<(i64, usize, Box<dyn Keyword>)>, CompileError> {
        let registry = self.options.vocabularies();
        let only_ref = dialect.version.ref_overrides_siblings() && map.contains_key("$ref");
        let mut pending: Vec<(i64, usize, Box<dyn Keyword>)> = Vec::with_capacity(map.len());
        for (declaration, (name, payload)) in map.iter().enumerate() {
            if only_ref && name != "$ref" {
                continue;
            }
            match registry.descriptor(name, dialect.version, dialect.vocabularies.as_deref()) {
                Some(descriptor) => {
                    let keyword = (descriptor.factory())(payload).map_err(|message| {
                        CompileError::MalformedKeyword {
                            keyword: name.clone(),
                            location: location.to_string(),
                            message,
                        }
                    })?;
                    pending.push((descriptor.priority(), declaration, keyword));
                }
                None => {
                    tracing::trace!(keyword = %name, %location, "unknown keyword kept as annotation");
                    pending.push((0, declaration, Box::new(Unrecognized::new(name, payload))));
                }
            }
        }
        pending.sort_by_key(|(priority, declaration, _)| (*priority, *declaration));
        Ok(pending)
    }

    /// The dialect in effect at `pointer`: the nearest `$schema` at or above
    /// it, else the configured default draft.
    fn dialect(&mut self, document: &Document, pointer: &JsonPointer) -> Result<Dialect, CompileError> {
        let declared = (0..=pointer.len()).rev().find_map(|len| {
            let ancestor = JsonPointer::from_segments(pointer.segments()[..len].iter().cloned());
            document
                .node(&ancestor)?
                .get("$schema")?
                .as_str()
                .map(str::to_string)
        });
        let Some(uri) = declared else {
            return Ok(Dialect {
                version: self.options.default_version(),
                vocabularies: None,
            });
        };
        if let Some(dialect) = self.dialects.get(&uri) {
            return Ok(dialect.clone());
        }
        let dialect = match SpecVersion::from_meta_schema_uri(&uri) {
            Some(version) => Dialect {
                version,
                vocabularies: None,
            },
            None => self.custom_dialect(&uri)?,
        };
        self.dialects.insert(uri, dialect.clone());
        Ok(dialect)
    }

    /// Read the draft and `$vocabulary` of a registered custom meta-schema.
    fn custom_dialect(&self, uri: &str) -> Result<Dialect, CompileError> {
        let unknown = || CompileError::UnknownMetaSchema {
            uri: uri.to_string(),
        };
        let base = Url::parse(uri).map_err(|_| unknown())?;
        let resolved = self.resolve(&base, uri).map_err(|_| unknown())?;
        let meta = resolved.value().ok_or_else(unknown)?;
        let version = meta
            .get("$schema")
            .and_then(Value::as_str)
            .and_then(SpecVersion::from_meta_schema_uri)
            .unwrap_or_else(|| self.options.default_version());
        let Some(declared) = meta.get("$vocabulary").and_then(Value::as_object) else {
            return Ok(Dialect {
                version,
                vocabularies: None,
            });
        };
        let registry = self.options.vocabularies();
        let mut active: Vec<String> = vocab::CORE.iter().map(|id| id.to_string()).collect();
        for (id, required) in declared {
            if registry.is_known(id) {
                active.push(id.clone());
            } else if required.as_bool() == Some(true) {
                return Err(CompileError::UnknownVocabularyRequired {
                    vocabulary: id.clone(),
                });
            } else {
                tracing::debug!(vocabulary = %id, meta_schema = uri, "ignoring unknown optional vocabulary");
            }
        }
        Ok(Dialect {
            version,
            vocabularies: Some(Arc::from(active)),
        })
    }

    fn regex(&mut self, pattern: &str) -> Result<Arc<Regex>, CompileError> {
        if let Some(regex) = self.regexes.get(pattern) {
            return Ok(Arc::clone(regex));
        }
        let regex = Regex::new(pattern).map_err(|source| CompileError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;
        let regex = Arc::new(regex);
        self.regexes.insert(pattern.to_string(), Arc::clone(&regex));
        Ok(regex)
    }
}

/// Order keyword constraints so every sibling dependency runs first.
///
/// Among keywords that are free to run, lower priority goes first, then
/// earlier declaration.
fn order_constraints(
    constraints: Vec<KeywordConstraint>,
    location: &str,
) -> Result<Vec<KeywordConstraint>, CompileError> {
    let count = constraints.len();
    let dependencies: Vec<Vec<usize>> = {
        let by_name: HashMap<&str, usize> = constraints
            .iter()
            .enumerate()
            .map(|(i, constraint)| (constraint.keyword(), i))
            .collect();
        constraints
            .iter()
            .map(|constraint| {
                let mut deps: Vec<usize> = constraint
                    .sibling_dependencies()
                    .iter()
                    .filter_map(|name| by_name.get(name.as_str()).copied())
                    .collect();
                deps.sort_unstable();
                deps.dedup();
                deps
            })
            .collect()
    };

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(count, count);
    let nodes: Vec<NodeIndex> = (0..count).map(|i| graph.add_node(i)).collect();
    for (i, deps) in dependencies.iter().enumerate() {
        for &dep in deps {
            graph.add_edge(nodes[dep], nodes[i], ());
        }
    }
    if let Err(cycle) = toposort(&graph, None) {
        return Err(CompileError::CyclicKeywordDependency {
            location: location.to_string(),
            keyword: constraints[graph[cycle.node_id()]].keyword().to_string(),
        });
    }

    let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (i, deps) in dependencies.iter().enumerate() {
        for &dep in deps {
            dependents[dep].push(i);
        }
    }
    let rank = |i: usize| Reverse((constraints[i].priority, constraints[i].declaration, i));
    let mut ready: BinaryHeap<_> = (0..count).filter(|&i| remaining[i] == 0).map(rank).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(Reverse((_, _, next))) = ready.pop() {
        order.push(next);
        for &dependent in &dependents[next] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.push(rank(dependent));
            }
        }
    }

    let mut position = vec![0; count];
    for (pos, &i) in order.iter().enumerate() {
        position[i] = pos;
    }
    let mut slots: Vec<Option<KeywordConstraint>> = constraints.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(count);
    for &i in &order {
        if let Some(mut constraint) = slots[i].take() {
            constraint.resolved_siblings = dependencies[i].iter().map(|&dep| position[dep]).collect();
            ordered.push(constraint);
        }
    }
    Ok(ordered)
}

/// What a keyword sees while building its constraint.
pub struct CompileContext<'c> {
    compiler: &'c mut Compiler,
    document: Arc<Document>,
    pointer: JsonPointer,
    base_uri: Url,
    dialect: Dialect,
}

impl<'c> CompileContext<'c> {
    pub fn spec_version(&self) -> SpecVersion {
        self.dialect.version
    }

    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    /// Pointer of the schema node within its document.
    pub fn location(&self) -> &JsonPointer {
        &self.pointer
    }

    pub fn schema_location(&self) -> String {
        format!("{}#{}", self.document.uri(), self.pointer)
    }

    /// Payload of another keyword in the same schema object.
    pub fn sibling_payload(&self, keyword: &str) -> Option<&Value> {
        self.document.node(&self.pointer)?.get(keyword)
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.compiler.options
    }

    /// Whether the dialect's meta-schema explicitly enables `vocabulary`.
    pub fn vocabulary_active(&self, vocabulary: &str) -> bool {
        self.dialect
            .vocabularies
            .as_ref()
            .is_some_and(|active| active.iter().any(|id| id == vocabulary))
    }

    /// Compile the subschema at `path` below the current node, e.g.
    /// `["properties", "name"]`.
    pub fn subschema(&mut self, path: &[&str]) -> Result<ConstraintId, CompileError> {
        let mut target = self.pointer.clone();
        for segment in path {
            target.push(*segment);
        }
        self.compiler.compile_node(Arc::clone(&self.document), target)
    }

    /// Resolve `reference` against the current base URI and compile its target.
    pub fn reference(&mut self, reference: &str) -> Result<ConstraintId, CompileError> {
        let target = self.compiler.resolve(&self.base_uri, reference)?;
        self.compiler.compile_node(target.document, target.pointer)
    }

    /// A `$dynamicRef` target. Dynamic only when the statically resolved
    /// fragment names a `$dynamicAnchor`.
    pub fn dynamic_reference(&mut self, reference: &str) -> Result<SchemaTarget, CompileError> {
        let target = self.compiler.resolve(&self.base_uri, reference)?;
        let anchor = target.dynamic_anchor.clone();
        let fallback = self.compiler.compile_node(target.document, target.pointer)?;
        Ok(match anchor {
            Some(anchor) => SchemaTarget::Dynamic { anchor, fallback },
            None => SchemaTarget::Static(fallback),
        })
    }

    /// A `$recursiveRef: "#"` target. Dynamic only when the current resource
    /// root declares `$recursiveAnchor: true`.
    pub fn recursive_reference(&mut self, reference: &str) -> Result<SchemaTarget, CompileError> {
        let target = self.compiler.resolve(&self.base_uri, reference)?;
        let recursive = target
            .value()
            .and_then(|node| node.get("$recursiveAnchor"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let fallback = self.compiler.compile_node(target.document, target.pointer)?;
        Ok(if recursive {
            SchemaTarget::Dynamic {
                anchor: String::new(),
                fallback,
            }
        } else {
            SchemaTarget::Static(fallback)
        })
    }

    /// Compile a pattern, sharing compiled regexes across the schema.
    pub fn regex(&mut self, pattern: &str) -> Result<Arc<Regex>, CompileError> {
        self.compiler.regex(pattern)
    }

    /// A malformed-payload error for `keyword` at the current node.
    pub fn malformed(&self, keyword: &str, message: impl Into<String>) -> CompileError {
        CompileError::MalformedKeyword {
            keyword: keyword.to_string(),
            location: self.schema_location(),
            message: message.into(),
        }
    }
}
