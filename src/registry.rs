//! Schema documents, resource identifiers and reference resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use percent_encoding::percent_decode_str;
use serde_json::Value;
use url::Url;

use crate::error::{CompileError, LoadError};
use crate::pointer::JsonPointer;
use crate::types::SpecVersion;

/// Supplies documents the registry does not hold yet.
///
/// Called synchronously while compiling, never during evaluation.
pub trait DocumentFetcher: Send + Sync {
    fn fetch(&self, uri: &Url) -> Result<Value, LoadError>;
}

/// Keywords whose payload is instance data, not schemas.
const DATA_KEYWORDS: &[&str] = &["enum", "const", "examples", "default"];

/// Keywords mapping names to subschemas.
const SCHEMA_MAPS: &[&str] = &[
    "$defs",
    "definitions",
    "properties",
    "patternProperties",
    "dependentSchemas",
    "dependencies",
];

/// A named location inside a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub pointer: JsonPointer,
    /// Declared with `$dynamicAnchor`.
    pub dynamic: bool,
}

/// A registered schema document with its resource and anchor tables.
#[derive(Debug)]
pub struct Document {
    uri: Url,
    root: Value,
    resources: Vec<(JsonPointer, Url)>,
    anchors: HashMap<(Url, String), Anchor>,
}

impl Document {
    /// Index `root` as the document at `uri`.
    ///
    /// `version` is the draft of nodes without a `$schema` of their own.
    pub fn new(uri: Url, root: Value, version: SpecVersion) -> Result<Self, CompileError> {
        let uri = without_fragment(uri);
        let mut document = Self {
            resources: vec![(JsonPointer::root(), uri.clone())],
            uri,
            root: Value::Null,
            anchors: HashMap::new(),
        };
        let base = document.uri.clone();
        document.index(&root, &JsonPointer::root(), &base, version)?;
        document.root = root;
        Ok(document)
    }

    fn index(
        &mut self,
        node: &Value,
        pointer: &JsonPointer,
        base: &Url,
        version: SpecVersion,
    ) -> Result<(), CompileError> {
        match node {
            Value::Object(map) => {
                let version = map
                    .get("$schema")
                    .and_then(Value::as_str)
                    .and_then(SpecVersion::from_meta_schema_uri)
                    .unwrap_or(version);
                let mut base = base.clone();
                // draft 6/7 `$ref` hides its siblings, identifiers included
                if !(version.ref_overrides_siblings() && map.contains_key("$ref")) {
                    base = self.identify(map, pointer, base)?;
                }
                for (key, child) in map {
                    if DATA_KEYWORDS.contains(&key.as_str()) {
                        continue;
                    }
                    let at = pointer.join(key.clone());
                    match child {
                        Value::Object(entries) if SCHEMA_MAPS.contains(&key.as_str()) => {
                            for (name, schema) in entries {
                                self.index(schema, &at.join(name.clone()), &base, version)?;
                            }
                        }
                        _ => self.index(child, &at, &base, version)?,
                    }
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.index(item, &pointer.join(i.to_string()), base, version)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Record the resource and anchors a schema object declares; returns
    /// the base URI in effect inside it.
    fn identify(
        &mut self,
        map: &serde_json::Map<String, Value>,
        pointer: &JsonPointer,
        mut base: Url,
    ) -> Result<Url, CompileError> {
        if let Some(id) = map.get("$id").and_then(Value::as_str) {
            if let Some(name) = id.strip_prefix('#') {
                // draft 6/7 plain-name identifier
                if !name.is_empty() {
                    self.add_anchor(&base, name, pointer, false);
                }
            } else {
                let joined = base.join(id).map_err(|source| CompileError::InvalidUri {
                    uri: id.to_string(),
                    source,
                })?;
                let fragment = joined.fragment().unwrap_or_default().to_string();
                base = without_fragment(joined);
                self.resources.push((pointer.clone(), base.clone()));
                if !fragment.is_empty() && !fragment.starts_with('/') {
                    self.add_anchor(&base, &fragment, pointer, false);
                }
            }
        }
        if let Some(name) = map.get("$anchor").and_then(Value::as_str) {
            self.add_anchor(&base, name, pointer, false);
        }
        if let Some(name) = map.get("$dynamicAnchor").and_then(Value::as_str) {
            self.add_anchor(&base, name, pointer, true);
        }
        Ok(base)
    }

    fn add_anchor(&mut self, base: &Url, name: &str, pointer: &JsonPointer, dynamic: bool) {
        self.anchors.insert(
            (base.clone(), name.to_string()),
            Anchor {
                pointer: pointer.clone(),
                dynamic,
            },
        );
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn node(&self, pointer: &JsonPointer) -> Option<&Value> {
        pointer.resolve(&self.root)
    }

    /// Base URI in effect at `pointer`: the innermost enclosing resource.
    pub fn base_at(&self, pointer: &JsonPointer) -> &Url {
        let mut best = &self.resources[0];
        for entry in &self.resources[1..] {
            if pointer.starts_with(&entry.0) && entry.0.len() >= best.0.len() {
                best = entry;
            }
        }
        &best.1
    }

    pub fn is_resource_root(&self, pointer: &JsonPointer) -> bool {
        self.resources.iter().any(|(p, _)| p == pointer)
    }

    /// Resources declared in this document, root first.
    pub fn resources(&self) -> impl Iterator<Item = (&JsonPointer, &Url)> {
        self.resources.iter().map(|(p, u)| (p, u))
    }

    /// Pointer of the resource identified by `url`, if this document declares it.
    pub fn resource(&self, url: &Url) -> Option<&JsonPointer> {
        self.resources
            .iter()
            .rev()
            .find(|(_, resource)| resource == url)
            .map(|(pointer, _)| pointer)
    }

    /// Apply a decoded fragment within the resource rooted at `resource_pointer`.
    pub(crate) fn locate(self: Arc<Self>, resource_pointer: JsonPointer, fragment: &str) -> Option<ResolvedNode> {
        if fragment.is_empty() {
            return Some(ResolvedNode {
                document: self,
                pointer: resource_pointer,
                dynamic_anchor: None,
            });
        }
        if fragment.starts_with('/') {
            let pointer = resource_pointer.concat(&JsonPointer::parse(fragment)?);
            self.node(&pointer)?;
            return Some(ResolvedNode {
                document: self,
                pointer,
                dynamic_anchor: None,
            });
        }
        let anchor = self.anchor(self.base_at(&resource_pointer), fragment)?.clone();
        Some(ResolvedNode {
            document: self,
            pointer: anchor.pointer,
            dynamic_anchor: anchor.dynamic.then(|| fragment.to_string()),
        })
    }

    pub fn anchor(&self, resource: &Url, name: &str) -> Option<&Anchor> {
        self.anchors.get(&(resource.clone(), name.to_string()))
    }

    /// `$dynamicAnchor` names declared directly in `resource`.
    pub fn dynamic_anchors<'d>(&'d self, resource: &'d Url) -> impl Iterator<Item = (&'d str, &'d JsonPointer)> + 'd {
        self.anchors
            .iter()
            .filter(move |((base, _), anchor)| anchor.dynamic && base == resource)
            .map(|((_, name), anchor)| (name.as_str(), &anchor.pointer))
    }
}

/// Where a reference landed.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub document: Arc<Document>,
    pub pointer: JsonPointer,
    /// Set when the fragment named a `$dynamicAnchor`.
    pub dynamic_anchor: Option<String>,
}

impl ResolvedNode {
    pub fn value(&self) -> Option<&Value> {
        self.document.node(&self.pointer)
    }
}

#[derive(Default)]
struct Store {
    documents: HashMap<Url, Arc<Document>>,
    /// Resource URI to owning document and the resource's pointer in it.
    resources: HashMap<Url, (Arc<Document>, JsonPointer)>,
}

/// URI-addressed store of schema documents.
///
/// Safe for concurrent reads. Documents registered after a schema was
/// compiled do not affect that compiled schema.
#[derive(Default)]
pub struct SchemaRegistry {
    store: RwLock<Store>,
    fetcher: Option<Arc<dyn DocumentFetcher>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch unknown documents through `fetcher`.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Register `value` as the document at `uri`, replacing any previous one.
    ///
    /// Nodes without `$schema` are indexed as 2020-12.
    pub fn register_document(&self, uri: &str, value: Value) -> Result<Arc<Document>, CompileError> {
        self.register_document_as(uri, value, SpecVersion::Draft202012)
    }

    /// Like [`register_document`](Self::register_document), indexing nodes
    /// without `$schema` as `version`.
    pub fn register_document_as(
        &self,
        uri: &str,
        value: Value,
        version: SpecVersion,
    ) -> Result<Arc<Document>, CompileError> {
        let url = Url::parse(uri).map_err(|source| CompileError::InvalidUri {
            uri: uri.to_string(),
            source,
        })?;
        self.insert(url, value, version)
    }

    fn insert(&self, url: Url, value: Value, version: SpecVersion) -> Result<Arc<Document>, CompileError> {
        let document = Arc::new(Document::new(url, value, version)?);
        let mut store = self.store.write();
        for (pointer, resource) in document.resources() {
            store
                .resources
                .insert(resource.clone(), (Arc::clone(&document), pointer.clone()));
        }
        store
            .documents
            .insert(document.uri().clone(), Arc::clone(&document));
        tracing::debug!(
            uri = %document.uri(),
            resources = document.resources.len(),
            anchors = document.anchors.len(),
            "registered schema document"
        );
        Ok(document)
    }

    pub fn contains(&self, uri: &str) -> bool {
        Url::parse(uri)
            .map(|url| self.store.read().resources.contains_key(&without_fragment(url)))
            .unwrap_or(false)
    }

    pub fn document(&self, uri: &str) -> Option<Arc<Document>> {
        let url = without_fragment(Url::parse(uri).ok()?);
        self.store.read().documents.get(&url).cloned()
    }

    pub fn len(&self) -> usize {
        self.store.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `reference` against `base`.
    ///
    /// An empty fragment is the resource root, `/...` a JSON Pointer from the
    /// resource root, anything else an anchor name.
    pub fn resolve(&self, base: &Url, reference: &str) -> Result<ResolvedNode, CompileError> {
        let (resource, fragment) = split_reference(base, reference)?;
        self.lookup_resource(&resource, SpecVersion::Draft202012)?
            .and_then(|(document, pointer)| document.locate(pointer, &fragment))
            .ok_or_else(|| CompileError::UnresolvableReference {
                reference: reference.to_string(),
                base: base.to_string(),
            })
    }

    /// Find the resource, fetching its document if needed. Fetched nodes
    /// without `$schema` are indexed as `version`.
    pub(crate) fn lookup_resource(
        &self,
        resource: &Url,
        version: SpecVersion,
    ) -> Result<Option<(Arc<Document>, JsonPointer)>, CompileError> {
        if let Some(found) = self.store.read().resources.get(resource) {
            return Ok(Some(found.clone()));
        }
        let Some(fetcher) = &self.fetcher else {
            return Ok(None);
        };
        tracing::debug!(uri = %resource, "fetching schema document");
        let value = fetcher.fetch(resource)?;
        self.insert(resource.clone(), value, version)?;
        Ok(self.store.read().resources.get(resource).cloned())
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.read();
        let mut uris: Vec<_> = store.documents.keys().map(Url::as_str).collect();
        uris.sort_unstable();
        f.debug_struct("SchemaRegistry")
            .field("documents", &uris)
            .field("fetcher", &self.fetcher.is_some())
            .finish()
    }
}

/// Join `reference` onto `base`, returning the resource URI and the
/// percent-decoded fragment.
pub(crate) fn split_reference(base: &Url, reference: &str) -> Result<(Url, String), CompileError> {
    let target = base.join(reference).map_err(|source| CompileError::InvalidUri {
        uri: reference.to_string(),
        source,
    })?;
    let fragment = percent_decode_str(target.fragment().unwrap_or_default())
        .decode_utf8()
        .map_err(|_| CompileError::UnresolvableReference {
            reference: reference.to_string(),
            base: base.to_string(),
        })?
        .into_owned();
    Ok((without_fragment(target), fragment))
}

pub(crate) fn without_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}
