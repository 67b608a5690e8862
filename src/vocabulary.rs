//! Vocabularies and the registry the compiler consults for keyword lookup.

use std::fmt;

use indexmap::IndexMap;

use crate::keyword::KeywordFactory;
use crate::keywords;
use crate::types::SpecVersion;

/// Everything the compiler needs to recognize one keyword.
#[derive(Clone)]
pub struct KeywordDescriptor {
    name: String,
    versions: Vec<SpecVersion>,
    priority: i64,
    factory: KeywordFactory,
}

impl KeywordDescriptor {
    pub fn new(name: impl Into<String>, versions: &[SpecVersion], factory: KeywordFactory) -> Self {
        Self {
            name: name.into(),
            versions: versions.to_vec(),
            priority: 0,
            factory,
        }
    }

    /// Tie-break order among keywords with no dependency between them.
    /// Lower runs first.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn versions(&self) -> &[SpecVersion] {
        &self.versions
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn factory(&self) -> KeywordFactory {
        self.factory
    }

    pub fn applies_to(&self, version: SpecVersion) -> bool {
        self.versions.contains(&version)
    }
}

impl fmt::Debug for KeywordDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordDescriptor")
            .field("name", &self.name)
            .field("versions", &self.versions)
            .field("priority", &self.priority)
            .finish()
    }
}

/// A named set of keywords, identified by URI.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    id: String,
    keywords: Vec<KeywordDescriptor>,
}

impl Vocabulary {
    pub fn new(id: impl Into<String>, keywords: Vec<KeywordDescriptor>) -> Self {
        Self {
            id: id.into(),
            keywords,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn keywords(&self) -> &[KeywordDescriptor] {
        &self.keywords
    }
}

/// Vocabulary URI to vocabulary, in registration order.
///
/// Mutable during setup, then shared read-only through
/// [`EvaluationOptions`](crate::EvaluationOptions).
#[derive(Debug, Default, Clone)]
pub struct VocabularyRegistry {
    vocabularies: IndexMap<String, Vocabulary>,
}

impl VocabularyRegistry {
    /// An empty registry; every keyword compiles as an unknown passthrough.
    pub fn new() -> Self {
        Self::default()
    }

    /// The 2019-09, 2020-12 and next vocabularies plus the draft 6/7 keywords.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for vocabulary in keywords::standard_vocabularies() {
            registry.register(vocabulary);
        }
        registry
    }

    /// Add a vocabulary, replacing any previous one with the same URI.
    pub fn register(&mut self, vocabulary: Vocabulary) {
        tracing::debug!(vocabulary = vocabulary.id(), keywords = vocabulary.keywords().len(), "registering vocabulary");
        self.vocabularies
            .insert(vocabulary.id().to_string(), vocabulary);
    }

    pub fn is_known(&self, uri: &str) -> bool {
        self.vocabularies.contains_key(uri)
    }

    pub fn keywords_for(&self, uri: &str) -> Option<&[KeywordDescriptor]> {
        self.vocabularies.get(uri).map(Vocabulary::keywords)
    }

    pub fn len(&self) -> usize {
        self.vocabularies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabularies.is_empty()
    }

    /// Find the descriptor for `name` under `version`.
    ///
    /// With `active` set, only those vocabularies are searched. Later
    /// registrations shadow earlier ones.
    pub fn descriptor(
        &self,
        name: &str,
        version: SpecVersion,
        active: Option<&[String]>,
    ) -> Option<&KeywordDescriptor> {
        self.vocabularies
            .values()
            .rev()
            .filter(|vocabulary| {
                active
                    .map(|ids| ids.iter().any(|id| id == vocabulary.id()))
                    .unwrap_or(true)
            })
            .flat_map(|vocabulary| vocabulary.keywords())
            .find(|descriptor| descriptor.name() == name && descriptor.applies_to(version))
    }
}
