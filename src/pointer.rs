//! JSON Pointer (RFC 6901) used for instance locations, evaluation paths
//! and reference fragments.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// A parsed JSON Pointer.
///
/// Segments are stored unescaped; escaping (`~0`, `~1`) happens on display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsonPointer(Vec<String>);

impl JsonPointer {
    /// The empty pointer, referring to the whole document.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a pointer string such as `/properties/a~1b`.
    ///
    /// Returns `None` when the string is neither empty nor starts with `/`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return Some(Self::root());
        }
        let rest = s.strip_prefix('/')?;
        Some(Self(rest.split('/').map(unescape).collect()))
    }

    /// Build a pointer from already-unescaped segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.0.push(segment.into());
    }

    /// Returns a new pointer with one more segment.
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.push(segment);
        next
    }

    /// Returns a new pointer with all of `other`'s segments appended.
    pub fn concat(&self, other: &JsonPointer) -> Self {
        let mut next = self.clone();
        next.0.extend(other.0.iter().cloned());
        next
    }

    pub fn starts_with(&self, prefix: &JsonPointer) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// The remainder of this pointer after `prefix`, if it is a prefix.
    pub fn strip_prefix(&self, prefix: &JsonPointer) -> Option<JsonPointer> {
        self.0
            .strip_prefix(prefix.0.as_slice())
            .map(|rest| JsonPointer(rest.to_vec()))
    }

    /// Walk `value` segment by segment.
    ///
    /// Object segments are key lookups, array segments must be canonical
    /// indices (`0`, `12`, never `01` or `-`). Indexing into a scalar fails.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in &self.0 {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(parse_index(segment)?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "/{}", escape(segment))?;
        }
        Ok(())
    }
}

impl Serialize for JsonPointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
