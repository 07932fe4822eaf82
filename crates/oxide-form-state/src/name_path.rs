//! Structured field names and their canonical flat keys.
//!
//! A [`NamePath`] addresses one field inside a nested value tree, e.g.
//! `["items", 2, "label"]`. Storage always uses the flat key produced by
//! [`NamePath::to_flat_key`], which joins the segments with `.`.
//!
//! Segments that themselves contain `.` or `\` are escaped with `\`, so the
//! single key `"a.b"` and the nested path `a` → `b` never share a flat key.
//! Plain strings converted with `From<&str>` are read as flat keys, which
//! means `"user.age"` and `["user", "age"]` name the same field.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

const SEPARATOR: char = '.';
const ESCAPE: char = '\\';

/// One segment of a [`NamePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// An array index.
    Index(usize),
    /// An object key.
    Key(String),
}

impl PathSegment {
    fn write_escaped(&self, out: &mut String) {
        match self {
            Self::Index(index) => out.push_str(&index.to_string()),
            Self::Key(key) => {
                for ch in key.chars() {
                    if ch == SEPARATOR || ch == ESCAPE {
                        out.push(ESCAPE);
                    }
                    out.push(ch);
                }
            }
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Key(key) => f.write_str(key),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A structured field identifier.
///
/// Equality and hashing go through the flat key, so `["items", 0]` equals
/// `["items", "0"]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "NamePathRepr", into = "Vec<PathSegment>")]
pub struct NamePath(Vec<PathSegment>);

impl NamePath {
    /// Creates an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an object key segment.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathSegment::Key(key.into()));
        self
    }

    /// Appends an array index segment.
    #[must_use]
    pub fn index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    /// Parses a flat key back into a path.
    ///
    /// Every segment comes back as [`PathSegment::Key`]; numeric-looking
    /// segments are not turned back into indices.
    pub fn from_flat_key(flat: &str) -> Self {
        Self(split_flat_key(flat).into_iter().map(PathSegment::Key).collect())
    }

    /// Returns the canonical flat key.
    pub fn to_flat_key(&self) -> String {
        let mut out = String::new();
        for (position, segment) in self.0.iter().enumerate() {
            if position > 0 {
                out.push(SEPARATOR);
            }
            segment.write_escaped(&mut out);
        }
        out
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Returns whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl PartialEq for NamePath {
    fn eq(&self, other: &Self) -> bool {
        self.to_flat_key() == other.to_flat_key()
    }
}

impl Eq for NamePath {}

impl Hash for NamePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_flat_key().hash(state);
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_flat_key())
    }
}

impl From<&str> for NamePath {
    fn from(flat: &str) -> Self {
        Self::from_flat_key(flat)
    }
}

impl From<String> for NamePath {
    fn from(flat: String) -> Self {
        Self::from_flat_key(&flat)
    }
}

impl From<&String> for NamePath {
    fn from(flat: &String) -> Self {
        Self::from_flat_key(flat)
    }
}

impl From<usize> for NamePath {
    fn from(index: usize) -> Self {
        Self(vec![PathSegment::Index(index)])
    }
}

impl From<&Self> for NamePath {
    fn from(path: &Self) -> Self {
        path.clone()
    }
}

impl<S: Into<PathSegment>> From<Vec<S>> for NamePath {
    fn from(segments: Vec<S>) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<PathSegment>, const N: usize> From<[S; N]> for NamePath {
    fn from(segments: [S; N]) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }
}

impl From<NamePath> for Vec<PathSegment> {
    fn from(path: NamePath) -> Self {
        path.0
    }
}

/// Accepted serialized forms: a flat key string or a list of segments.
#[derive(Deserialize)]
#[serde(untagged)]
enum NamePathRepr {
    Index(usize),
    Flat(String),
    Segments(Vec<PathSegment>),
}

impl From<NamePathRepr> for NamePath {
    fn from(repr: NamePathRepr) -> Self {
        match repr {
            NamePathRepr::Index(index) => Self::from(index),
            NamePathRepr::Flat(flat) => Self::from_flat_key(&flat),
            NamePathRepr::Segments(segments) => Self(segments),
        }
    }
}

/// Splits a flat key on unescaped separators, removing escapes.
///
/// The empty key yields no segments.
pub fn split_flat_key(flat: &str) -> Vec<String> {
    if flat.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = flat.chars();
    while let Some(ch) = chars.next() {
        match ch {
            ESCAPE => current.push(chars.next().unwrap_or(ESCAPE)),
            SEPARATOR => segments.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    segments.push(current);
    segments
}

/// Appends one segment to an already-flat key.
pub fn join_key(prefix: &str, segment: &PathSegment) -> String {
    let mut out = String::from(prefix);
    if !prefix.is_empty() {
        out.push(SEPARATOR);
    }
    segment.write_escaped(&mut out);
    out
}

/// Returns whether `key` lies strictly below `prefix`.
pub fn is_descendant(key: &str, prefix: &str) -> bool {
    key.len() > prefix.len() + 1
        && key.starts_with(prefix)
        && key[prefix.len()..].starts_with(SEPARATOR)
}

/// Builds a DOM-style field identifier, e.g. `login_user_name`.
///
/// Returns an empty string for an empty path.
pub fn field_id(form_name: Option<&str>, path: &NamePath) -> String {
    if path.is_empty() {
        return String::new();
    }
    form_name
        .into_iter()
        .map(str::to_string)
        .chain(path.segments().iter().map(ToString::to_string))
        .collect::<Vec<_>>()
        .join("_")
}
