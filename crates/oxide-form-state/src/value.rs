//! Field values and nested value trees.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};

use crate::name_path::{join_key, PathSegment};

/// Flat key → value mapping, the shape of every value snapshot.
pub type FieldValues = BTreeMap<String, FieldValue>;

/// A value stored for a single field.
///
/// Objects are never stored directly: nested objects are flattened into
/// dotted flat keys before they reach the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// No value has been assigned.
    #[default]
    Undefined,
    /// An explicit empty value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A string.
    String(String),
    /// A point in time.
    Date(DateTime<Utc>),
    /// A list of values.
    Array(Vec<FieldValue>),
}

/// The kind a length or range check is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureKind {
    /// Character count of a string.
    String,
    /// Element count of an array.
    Array,
    /// Numeric magnitude.
    Number,
}

impl MeasureKind {
    /// Returns the message-table branch for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Array => "array",
            Self::Number => "number",
        }
    }
}

impl FieldValue {
    /// Returns whether the value counts as empty for `required` checks.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => true,
            Self::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric payload, if any.
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Coerces numbers and numeric strings to a number.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    trimmed.parse().ok()
                }
            }
            _ => None,
        }
    }

    /// Interprets the value as a point in time.
    ///
    /// Accepts dates, finite millisecond timestamps and RFC 3339,
    /// `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` strings.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(date) => Some(*date),
            Self::Number(n) if n.is_finite() => DateTime::from_timestamp_millis(*n as i64),
            Self::String(s) => parse_date(s.trim()),
            _ => None,
        }
    }

    /// Returns what length/range checks measure, or `None` when they do not
    /// apply to this kind of value.
    #[allow(clippy::cast_precision_loss)]
    pub fn measure(&self) -> Option<(MeasureKind, f64)> {
        match self {
            Self::String(s) => Some((MeasureKind::String, s.chars().count() as f64)),
            Self::Array(items) => Some((MeasureKind::Array, items.len() as f64)),
            Self::Number(n) => Some((MeasureKind::Number, *n)),
            _ => None,
        }
    }

    /// Renders the value as text, for pattern and format checks.
    pub fn to_text(&self) -> String {
        match self {
            Self::Undefined | Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Date(date) => date.to_rfc3339(),
            Self::Array(items) => items
                .iter()
                .map(Self::to_text)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Converts the value to JSON. Dates become RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Undefined | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Date(date) => serde_json::Value::String(date.to_rfc3339()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
        }
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Formats a number without a trailing `.0` for whole values.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for FieldValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(date: DateTime<Utc>) -> Self {
        Self::Date(date)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Scalars and arrays convert directly. Objects have no single-value form
/// and become [`FieldValue::Undefined`]; use [`NestedValue`] for trees.
impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(_) => Self::Undefined,
        }
    }
}

/// A nested value tree, as supplied for initial values and array items.
#[derive(Debug, Clone, PartialEq)]
pub enum NestedValue {
    /// A single field value.
    Leaf(FieldValue),
    /// A list that may contain objects.
    List(Vec<NestedValue>),
    /// An object of named children.
    Object(BTreeMap<String, NestedValue>),
}

impl NestedValue {
    /// Creates an empty object.
    pub const fn object() -> Self {
        Self::Object(BTreeMap::new())
    }

    /// Adds a child to an object; other variants are returned unchanged.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Self>) -> Self {
        if let Self::Object(children) = &mut self {
            children.insert(key.into(), value.into());
        }
        self
    }

    const fn is_structured(&self) -> bool {
        matches!(self, Self::List(_) | Self::Object(_))
    }
}

macro_rules! nested_leaf_from {
    ($($type:ty),+ $(,)?) => {
        $(
            impl From<$type> for NestedValue {
                fn from(value: $type) -> Self {
                    Self::Leaf(value.into())
                }
            }
        )+
    };
}

nested_leaf_from!(FieldValue, &str, String, bool, f64, i32, u32, i64, DateTime<Utc>);

impl From<serde_json::Value> for NestedValue {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}

impl NestedValue {
    /// Builds a tree from JSON; objects and arrays of objects stay nested.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, child)| (key, Self::from_json(child)))
                    .collect(),
            ),
            scalar => Self::Leaf(scalar.into()),
        }
    }
}

/// Flattens `root` into `out`, rooting every produced key at `prefix`.
///
/// Lists holding only leaves stay intact as one array value; lists holding
/// objects or lists are exploded element by element. The traversal keeps an
/// explicit worklist, so arbitrarily deep input cannot exhaust the stack.
pub fn flatten_into(prefix: &str, root: &NestedValue, out: &mut FieldValues) {
    let mut pending: Vec<(String, &NestedValue)> = vec![(prefix.to_string(), root)];

    while let Some((key, node)) = pending.pop() {
        match node {
            NestedValue::Leaf(value) => {
                out.insert(key, value.clone());
            }
            NestedValue::List(items) if !items.iter().any(NestedValue::is_structured) => {
                let values = items
                    .iter()
                    .filter_map(|item| match item {
                        NestedValue::Leaf(value) => Some(value.clone()),
                        _ => None,
                    })
                    .collect();
                out.insert(key, FieldValue::Array(values));
            }
            NestedValue::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    pending.push((join_key(&key, &PathSegment::Index(index)), item));
                }
            }
            NestedValue::Object(children) => {
                for (child_key, child) in children {
                    pending.push((join_key(&key, &PathSegment::Key(child_key.clone())), child));
                }
            }
        }
    }
}

/// Flattens a whole tree into a fresh mapping.
pub fn flatten(root: &NestedValue) -> FieldValues {
    let mut out = FieldValues::new();
    flatten_into("", root, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_is_empty() {
        assert!(FieldValue::Undefined.is_empty());
        assert!(FieldValue::Null.is_empty());
        assert!(FieldValue::from("").is_empty());
        assert!(!FieldValue::from(" ").is_empty());
        assert!(!FieldValue::from(0).is_empty());
        assert!(!FieldValue::from(false).is_empty());
        assert!(!FieldValue::Array(vec![]).is_empty());
    }

    #[test]
    fn test_flatten_nested_objects() {
        let tree = NestedValue::from_json(json!({
            "user": { "name": "A", "age": 17 },
            "tags": ["a", "b"],
        }));
        let flat = flatten(&tree);

        assert_eq!(flat.get("user.name"), Some(&FieldValue::from("A")));
        assert_eq!(flat.get("user.age"), Some(&FieldValue::from(17)));
        assert_eq!(
            flat.get("tags"),
            Some(&FieldValue::Array(vec!["a".into(), "b".into()]))
        );
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn test_flatten_explodes_arrays_of_objects() {
        let tree = NestedValue::from_json(json!({
            "items": [{ "x": 1 }, { "x": 2, "y": [1, 2] }],
        }));
        let flat = flatten(&tree);

        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["items.0.x", "items.1.x", "items.1.y"]);
        assert_eq!(
            flat.get("items.1.y"),
            Some(&FieldValue::Array(vec![1.into(), 2.into()]))
        );
    }

    #[test]
    fn test_flatten_escapes_dotted_keys() {
        let tree = NestedValue::from_json(json!({ "a.b": 1 }));
        let flat = flatten(&tree);
        assert!(flat.contains_key(r"a\.b"));
    }

    #[test]
    fn test_flatten_deep_tree() {
        let mut tree = NestedValue::from(1);
        for _ in 0..500 {
            tree = NestedValue::object().with("n", tree);
        }
        let flat = flatten(&tree);
        assert_eq!(flat.len(), 1);
        assert!(flat.keys().all(|key| key.starts_with("n.n.n")));
    }

    #[test]
    fn test_to_date() {
        assert!(FieldValue::from("2024-01-15").to_date().is_some());
        assert!(FieldValue::from("2024-01-15T10:00:00Z").to_date().is_some());
        assert!(FieldValue::from(0).to_date().is_some());
        assert!(FieldValue::from("not a date").to_date().is_none());
        assert!(FieldValue::Undefined.to_date().is_none());
    }

    #[test]
    fn test_to_text() {
        assert_eq!(FieldValue::from(18).to_text(), "18");
        assert_eq!(FieldValue::from(1.5).to_text(), "1.5");
        assert_eq!(FieldValue::Null.to_text(), "");
        assert_eq!(FieldValue::from(vec![1, 2]).to_text(), "1,2");
    }

    #[test]
    fn test_serialize_undefined_as_null() {
        let value = serde_json::to_value(FieldValue::Undefined).unwrap();
        assert_eq!(value, json!(null));
        let value = serde_json::to_value(FieldValue::from(vec!["a"])).unwrap();
        assert_eq!(value, json!(["a"]));
    }
}
