//! Uniform entity and relationship records shared by every language.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key holding the dot-joined name within the file.
pub const META_QUALIFIED_NAME: &str = "qualified_name";
pub const META_LANGUAGE: &str = "language";
pub const META_IMPORT_PATH: &str = "import_path";
pub const META_IMPORTED_NAMES: &str = "imported_names";
pub const META_LINE: &str = "line";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Module,
    Class,
    Function,
    Method,
    Variable,
    Import,
}

impl EntityKind {
    pub const ALL: [Self; 6] = [
        Self::Module,
        Self::Class,
        Self::Function,
        Self::Method,
        Self::Variable,
        Self::Import,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Variable => "variable",
            Self::Import => "import",
        }
    }

    /// Kinds that may own other entities through `contains`.
    #[must_use]
    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::Module | Self::Class | Self::Function | Self::Method
        )
    }

    #[must_use]
    pub fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Contains,
    Calls,
    Imports,
    Inherits,
    References,
}

impl EdgeKind {
    pub const ALL: [Self; 5] = [
        Self::Contains,
        Self::Calls,
        Self::Imports,
        Self::Inherits,
        Self::References,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Inherits => "inherits",
            Self::References => "references",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

pub type Metadata = BTreeMap<String, MetaValue>;

/// A node of the code graph. Lines are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub name: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Entity {
    /// Name qualified by its enclosing classes and inline modules, falling
    /// back to the plain name.
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        self.metadata
            .get(META_QUALIFIED_NAME)
            .and_then(MetaValue::as_str)
            .unwrap_or(&self.name)
    }

    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.metadata.get(META_LANGUAGE).and_then(MetaValue::as_str)
    }

    /// Defined directly in its file, outside any class or inline module.
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.kind != EntityKind::Module && self.qualified_name() == self.name
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.end_line + 1 - self.start_line
    }

    /// `path:start-end` location string used in prompts and footers.
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.file_path, self.start_line, self.end_line)
    }
}

/// A typed directed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Relationship {
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_line(mut self, line: usize) -> Self {
        self.metadata.insert(
            META_LINE.to_owned(),
            MetaValue::Int(i64::try_from(line).unwrap_or(i64::MAX)),
        );
        self
    }

    /// Ordering key used to keep edge lists deterministic.
    #[must_use]
    pub fn sort_key(&self) -> (&str, &str, EdgeKind) {
        (&self.source, &self.target, self.kind)
    }
}

/// Stable entity id: first 16 hex chars of blake3 over path, qualified name and span.
#[must_use]
pub fn entity_id(file_path: &str, qualified_name: &str, start_line: usize, end_line: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b"\0");
    hasher.update(qualified_name.as_bytes());
    hasher.update(b"\0");
    hasher.update(format!("{start_line}:{end_line}").as_bytes());
    let hex = hasher.finalize().to_hex();
    hex[..16].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Entity {
        let mut metadata = Metadata::new();
        metadata.insert(META_QUALIFIED_NAME.into(), "Greeter.hello".into());
        Entity {
            id: entity_id("src/app.py", "Greeter.hello", 3, 5),
            kind: EntityKind::Method,
            name: "hello".into(),
            file_path: "src/app.py".into(),
            start_line: 3,
            end_line: 5,
            signature: Some("def hello(self):".into()),
            docstring: None,
            metadata,
        }
    }

    #[test]
    fn entity_id_is_stable_and_short() {
        let a = entity_id("a.py", "foo", 1, 5);
        let b = entity_id("a.py", "foo", 1, 5);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, entity_id("a.py", "foo", 1, 6));
        assert_ne!(a, entity_id("b.py", "foo", 1, 5));
    }

    #[test]
    fn entity_id_separates_fields() {
        assert_ne!(entity_id("ab", "c", 1, 1), entity_id("a", "bc", 1, 1));
    }

    #[test]
    fn qualified_name_falls_back_to_name() {
        let mut e = sample();
        assert_eq!(e.qualified_name(), "Greeter.hello");
        assert!(!e.is_top_level());
        e.metadata.clear();
        assert_eq!(e.qualified_name(), "hello");
        assert!(e.is_top_level());
    }

    #[test]
    fn entity_serializes_kind_as_type() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "method");
        assert_eq!(json["metadata"]["qualified_name"], "Greeter.hello");
        assert!(json.get("docstring").is_none());
    }

    #[test]
    fn relationship_line_metadata() {
        let edge = Relationship::new("a", "b", EdgeKind::Calls).with_line(7);
        assert_eq!(edge.metadata[META_LINE].as_int(), Some(7));
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], "calls");
    }

    #[test]
    fn location_and_line_count() {
        let e = sample();
        assert_eq!(e.location(), "src/app.py:3-5");
        assert_eq!(e.line_count(), 3);
    }

    #[test]
    fn meta_value_untagged_roundtrip() {
        let json = r#"{"a":true,"b":3,"c":1.5,"d":"x"}"#;
        let meta: Metadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta["a"], MetaValue::Bool(true));
        assert_eq!(meta["b"], MetaValue::Int(3));
        assert_eq!(meta["c"], MetaValue::Float(1.5));
        assert_eq!(meta["d"], MetaValue::Text("x".into()));
    }
}
