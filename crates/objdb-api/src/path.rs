//! Dotted field paths as used by the indexer, the catalog and the query model.
//!
//! `items.0.name` addresses one element, `items.[*].name` addresses every
//! element of `items` (the array-compressed view).

use crate::{Result, StoreError};
use serde_json::Value;
use std::fmt;

pub const WILDCARD: &str = "[*]";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    Wildcard,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Wildcard => write!(f, "{}", WILDCARD),
        }
    }
}

/// A parsed, validated field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(StoreError::validation("field path must not be empty"));
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(StoreError::validation(format!(
                    "field path '{}' contains an empty segment",
                    raw
                )));
            }
            if part.contains('"') {
                return Err(StoreError::validation(format!(
                    "field path '{}' contains a double quote",
                    raw
                )));
            }
            let segment = if part == WILDCARD {
                PathSegment::Wildcard
            } else if part.bytes().all(|b| b.is_ascii_digit()) {
                match part.parse::<usize>() {
                    Ok(i) => PathSegment::Index(i),
                    Err(_) => PathSegment::Key(part.to_string()),
                }
            } else {
                PathSegment::Key(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.contains(&PathSegment::Wildcard)
    }

    /// Split at the first `[*]`: `(prefix, suffix)`.
    pub fn split_at_wildcard(&self) -> Option<(&[PathSegment], &[PathSegment])> {
        let pos = self
            .segments
            .iter()
            .position(|s| *s == PathSegment::Wildcard)?;
        Some((&self.segments[..pos], &self.segments[pos + 1..]))
    }

    /// Dotted form with `[*]` segments removed.
    pub fn without_wildcards(&self) -> String {
        self.segments
            .iter()
            .filter(|s| **s != PathSegment::Wildcard)
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Resolve a path without wildcards against a JSON value.
    ///
    /// Index segments on an object fall back to a key lookup so digit-only
    /// keys stay reachable.
    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        get_path(value, &self.segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

pub fn get_path<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Key(k), Value::Object(map)) => map.get(k)?,
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i)?,
            (PathSegment::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        let path = FieldPath::parse("items.[*].tags.0").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("items".into()),
                PathSegment::Wildcard,
                PathSegment::Key("tags".into()),
                PathSegment::Index(0),
            ]
        );
        assert_eq!(path.to_string(), "items.[*].tags.0");
        assert_eq!(path.without_wildcards(), "items.tags.0");
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        assert!(FieldPath::parse("").unwrap_err().is_validation());
        assert!(FieldPath::parse("a..b").unwrap_err().is_validation());
        assert!(FieldPath::parse("a.").unwrap_err().is_validation());
        assert!(FieldPath::parse("a.\"b\"").unwrap_err().is_validation());
    }

    #[test]
    fn test_split_at_wildcard() {
        let path = FieldPath::parse("a.[*].b.c").unwrap();
        let (prefix, suffix) = path.split_at_wildcard().unwrap();
        assert_eq!(prefix, &[PathSegment::Key("a".into())]);
        assert_eq!(suffix.len(), 2);

        assert!(FieldPath::parse("a.b").unwrap().split_at_wildcard().is_none());
    }

    #[test]
    fn test_get_path() {
        let doc = json!({"a": {"b": [10, {"c": "x"}]}, "m": {"0": "zero"}});
        let get = |p: &str| FieldPath::parse(p).unwrap().get(&doc).cloned();

        assert_eq!(get("a.b.0"), Some(json!(10)));
        assert_eq!(get("a.b.1.c"), Some(json!("x")));
        assert_eq!(get("m.0"), Some(json!("zero")));
        assert_eq!(get("a.missing"), None);
    }
}
