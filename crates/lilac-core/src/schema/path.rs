//! Paths: tuples of segments, where a segment is a record key or the
//! repeated-wildcard marker `*` (spec §4.1).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Wildcard,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{k}"),
            PathSegment::Wildcard => write!(f, "*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct PathTuple {
    pub segments: Vec<PathSegment>,
}

impl PathTuple {
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub fn with_pushed(&self, segment: PathSegment) -> Self {
        let mut out = self.clone();
        out.push(segment);
        out
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, PathSegment::Wildcard))
    }

    /// Parse a dotted path like `"doc.spans.*.text"` into segments. `*` is
    /// the wildcard marker; every other dot-separated piece is a key.
    pub fn parse(s: &str) -> Self {
        let segments = s
            .split('.')
            .filter(|p| !p.is_empty())
            .map(|p| {
                if p == "*" {
                    PathSegment::Wildcard
                } else {
                    PathSegment::Key(p.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// The leading key, e.g. for routing a signal's enriched path to a
    /// shard's root column.
    pub fn first_key(&self) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            PathSegment::Key(k) => Some(k.as_str()),
            PathSegment::Wildcard => None,
        })
    }
}

impl fmt::Display for PathTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl From<&str> for PathTuple {
    fn from(s: &str) -> Self {
        PathTuple::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dotted_path_with_wildcard() {
        let path = PathTuple::parse("a.b.*.c");
        assert_eq!(
            path.segments,
            vec![
                PathSegment::Key("a".into()),
                PathSegment::Key("b".into()),
                PathSegment::Wildcard,
                PathSegment::Key("c".into()),
            ]
        );
        assert!(path.has_wildcard());
        assert_eq!(path.to_string(), "a.b.*.c");
    }
}
