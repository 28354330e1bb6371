//! Schema & value model (spec §3, §4.1).
//!
//! A [`Schema`] is a tree of [`Field`]s. Paths are tuples of segments; `*`
//! descends into the single child of a [`Field::Repeated`] node.

mod path;
mod value;

pub use path::{PathSegment, PathTuple};
pub use value::{EmbeddingEntry, Value};

use crate::error::{LilacError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primitive dtypes, plus the two Lilac-specific leaf dtypes (`string_span`,
/// `embedding`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Binary,
    Timestamp,
    /// `{start, end}` indices into a string leaf named by the field's
    /// `source_path`.
    StringSpan,
    /// A sequence of `{span, vector}` entries; vectors live in the vector
    /// index, not inline (spec §4.4).
    Embedding,
}

impl DType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DType::Int8
                | DType::Int16
                | DType::Int32
                | DType::Int64
                | DType::UInt8
                | DType::UInt16
                | DType::UInt32
                | DType::UInt64
                | DType::Float32
                | DType::Float64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    pub fn is_ordinal(&self) -> bool {
        self.is_numeric() || matches!(self, DType::Timestamp)
    }
}

/// Metadata recording which signal produced a subtree and what its inputs
/// were. Attached to record-or-leaf nodes that a signal enriched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    pub name: String,
    pub params: serde_json::Value,
    pub input_path: PathTuple,
}

/// A labeled numeric interval, e.g. for histogram-style grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub label: String,
    /// `None` means open-ended (the first/last auto-bin).
    pub start: Option<f64>,
    pub end: Option<f64>,
}

/// A node in the schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Field {
    Leaf {
        dtype: DType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<SignalDescriptor>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bins: Option<Vec<Bin>>,
        /// For `dtype == StringSpan`: the path to the string leaf the span
        /// indexes into (spec §3 "Spans").
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_path: Option<PathTuple>,
    },
    Record {
        fields: BTreeMap<String, Field>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<SignalDescriptor>,
    },
    Repeated {
        child: Box<Field>,
    },
}

impl Field {
    pub fn leaf(dtype: DType) -> Self {
        Field::Leaf {
            dtype,
            signal: None,
            bins: None,
            source_path: None,
        }
    }

    pub fn span(source_path: PathTuple) -> Self {
        Field::Leaf {
            dtype: DType::StringSpan,
            signal: None,
            bins: None,
            source_path: Some(source_path),
        }
    }

    pub fn record(fields: BTreeMap<String, Field>) -> Self {
        Field::Record {
            fields,
            signal: None,
        }
    }

    pub fn repeated(child: Field) -> Self {
        Field::Repeated {
            child: Box::new(child),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Field::Leaf { .. })
    }

    pub fn dtype(&self) -> Option<DType> {
        match self {
            Field::Leaf { dtype, .. } => Some(*dtype),
            _ => None,
        }
    }

    /// Merge two fields at the same path (spec invariant 4: dtypes must
    /// match at shared leaves; record children union; repeated children
    /// recurse).
    pub fn merge(&self, other: &Field, path: &PathTuple) -> Result<Field> {
        match (self, other) {
            (
                Field::Leaf {
                    dtype: d1,
                    signal: s1,
                    bins: b1,
                    source_path: sp1,
                },
                Field::Leaf {
                    dtype: d2,
                    signal: s2,
                    bins: b2,
                    ..
                },
            ) => {
                if d1 != d2 {
                    return Err(LilacError::DtypeConflict {
                        path: path.to_string(),
                        left: *d1,
                        right: *d2,
                    });
                }
                Ok(Field::Leaf {
                    dtype: *d1,
                    signal: s1.clone().or_else(|| s2.clone()),
                    bins: b1.clone().or_else(|| b2.clone()),
                    source_path: sp1.clone(),
                })
            }
            (Field::Record { fields: f1, signal: s1 }, Field::Record { fields: f2, signal: s2 }) => {
                let mut merged = f1.clone();
                for (key, field) in f2 {
                    let mut child_path = path.clone();
                    child_path.push(PathSegment::Key(key.clone()));
                    match merged.get(key) {
                        Some(existing) => {
                            merged.insert(key.clone(), existing.merge(field, &child_path)?);
                        }
                        None => {
                            merged.insert(key.clone(), field.clone());
                        }
                    }
                }
                Ok(Field::Record {
                    fields: merged,
                    signal: s1.clone().or_else(|| s2.clone()),
                })
            }
            (Field::Repeated { child: c1 }, Field::Repeated { child: c2 }) => {
                let mut child_path = path.clone();
                child_path.push(PathSegment::Wildcard);
                Ok(Field::Repeated {
                    child: Box::new(c1.merge(c2, &child_path)?),
                })
            }
            _ => Err(LilacError::DtypeConflict {
                path: path.to_string(),
                left: self.dtype().unwrap_or(DType::String),
                right: other.dtype().unwrap_or(DType::String),
            }),
        }
    }

    /// Attach a signal's output fragment as a new child of this record, or
    /// (if `self` is a leaf) lift `self` into a record carrying `value` plus
    /// the signal's fields (spec invariant 2).
    pub fn attach_signal(&self, key: &str, fragment: Field, descriptor: SignalDescriptor) -> Field {
        match self {
            Field::Record { fields, signal } => {
                let mut fields = fields.clone();
                fields.insert(key.to_string(), fragment);
                Field::Record {
                    fields,
                    signal: signal.clone(),
                }
            }
            Field::Leaf { dtype, bins, source_path, .. } => {
                let mut fields = BTreeMap::new();
                fields.insert(
                    "value".to_string(),
                    Field::Leaf {
                        dtype: *dtype,
                        signal: None,
                        bins: bins.clone(),
                        source_path: source_path.clone(),
                    },
                );
                fields.insert(key.to_string(), fragment);
                Field::Record {
                    fields,
                    signal: Some(descriptor),
                }
            }
            Field::Repeated { child } => Field::Repeated {
                child: Box::new(child.attach_signal(key, fragment, descriptor)),
            },
        }
    }
}

/// The root of a dataset's schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub root: BTreeMap<String, Field>,
}

impl Schema {
    pub fn new(root: BTreeMap<String, Field>) -> Self {
        Self { root }
    }

    pub fn empty() -> Self {
        Self { root: BTreeMap::new() }
    }

    /// Resolve a path to a field by walking the tree; `*` descends into the
    /// single child of a repeated node.
    pub fn get_field(&self, path: &PathTuple) -> Result<&Field> {
        let mut segments = path.segments.iter();
        let first = segments
            .next()
            .ok_or_else(|| LilacError::path_not_found(path))?;
        let key = match first {
            PathSegment::Key(k) => k,
            PathSegment::Wildcard => return Err(LilacError::path_not_found(path)),
        };
        let mut current = self
            .root
            .get(key)
            .ok_or_else(|| LilacError::path_not_found(path))?;
        for segment in segments {
            current = step_field(current, segment, path)?;
        }
        Ok(current)
    }

    pub fn has_path(&self, path: &PathTuple) -> bool {
        self.get_field(path).is_ok()
    }

    /// All paths to dtype-bearing (leaf) nodes.
    pub fn list_leaves(&self) -> Vec<PathTuple> {
        let mut out = Vec::new();
        for (key, field) in &self.root {
            let path = PathTuple::from_segments(vec![PathSegment::Key(key.clone())]);
            collect_leaves(field, path, &mut out);
        }
        out
    }

    /// Commutative, associative merge of two schemas (spec invariant 4).
    pub fn merge(&self, other: &Schema) -> Result<Schema> {
        let mut root = self.root.clone();
        for (key, field) in &other.root {
            let path = PathTuple::from_segments(vec![PathSegment::Key(key.clone())]);
            match root.get(key) {
                Some(existing) => {
                    root.insert(key.clone(), existing.merge(field, &path)?);
                }
                None => {
                    root.insert(key.clone(), field.clone());
                }
            }
        }
        Ok(Schema { root })
    }

    /// Merge a set of schemas, source-first then discovery order (spec
    /// §4.2 "Discover").
    pub fn merge_all<'a>(schemas: impl IntoIterator<Item = &'a Schema>) -> Result<Schema> {
        let mut iter = schemas.into_iter();
        let mut acc = match iter.next() {
            Some(s) => s.clone(),
            None => return Ok(Schema::empty()),
        };
        for schema in iter {
            acc = acc.merge(schema)?;
        }
        Ok(acc)
    }

    /// Infer a schema from a sample of JSON-shaped records (spec §4.1
    /// "infer a schema from a sample of records", recovered from
    /// `dataset_utils.create_signal_schema`'s sampling behavior).
    pub fn infer(records: &[serde_json::Value], sample_size: usize) -> Schema {
        let mut root: BTreeMap<String, Field> = BTreeMap::new();
        for record in records.iter().take(sample_size) {
            if let serde_json::Value::Object(map) = record {
                for (key, value) in map {
                    let inferred = infer_field(value);
                    root.entry(key.clone())
                        .and_modify(|existing| {
                            let path = PathTuple::from_segments(vec![PathSegment::Key(key.clone())]);
                            if let Ok(merged) = existing.merge(&inferred, &path) {
                                *existing = merged;
                            }
                        })
                        .or_insert(inferred);
                }
            }
        }
        Schema { root }
    }
}

fn infer_field(value: &serde_json::Value) -> Field {
    match value {
        serde_json::Value::Null => Field::leaf(DType::String),
        serde_json::Value::Bool(_) => Field::leaf(DType::Boolean),
        serde_json::Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Field::leaf(DType::Int64)
            } else {
                Field::leaf(DType::Float64)
            }
        }
        serde_json::Value::String(_) => Field::leaf(DType::String),
        serde_json::Value::Array(items) => {
            let child = items
                .first()
                .map(infer_field)
                .unwrap_or_else(|| Field::leaf(DType::String));
            Field::repeated(child)
        }
        serde_json::Value::Object(map) => {
            let fields = map
                .iter()
                .map(|(k, v)| (k.clone(), infer_field(v)))
                .collect();
            Field::record(fields)
        }
    }
}

fn step_field<'a>(field: &'a Field, segment: &PathSegment, full_path: &PathTuple) -> Result<&'a Field> {
    match (field, segment) {
        (Field::Record { fields, .. }, PathSegment::Key(key)) => fields
            .get(key)
            .ok_or_else(|| LilacError::path_not_found(full_path)),
        (Field::Repeated { child }, PathSegment::Wildcard) => Ok(child.as_ref()),
        (Field::Repeated { child }, PathSegment::Key(_)) => {
            step_field(child.as_ref(), segment, full_path)
        }
        _ => Err(LilacError::path_not_found(full_path)),
    }
}

fn collect_leaves(field: &Field, path: PathTuple, out: &mut Vec<PathTuple>) {
    match field {
        Field::Leaf { .. } => out.push(path),
        Field::Record { fields, .. } => {
            for (key, child) in fields {
                let mut child_path = path.clone();
                child_path.push(PathSegment::Key(key.clone()));
                collect_leaves(child, child_path, out);
            }
        }
        Field::Repeated { child } => {
            let mut child_path = path;
            child_path.push(PathSegment::Wildcard);
            collect_leaves(child, child_path, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(segments: &str) -> PathTuple {
        PathTuple::parse(segments)
    }

    #[test]
    fn get_field_walks_nested_record() {
        let mut inner = BTreeMap::new();
        inner.insert("text".to_string(), Field::leaf(DType::String));
        let mut root = BTreeMap::new();
        root.insert("doc".to_string(), Field::record(inner));
        let schema = Schema::new(root);

        let field = schema.get_field(&p("doc.text")).unwrap();
        assert_eq!(field.dtype(), Some(DType::String));
    }

    #[test]
    fn get_field_through_repeated_wildcard() {
        let mut root = BTreeMap::new();
        root.insert(
            "items".to_string(),
            Field::repeated(Field::leaf(DType::Int32)),
        );
        let schema = Schema::new(root);
        let field = schema.get_field(&p("items.*")).unwrap();
        assert_eq!(field.dtype(), Some(DType::Int32));
    }

    #[test]
    fn merge_two_schemas_is_commutative_on_leaves() {
        let mut r1 = BTreeMap::new();
        r1.insert("a".to_string(), Field::leaf(DType::String));
        let s1 = Schema::new(r1);

        let mut r2 = BTreeMap::new();
        r2.insert("b".to_string(), Field::leaf(DType::Int32));
        let s2 = Schema::new(r2);

        let m1 = s1.merge(&s2).unwrap();
        let m2 = s2.merge(&s1).unwrap();
        assert_eq!(m1.root.get("a").unwrap().dtype(), Some(DType::String));
        assert_eq!(m1.root.get("b").unwrap().dtype(), Some(DType::Int32));
        assert_eq!(m1, m2);
    }

    #[test]
    fn merge_conflicting_dtype_errors() {
        let mut r1 = BTreeMap::new();
        r1.insert("a".to_string(), Field::leaf(DType::String));
        let s1 = Schema::new(r1);

        let mut r2 = BTreeMap::new();
        r2.insert("a".to_string(), Field::leaf(DType::Int32));
        let s2 = Schema::new(r2);

        let err = s1.merge(&s2).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DtypeConflict);
    }

    #[test]
    fn infer_schema_from_sample() {
        let records = vec![serde_json::json!({"text": "hello", "count": 3})];
        let schema = Schema::infer(&records, 100);
        assert_eq!(schema.root.get("text").unwrap().dtype(), Some(DType::String));
        assert_eq!(schema.root.get("count").unwrap().dtype(), Some(DType::Int64));
    }

    #[test]
    fn attach_signal_lifts_leaf_into_record() {
        let leaf = Field::leaf(DType::String);
        let fragment = Field::leaf(DType::Int32);
        let descriptor = SignalDescriptor {
            name: "len".to_string(),
            params: serde_json::json!({}),
            input_path: p("text"),
        };
        let lifted = leaf.attach_signal("len", fragment, descriptor);
        match lifted {
            Field::Record { fields, signal } => {
                assert!(signal.is_some());
                assert_eq!(fields.get("value").unwrap().dtype(), Some(DType::String));
                assert_eq!(fields.get("len").unwrap().dtype(), Some(DType::Int32));
            }
            _ => panic!("expected record"),
        }
    }
}
