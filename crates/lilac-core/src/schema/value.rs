//! Value cells (spec §3 "Value cells", "Spans", "Embeddings").
//!
//! A value at a leaf path is either the primitive value itself, or an
//! object `{value: prim, ...extras}`; readers treat both forms as
//! equivalent for the same position. We represent that duality directly:
//! [`Value::WithExtras`] wraps a primitive with sibling properties the way
//! a signal annotates a position (e.g. span offsets next to the text).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{LilacError, Result};
use crate::schema::PathTuple;

/// A single `{span, vector}` entry of an embedding column. The vector
/// itself is `None` once persisted to the vector index (spec §4.5 rule 4);
/// it is `Some` only transiently, between UDF computation and the
/// manifest writer's commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingEntry {
    pub span: Option<(usize, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Binary(Vec<u8>),
    Timestamp(i64),
    Span { start: usize, end: usize },
    Embedding(Vec<EmbeddingEntry>),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
    /// `{value: prim, ...extras}` — a primitive annotated with sibling
    /// properties at the same position.
    WithExtras {
        value: Box<Value>,
        extras: BTreeMap<String, Value>,
    },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Strip a `WithExtras` envelope down to the bare primitive, the way a
    /// reader that only cares about the value (not signal extras) would.
    pub fn bare(&self) -> &Value {
        match self {
            Value::WithExtras { value, .. } => value.bare(),
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.bare() {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.bare() {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            Value::Timestamp(t) => Some(*t as f64),
            _ => None,
        }
    }

    pub fn as_span(&self) -> Option<(usize, usize)> {
        match self.bare() {
            Value::Span { start, end } => Some((*start, *end)),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Record(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Cell-wise recursive merge of two logical values for the same row-id
    /// (spec invariant 5):
    /// record ∪ record, list zipped element-wise, primitive vs
    /// `{value, …}` lifted to `{value, …}`, primitive vs primitive equal
    /// or error.
    pub fn merge(&self, other: &Value, path: &PathTuple) -> Result<Value> {
        match (self, other) {
            (Value::Null, other) => Ok(other.clone()),
            (this, Value::Null) => Ok(this.clone()),
            (Value::Record(a), Value::Record(b)) => {
                let mut merged = a.clone();
                for (key, value) in b {
                    let child_path = path.with_pushed(crate::schema::PathSegment::Key(key.clone()));
                    match merged.get(key) {
                        Some(existing) => {
                            merged.insert(key.clone(), existing.merge(value, &child_path)?);
                        }
                        None => {
                            merged.insert(key.clone(), value.clone());
                        }
                    }
                }
                Ok(Value::Record(merged))
            }
            (Value::List(a), Value::List(b)) => {
                let len = a.len().max(b.len());
                let mut out = Vec::with_capacity(len);
                for i in 0..len {
                    let child_path = path.with_pushed(crate::schema::PathSegment::Wildcard);
                    match (a.get(i), b.get(i)) {
                        (Some(x), Some(y)) => out.push(x.merge(y, &child_path)?),
                        (Some(x), None) => out.push(x.clone()),
                        (None, Some(y)) => out.push(y.clone()),
                        (None, None) => unreachable!(),
                    }
                }
                Ok(Value::List(out))
            }
            (Value::WithExtras { value: v1, extras: e1 }, Value::WithExtras { value: v2, extras: e2 }) => {
                let merged_value = v1.merge(v2, path)?;
                let mut extras = e1.clone();
                extras.extend(e2.clone());
                Ok(Value::WithExtras {
                    value: Box::new(merged_value),
                    extras,
                })
            }
            (Value::WithExtras { value, extras }, prim) => {
                let merged_value = value.merge(prim, path)?;
                Ok(Value::WithExtras {
                    value: Box::new(merged_value),
                    extras: extras.clone(),
                })
            }
            (prim, Value::WithExtras { value, extras }) => {
                let merged_value = prim.merge(value, path)?;
                Ok(Value::WithExtras {
                    value: Box::new(merged_value),
                    extras: extras.clone(),
                })
            }
            (a, b) => {
                if a == b {
                    Ok(a.clone())
                } else {
                    Err(LilacError::DtypeConflict {
                        path: path.to_string(),
                        left: crate::schema::DType::String,
                        right: crate::schema::DType::String,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PathTuple;

    fn p() -> PathTuple {
        PathTuple::parse("text")
    }

    #[test]
    fn merge_records_unions_keys() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), Value::Int(1));
        let mut b = BTreeMap::new();
        b.insert("y".to_string(), Value::Int(2));
        let merged = Value::Record(a).merge(&Value::Record(b), &p()).unwrap();
        let record = merged.as_record().unwrap();
        assert_eq!(record.get("x"), Some(&Value::Int(1)));
        assert_eq!(record.get("y"), Some(&Value::Int(2)));
    }

    #[test]
    fn merge_primitive_with_extras_lifts() {
        let prim = Value::Str("hello".to_string());
        let mut extras = BTreeMap::new();
        extras.insert("len".to_string(), Value::Int(5));
        let annotated = Value::WithExtras {
            value: Box::new(Value::Str("hello".to_string())),
            extras,
        };
        let merged = prim.merge(&annotated, &p()).unwrap();
        match merged {
            Value::WithExtras { value, extras } => {
                assert_eq!(*value, Value::Str("hello".to_string()));
                assert_eq!(extras.get("len"), Some(&Value::Int(5)));
            }
            other => panic!("expected WithExtras, got {other:?}"),
        }
    }

    #[test]
    fn merge_conflicting_primitives_errors() {
        let err = Value::Str("a".to_string())
            .merge(&Value::Str("b".to_string()), &p())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DtypeConflict);
    }

    #[test]
    fn merge_lists_zips_elementwise() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::List(vec![Value::Null, Value::Int(20)]);
        let merged = a.merge(&b, &p()).unwrap();
        assert_eq!(
            merged.as_list().unwrap(),
            &[Value::Int(1), Value::Int(20)]
        );
    }
}
