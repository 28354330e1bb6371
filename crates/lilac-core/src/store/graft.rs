//! Grafting a signal's output fragment onto a row at its enriched path
//! (spec invariant 2, the `Value` analogue of `Field::attach_signal`).

use std::collections::BTreeMap;

use crate::error::Result;
use crate::schema::{PathSegment, PathTuple, Value};

/// Attach `fragment` under `key` at `path` within `row`, creating
/// intermediate records as needed and descending through any wildcard
/// segments by mapping over list elements.
pub fn graft(row: &Value, path: &[PathSegment], key: &str, fragment: &Value) -> Result<Value> {
    match path.split_first() {
        None => Ok(attach(row, key, fragment)),
        Some((PathSegment::Key(k), rest)) => {
            let mut map = match row {
                Value::Record(m) => m.clone(),
                Value::Null => BTreeMap::new(),
                other => {
                    let mut m = BTreeMap::new();
                    m.insert("value".to_string(), other.clone());
                    m
                }
            };
            let child = map.get(k).cloned().unwrap_or(Value::Null);
            let grafted_child = graft(&child, rest, key, fragment)?;
            map.insert(k.clone(), grafted_child);
            Ok(Value::Record(map))
        }
        Some((PathSegment::Wildcard, rest)) => {
            let items = match row {
                Value::List(items) => items.clone(),
                Value::Null => Vec::new(),
                other => vec![other.clone()],
            };
            let grafted: Result<Vec<Value>> =
                items.iter().map(|item| graft(item, rest, key, fragment)).collect();
            Ok(Value::List(grafted?))
        }
    }
}

/// Terminal-node attach: insert `key -> fragment` alongside the existing
/// value, lifting a primitive into `{value, key}` the way
/// `Field::attach_signal` lifts a leaf field.
fn attach(node: &Value, key: &str, fragment: &Value) -> Value {
    match node {
        Value::Record(map) => {
            let mut map = map.clone();
            map.insert(key.to_string(), fragment.clone());
            Value::Record(map)
        }
        Value::Null => {
            let mut map = BTreeMap::new();
            map.insert(key.to_string(), fragment.clone());
            Value::Record(map)
        }
        other => {
            let mut map = BTreeMap::new();
            map.insert("value".to_string(), other.clone());
            map.insert(key.to_string(), fragment.clone());
            Value::Record(map)
        }
    }
}

pub fn graft_at(row: &Value, path: &PathTuple, key: &str, fragment: &Value) -> Result<Value> {
    graft(row, &path.segments, key, fragment)
}
