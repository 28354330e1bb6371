//! Path Selector (spec §4.3): projects a path with wildcards into a
//! per-row shaped container, in one of three modes.

use crate::error::{LilacError, Result};
use crate::schema::{DType, Field, PathSegment, PathTuple, Schema, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Preserve nesting; consumers see per-row nested containers.
    Structured,
    /// Flatten all `*` levels into a single per-row list.
    Flatten,
    /// Emit one output row per leaf occurrence (used for stats/groups).
    Unnest,
}

/// One leaf occurrence produced by [`SelectMode::Unnest`]: the resolved
/// value plus the row it came from.
#[derive(Debug, Clone)]
pub struct UnnestItem {
    pub row_id: String,
    pub value: Value,
}

/// Select `path` over `row`, resolving spans against `row` along the way.
/// Returns `Value::Null` if any segment of the path is absent on this row
/// (sparse input — spec §4.5 rule 1 relies on this).
pub fn select_structured(row: &Value, schema: &Schema, path: &PathTuple) -> Result<Value> {
    select_inner(row, schema, &path.segments, path)
}

fn select_inner(
    node: &Value,
    schema: &Schema,
    remaining: &[PathSegment],
    full_path: &PathTuple,
) -> Result<Value> {
    let _ = schema;
    match remaining.split_first() {
        None => Ok(node.clone()),
        Some((PathSegment::Key(key), rest)) => match node {
            Value::Record(map) => match map.get(key) {
                Some(child) => select_inner(child, schema, rest, full_path),
                None => Ok(Value::Null),
            },
            Value::Null => Ok(Value::Null),
            _ => Ok(Value::Null),
        },
        Some((PathSegment::Wildcard, rest)) => match node {
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(select_inner(item, schema, rest, full_path)?);
                }
                Ok(Value::List(out))
            }
            Value::Null => Ok(Value::List(Vec::new())),
            _ => Ok(Value::List(Vec::new())),
        },
    }
}

/// Resolve a span value against the dataset row it belongs to: substring
/// the source leaf named by the span field's `source_path`.
pub fn resolve_span(
    row_root: &Value,
    schema: &Schema,
    span_field_path: &PathTuple,
    span_value: &Value,
) -> Result<Value> {
    let field = schema.get_field(span_field_path)?;
    let source_path = match field {
        Field::Leaf {
            dtype: DType::StringSpan,
            source_path: Some(p),
            ..
        } => p,
        _ => return Ok(span_value.clone()),
    };
    let (start, end) = match span_value.as_span() {
        Some(se) => se,
        None => return Ok(span_value.clone()),
    };
    let source_value = select_structured(row_root, schema, source_path)?;
    let source_text = source_value
        .as_str()
        .ok_or_else(|| LilacError::NotALeaf {
            path: source_path.to_string(),
        })?;
    let resolved = source_text
        .get(start..end)
        .ok_or_else(|| LilacError::InvalidFilter {
            path: span_field_path.to_string(),
            message: format!("span {start}..{end} out of bounds for source of length {}", source_text.len()),
        })?;
    Ok(Value::Str(resolved.to_string()))
}

/// Select `path` over `row`, resolving any span leaves found along the way
/// against `row`'s source text (spec §4.3: "the selector resolves each
/// span by substringing the referenced source leaf before emitting it").
pub fn select_and_resolve(row: &Value, schema: &Schema, path: &PathTuple) -> Result<Value> {
    let raw = select_structured(row, schema, path)?;
    resolve_spans_in(row, schema, path, &raw)
}

fn resolve_spans_in(row_root: &Value, schema: &Schema, path: &PathTuple, value: &Value) -> Result<Value> {
    if path.has_wildcard() {
        // Can't resolve through nested lists generically here without
        // per-element paths; handled by `unnest`/`flatten` below instead.
        return Ok(value.clone());
    }
    if let Ok(Field::Leaf {
        dtype: DType::StringSpan,
        ..
    }) = schema.get_field(path)
    {
        return resolve_span(row_root, schema, path, value);
    }
    Ok(value.clone())
}

/// Flatten all `*` levels into a single per-row list (spec §4.3 mode 2).
pub fn select_flatten(row: &Value, schema: &Schema, path: &PathTuple) -> Result<Vec<Value>> {
    let structured = select_structured(row, schema, path)?;
    let mut out = Vec::new();
    flatten_into(&structured, path.has_wildcard(), &mut out);
    // Spans inside a flattened path are resolved individually since the
    // structured walk above returns raw span cells for wildcard paths.
    if matches!(schema.get_field(path), Ok(Field::Leaf { dtype: DType::StringSpan, .. })) {
        for v in out.iter_mut() {
            *v = resolve_span(row, schema, path, v)?;
        }
    }
    Ok(out)
}

fn flatten_into(value: &Value, was_repeated: bool, out: &mut Vec<Value>) {
    match value {
        Value::List(items) if was_repeated => {
            for item in items {
                flatten_into(item, was_repeated, out);
            }
        }
        other => out.push(other.clone()),
    }
}

/// Emit one output row per leaf occurrence (spec §4.3 mode 3, used for
/// stats/groups).
pub fn unnest(rows: &[crate::store::Row], schema: &Schema, path: &PathTuple) -> Result<Vec<UnnestItem>> {
    let mut out = Vec::new();
    for row in rows {
        for value in select_flatten(&row.value, schema, path)? {
            if !value.is_null() {
                out.push(UnnestItem {
                    row_id: row.row_id.clone(),
                    value,
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, PathTuple};
    use std::collections::BTreeMap;

    fn sample_schema() -> Schema {
        let mut doc_fields = BTreeMap::new();
        doc_fields.insert("text".to_string(), Field::leaf(DType::String));
        doc_fields.insert(
            "keyword_span".to_string(),
            Field::span(PathTuple::parse("doc.text")),
        );
        let mut root = BTreeMap::new();
        root.insert("doc".to_string(), Field::record(doc_fields));
        Schema::new(root)
    }

    fn sample_row() -> Value {
        let mut doc = BTreeMap::new();
        doc.insert("text".to_string(), Value::Str("the quick brown fox".to_string()));
        doc.insert("keyword_span".to_string(), Value::Span { start: 4, end: 9 });
        let mut root = BTreeMap::new();
        root.insert("doc".to_string(), Value::Record(doc));
        Value::Record(root)
    }

    #[test]
    fn select_structured_returns_null_for_missing_path() {
        let schema = sample_schema();
        let row = sample_row();
        let result = select_structured(&row, &schema, &PathTuple::parse("doc.missing")).unwrap();
        assert!(result.is_null());
    }

    #[test]
    fn select_and_resolve_substrings_span() {
        let schema = sample_schema();
        let row = sample_row();
        let resolved =
            select_and_resolve(&row, &schema, &PathTuple::parse("doc.keyword_span")).unwrap();
        assert_eq!(resolved.as_str(), Some("quick"));
    }

    #[test]
    fn select_flatten_over_wildcard() {
        let mut root = BTreeMap::new();
        root.insert(
            "items".to_string(),
            Field::repeated(Field::leaf(DType::Int32)),
        );
        let schema = Schema::new(root);

        let mut row_root = BTreeMap::new();
        row_root.insert(
            "items".to_string(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        );
        let row = Value::Record(row_root);

        let flattened = select_flatten(&row, &schema, &PathTuple::parse("items.*")).unwrap();
        assert_eq!(flattened, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }
}
