//! Executor (spec §4.7): runs a [`Plan`] against an open [`DatasetView`],
//! in the order the spec fixes: pre-UDF filter/sort/paginate, vector top-K
//! shortcut, UDF evaluation, post-UDF filter/sort/paginate, and (if
//! requested) column-combining.

use std::collections::{BTreeMap, HashSet};

use lilac_core::error::{LilacError, Result};
use lilac_core::schema::{PathTuple, Value};
use lilac_core::selector;
use lilac_core::store::{DatasetView, Row};
use lilac_udf::{InputKind, SignalInput, UdfRunner};
use lilac_vector::VectorIndex;

use crate::planner::Plan;
use crate::types::{ColumnSelector, Filter, FilterOp, ResultRow, SelectRowsResult, SortDirection};

pub fn execute(view: &DatasetView, plan: &Plan, vector_index: &dyn VectorIndex) -> Result<SelectRowsResult> {
    let schema = &view.schema;

    // Step 2: pre-UDF filters (keyword search's substring condition plus
    // explicit pre-UDF filters).
    let mut candidates: Vec<&Row> = view
        .rows()
        .iter()
        .filter(|row| passes_pre_filters(row, schema, plan).unwrap_or(false))
        .collect();
    // Total rows passing filters/searches, taken before the vector top-K
    // shortcut narrows the candidate set to `limit+offset` (spec scenario
    // C: `total_matching_rows` counts all filter-passing rows, not just
    // the ones the shortcut actually ranked).
    let pre_filter_count = candidates.len();

    // Step 4 (performed ahead of step 2's pagination, per spec rule 4):
    // vector top-K shortcut becomes a hard row-id filter and supplies the
    // final ordering for its sort key.
    let mut vector_order: Option<Vec<String>> = None;
    if let Some(idx) = plan.vector_shortcut {
        let signal = plan.columns[idx].udf.as_ref().expect("vector shortcut column always has a udf");
        let prefix: HashSet<String> = candidates.iter().map(|r| r.row_id.clone()).collect();
        let k = plan.limit.unwrap_or(candidates.len()) + plan.offset;
        let scored = signal.vector_topk(k, vector_index, Some(&prefix))?;
        let ordered: Vec<String> = scored.into_iter().map(|s| s.key.0).collect();
        let keep: HashSet<&String> = ordered.iter().collect();
        candidates.retain(|r| keep.contains(&r.row_id));
        vector_order = Some(ordered);
    } else if let Some(sort) = &plan.sort {
        if sort.is_pre_udf {
            sort_rows_by_path(&mut candidates, schema, &sort.target, sort.direction)?;
        }
    }

    if let Some(order) = &vector_order {
        reorder_by_row_id(&mut candidates, order);
    }

    // Pagination can be pushed down to this point only when no post-UDF
    // filter could still drop a row the vector/pre-UDF ordering already
    // finalized (spec §4.6 rule 3).
    let can_truncate_early = plan.post_filters.is_empty()
        && (vector_order.is_some() || plan.sort.as_ref().map(|s| s.is_pre_udf).unwrap_or(true));
    if can_truncate_early {
        paginate(&mut candidates, plan.limit, plan.offset);
    }

    // Step 3: evaluate every UDF selector over the materialized batch.
    let mut udf_outputs: BTreeMap<String, Vec<Option<Value>>> = BTreeMap::new();
    for selector_col in &plan.columns {
        let Some(signal) = &selector_col.udf else { continue };
        let outputs = run_udf_column(selector_col, signal.as_ref(), &candidates, schema, vector_index)?;
        udf_outputs.insert(selector_col.alias.clone(), outputs);
    }

    // Step 5: post-UDF filters, then post-UDF sort, then final pagination
    // if it wasn't already pushed down.
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    if !plan.post_filters.is_empty() {
        order.retain(|&i| passes_post_filters(i, &udf_outputs, &plan.post_filters).unwrap_or(false));
    }

    if let Some(sort) = &plan.sort {
        if !sort.is_pre_udf {
            let values = udf_outputs.get(&sort.target).ok_or_else(|| LilacError::SortKeyUnknown {
                path: sort.target.clone(),
            })?;
            order.sort_by(|&a, &b| compare_values(values[a].as_ref(), values[b].as_ref(), sort.direction));
        }
    }

    let total_matching_rows = if plan.post_filters.is_empty() { pre_filter_count } else { order.len() };

    if !can_truncate_early {
        let start = plan.offset.min(order.len());
        let end = match plan.limit {
            Some(l) => (start + l).min(order.len()),
            None => order.len(),
        };
        order = order[start..end].to_vec();
    }

    let mut rows = Vec::with_capacity(order.len());
    for i in order {
        let row = candidates[i];
        let mut columns = BTreeMap::new();
        for selector_col in &plan.columns {
            let value = if selector_col.udf.is_some() {
                udf_outputs
                    .get(&selector_col.alias)
                    .and_then(|v| v[i].clone())
                    .unwrap_or(Value::Null)
            } else {
                selector::select_and_resolve(&row.value, schema, &selector_col.path)?
            };
            columns.insert(selector_col.alias.clone(), value);
        }
        rows.push(if plan.combine_columns {
            combine(row.row_id.clone(), columns, &plan.columns, schema)?
        } else {
            ResultRow {
                row_id: row.row_id.clone(),
                columns,
            }
        });
    }

    Ok(SelectRowsResult {
        rows,
        total_matching_rows,
    })
}

fn passes_pre_filters(row: &Row, schema: &lilac_core::schema::Schema, plan: &Plan) -> Result<bool> {
    for (path, query) in &plan.keyword_filters {
        let value = selector::select_and_resolve(&row.value, schema, path)?;
        let text = value.as_str().unwrap_or_default();
        if !text.to_lowercase().contains(&query.to_lowercase()) {
            return Ok(false);
        }
    }
    for filter in &plan.pre_filters {
        let path = PathTuple::parse(&filter.target);
        let value = selector::select_and_resolve(&row.value, schema, &path)?;
        if !eval_filter(&value, filter)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn passes_post_filters(
    index: usize,
    udf_outputs: &BTreeMap<String, Vec<Option<Value>>>,
    filters: &[Filter],
) -> Result<bool> {
    for filter in filters {
        let value = udf_outputs
            .get(&filter.target)
            .and_then(|v| v[index].clone())
            .unwrap_or(Value::Null);
        if !eval_filter(&value, filter)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_filter(actual: &Value, filter: &Filter) -> Result<bool> {
    let actual = actual.bare();
    match filter.op {
        FilterOp::Exists => Ok(!actual.is_null()),
        FilterOp::Eq => Ok(values_equal(actual, filter.value.as_ref().expect("eq filter carries a value"))),
        FilterOp::Ne => Ok(!values_equal(actual, filter.value.as_ref().expect("ne filter carries a value"))),
        FilterOp::In => {
            let values = filter.values.as_ref().expect("in filter carries a value list");
            Ok(values.iter().any(|v| values_equal(actual, v)))
        }
        FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => {
            let expected = filter.value.as_ref().expect("ordering filter carries a value");
            match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(b)) => Ok(match filter.op {
                    FilterOp::Lt => a < b,
                    FilterOp::Le => a <= b,
                    FilterOp::Gt => a > b,
                    FilterOp::Ge => a >= b,
                    _ => unreachable!(),
                }),
                _ => match (actual.as_str(), expected.as_str()) {
                    (Some(a), Some(b)) => Ok(match filter.op {
                        FilterOp::Lt => a < b,
                        FilterOp::Le => a <= b,
                        FilterOp::Gt => a > b,
                        FilterOp::Ge => a >= b,
                        _ => unreachable!(),
                    }),
                    _ => Err(LilacError::InvalidFilter {
                        path: filter.target.clone(),
                        message: "ordering comparison requires numeric or string operands".to_string(),
                    }),
                },
            }
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return x == y;
    }
    a == b
}

fn sort_rows_by_path(
    rows: &mut [&Row],
    schema: &lilac_core::schema::Schema,
    target: &str,
    direction: SortDirection,
) -> Result<()> {
    let path = PathTuple::parse(target);
    let mut keyed: Vec<(Value, &Row)> = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        keyed.push((selector::select_and_resolve(&row.value, schema, &path)?, *row));
    }
    keyed.sort_by(|(a, ra), (b, rb)| {
        compare_values(Some(a), Some(b), direction).then_with(|| ra.row_id.cmp(&rb.row_id))
    });
    for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
        *slot = row;
    }
    Ok(())
}

fn reorder_by_row_id(rows: &mut Vec<&Row>, order: &[String]) {
    let mut by_id: BTreeMap<&str, &Row> = rows.iter().map(|r| (r.row_id.as_str(), *r)).collect();
    let mut reordered = Vec::with_capacity(order.len());
    for id in order {
        if let Some(row) = by_id.remove(id.as_str()) {
            reordered.push(row);
        }
    }
    *rows = reordered;
}

fn paginate(rows: &mut Vec<&Row>, limit: Option<usize>, offset: usize) {
    let start = offset.min(rows.len());
    let end = match limit {
        Some(l) => (start + l).min(rows.len()),
        None => rows.len(),
    };
    *rows = rows[start..end].to_vec();
}

/// Ties are broken by row-id ascending wherever the caller doesn't already
/// do so (spec scenario C: "ties broken by row-id").
fn compare_values(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let ordering = match (a.and_then(|v| v.as_f64()), b.and_then(|v| v.as_f64())) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => match (a.and_then(|v| v.as_str()), b.and_then(|v| v.as_str())) {
            (Some(x), Some(y)) => x.cmp(y),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn run_udf_column(
    selector_col: &ColumnSelector,
    signal: &dyn lilac_udf::Signal,
    candidates: &[&Row],
    schema: &lilac_core::schema::Schema,
    vector_index: &dyn VectorIndex,
) -> Result<Vec<Option<Value>>> {
    match signal.input_kind() {
        InputKind::TextEmbedding => {
            let keys: Vec<(String, u32)> = candidates.iter().map(|r| (r.row_id.clone(), 0)).collect();
            let scores = signal.vector_compute(&keys, vector_index)?;
            Ok(scores.into_iter().map(|s| s.map(|v| Value::Float(v as f64))).collect())
        }
        InputKind::Text | InputKind::Any => {
            let inputs: Vec<SignalInput> = candidates
                .iter()
                .map(|row| {
                    let value = selector::select_and_resolve(&row.value, schema, &selector_col.path)?;
                    let parent_span_start = schema
                        .get_field(&selector_col.path)
                        .ok()
                        .and_then(|f| match f {
                            lilac_core::schema::Field::Leaf {
                                dtype: lilac_core::schema::DType::StringSpan,
                                ..
                            } => selector::select_structured(&row.value, schema, &selector_col.path)
                                .ok()
                                .and_then(|raw| raw.as_span())
                                .map(|(start, _)| start),
                            _ => None,
                        });
                    Ok(SignalInput {
                        row_id: row.row_id.clone(),
                        value,
                        parent_span_start,
                    })
                })
                .collect::<Result<_>>()?;
            UdfRunner::run(signal, &inputs, vector_index)
        }
    }
}

/// Rebuild each row as a single nested record by merging per-selector
/// fragments at their path (spec §3 merge rules, §4.7 step 6).
fn combine(
    row_id: String,
    columns: BTreeMap<String, Value>,
    selectors: &[ColumnSelector],
    schema: &lilac_core::schema::Schema,
) -> Result<ResultRow> {
    let mut merged = Value::Null;
    for selector_col in selectors {
        let Some(value) = columns.get(&selector_col.alias) else { continue };
        let fragment = build_fragment(&selector_col.path, value.clone());
        merged = merged.merge(&fragment, &PathTuple::default())?;
    }
    let _ = schema;
    let mut out = BTreeMap::new();
    out.insert("row".to_string(), merged);
    Ok(ResultRow { row_id, columns: out })
}

fn build_fragment(path: &PathTuple, value: Value) -> Value {
    let mut current = value;
    for segment in path.segments.iter().rev() {
        current = match segment {
            lilac_core::schema::PathSegment::Key(key) => {
                let mut map = BTreeMap::new();
                map.insert(key.clone(), current);
                Value::Record(map)
            }
            lilac_core::schema::PathSegment::Wildcard => Value::List(vec![current]),
        };
    }
    current
}
