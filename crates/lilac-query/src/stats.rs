//! Stats & Groups (spec §4.8): per-leaf statistics and histogram-style
//! grouping over the joined view.

use std::collections::{BTreeMap, HashSet};

use lilac_core::error::Result;
use lilac_core::schema::{Bin, DType, PathTuple, Value};
use lilac_core::selector::unnest;
use lilac_core::store::DatasetView;

#[derive(Debug, Clone)]
pub struct Stats {
    pub total_count: usize,
    pub approx_distinct: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg_text_length: Option<f64>,
}

/// Compute stats for `path` (spec §4.8 "Stats"): total non-null count,
/// approximate distinct sampled from the first `sample_size` values,
/// average text length for strings, min/max for ordinal leaves (NaNs
/// filtered before comparison).
pub fn stats(view: &DatasetView, path: &PathTuple, sample_size: usize) -> Result<Stats> {
    let items = unnest(view.rows(), &view.schema, path)?;
    let total_count = items.len();

    let mut distinct = HashSet::new();
    for item in items.iter().take(sample_size) {
        distinct.insert(value_key(&item.value));
    }

    let leaf_dtype = view.schema.get_field(path).ok().and_then(|f| f.dtype());

    let avg_text_length = if leaf_dtype == Some(DType::String) {
        let lens: Vec<f64> = items
            .iter()
            .filter_map(|i| i.value.as_str())
            .map(|s| s.chars().count() as f64)
            .collect();
        (!lens.is_empty()).then(|| lens.iter().sum::<f64>() / lens.len() as f64)
    } else {
        None
    };

    let (min, max) = if leaf_dtype.map(|d| d.is_ordinal()).unwrap_or(false) {
        let mut nums: Vec<f64> = items.iter().filter_map(|i| i.value.as_f64()).filter(|v| !v.is_nan()).collect();
        nums.sort_by(|a, b| a.partial_cmp(b).unwrap());
        (nums.first().copied(), nums.last().copied())
    } else {
        (None, None)
    };

    Ok(Stats {
        total_count,
        approx_distinct: distinct.len(),
        min,
        max,
        avg_text_length,
    })
}

fn value_key(value: &Value) -> String {
    serde_json::to_string(value.bare()).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSortBy {
    Value,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct GroupBin {
    pub label: String,
    /// `None` means open-ended.
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub count: usize,
}

/// `select_groups`'s result: either counts (possibly binned), or the
/// `TooManyDistinct` sentinel (SPEC_FULL §C.3: a typed result variant, not
/// an error).
#[derive(Debug, Clone)]
pub enum SelectGroupsResult {
    Grouped(Vec<GroupBin>),
    TooManyDistinct,
}

#[allow(clippy::too_many_arguments)]
pub fn select_groups(
    view: &DatasetView,
    path: &PathTuple,
    declared_bins: Option<&[Bin]>,
    num_auto_bins: usize,
    too_many_distinct_threshold: usize,
    sample_size: usize,
    sort_by: GroupSortBy,
    direction: SortDirection,
    limit: Option<usize>,
) -> Result<SelectGroupsResult> {
    let items = unnest(view.rows(), &view.schema, path)?;
    let leaf_dtype = view.schema.get_field(path).ok().and_then(|f| f.dtype());

    // Bin hints declared on the leaf (or passed by the caller) are reused
    // as-is, bypassing distinct-count/auto-binning entirely (SPEC_FULL §C.4).
    if let Some(bins) = declared_bins {
        if !bins.is_empty() {
            let mut result = bucket_declared(&items, bins);
            sort_and_limit(&mut result, sort_by, direction, limit, true);
            return Ok(SelectGroupsResult::Grouped(result));
        }
    }

    if leaf_dtype.map(|d| d.is_ordinal()).unwrap_or(false) {
        let nums: Vec<f64> = items.iter().filter_map(|i| i.value.as_f64()).filter(|v| !v.is_nan()).collect();
        let distinct: HashSet<u64> = nums.iter().take(sample_size).map(|v| v.to_bits()).collect();
        if distinct.len() > too_many_distinct_threshold {
            return Ok(SelectGroupsResult::TooManyDistinct);
        }
        if nums.is_empty() {
            return Ok(SelectGroupsResult::Grouped(Vec::new()));
        }
        let min = nums.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = nums.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let integer_valued = leaf_dtype.map(|d| d.is_numeric() && !d.is_float()).unwrap_or(false);
        let bins = derive_auto_bins(min, max, num_auto_bins, integer_valued);
        let mut counts = vec![0usize; bins.len()];
        for v in &nums {
            counts[bin_index(*v, &bins)] += 1;
        }
        let mut result: Vec<GroupBin> = bins
            .into_iter()
            .zip(counts)
            .map(|(b, count)| GroupBin {
                label: b.label,
                start: b.start,
                end: b.end,
                count,
            })
            .collect();
        sort_and_limit(&mut result, sort_by, direction, limit, true);
        return Ok(SelectGroupsResult::Grouped(result));
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for item in &items {
        *counts.entry(value_key(&item.value)).or_insert(0) += 1;
    }
    let distinct_in_sample = counts.len();
    if distinct_in_sample > too_many_distinct_threshold {
        return Ok(SelectGroupsResult::TooManyDistinct);
    }
    let mut result: Vec<GroupBin> = counts
        .into_iter()
        .map(|(label, count)| GroupBin {
            label,
            start: None,
            end: None,
            count,
        })
        .collect();
    sort_and_limit(&mut result, sort_by, direction, limit, false);
    Ok(SelectGroupsResult::Grouped(result))
}

struct AutoBin {
    label: String,
    start: Option<f64>,
    end: Option<f64>,
}

/// `NUM_AUTO_BINS` equal-width bins spanning `[min, max]`; first and last
/// are open-ended (spec §4.8, scenario E). For integer-valued leaves the
/// span is widened by one so that e.g. values `0..=99` over 10 bins yields
/// bins of width 10, not 9.9 (SPEC_FULL's resolution of an otherwise
/// ambiguous edge case).
fn derive_auto_bins(min: f64, max: f64, num_bins: usize, integer_valued: bool) -> Vec<AutoBin> {
    let num_bins = num_bins.max(1);
    let span = if integer_valued { (max - min) + 1.0 } else { max - min };
    let width = if span <= 0.0 { 1.0 } else { span / num_bins as f64 };

    (0..num_bins)
        .map(|i| {
            let start = if i == 0 { None } else { Some(min + width * i as f64) };
            let end = if i == num_bins - 1 { None } else { Some(min + width * (i + 1) as f64) };
            let label = match (start, end) {
                (None, Some(e)) => format!("<{e}"),
                (Some(s), None) => format!(">={s}"),
                (Some(s), Some(e)) => format!("{s}-{e}"),
                (None, None) => "all".to_string(),
            };
            AutoBin { label, start, end }
        })
        .collect()
}

fn bin_index(v: f64, bins: &[AutoBin]) -> usize {
    for (i, bin) in bins.iter().enumerate() {
        let above_start = bin.start.map(|s| v >= s).unwrap_or(true);
        let below_end = bin.end.map(|e| v < e).unwrap_or(true);
        if above_start && below_end {
            return i;
        }
    }
    bins.len() - 1
}

fn bucket_declared(items: &[lilac_core::selector::UnnestItem], bins: &[Bin]) -> Vec<GroupBin> {
    let mut counts = vec![0usize; bins.len()];
    for item in items {
        if let Some(v) = item.value.as_f64() {
            if v.is_nan() {
                continue;
            }
            for (i, bin) in bins.iter().enumerate() {
                let above_start = bin.start.map(|s| v >= s).unwrap_or(true);
                let below_end = bin.end.map(|e| v < e).unwrap_or(true);
                if above_start && below_end {
                    counts[i] += 1;
                    break;
                }
            }
        }
    }
    bins.iter()
        .zip(counts)
        .map(|(b, count)| GroupBin {
            label: b.label.clone(),
            start: b.start,
            end: b.end,
            count,
        })
        .collect()
}

/// `numeric` distinguishes binned (ordinal) results, whose bins have a
/// natural order given by `start` (open-ended low bin first), from
/// categorical group-by results, which have no numeric position and sort
/// by label (spec §4.8 scenario E: the first bin is the open-ended low
/// one, not whichever label sorts first lexicographically).
fn sort_and_limit(
    bins: &mut Vec<GroupBin>,
    sort_by: GroupSortBy,
    direction: SortDirection,
    limit: Option<usize>,
    numeric: bool,
) {
    bins.sort_by(|a, b| {
        let ordering = match sort_by {
            GroupSortBy::Count => a.count.cmp(&b.count),
            GroupSortBy::Value if numeric => {
                let a_start = a.start.unwrap_or(f64::NEG_INFINITY);
                let b_start = b.start.unwrap_or(f64::NEG_INFINITY);
                a_start.partial_cmp(&b_start).unwrap_or(std::cmp::Ordering::Equal)
            }
            GroupSortBy::Value => a.label.cmp(&b.label),
        };
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
    if let Some(limit) = limit {
        bins.truncate(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lilac_core::schema::{Field, Schema};
    use lilac_core::store::Row;
    use std::collections::BTreeMap as Map;

    fn view_with_ints(values: &[i64]) -> DatasetView {
        let mut root = Map::new();
        root.insert("col".to_string(), Field::leaf(DType::Int32));
        let schema = Schema::new(root);

        let rows: Vec<Row> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut fields = Map::new();
                fields.insert("col".to_string(), Value::Int(*v));
                Row {
                    row_id: format!("r{i}"),
                    value: Value::Record(fields),
                }
            })
            .collect();

        DatasetView::from_rows(std::path::PathBuf::from("test-dataset"), schema, rows)
    }

    #[test]
    fn auto_binning_yields_open_ended_edges_summing_to_total() {
        let values: Vec<i64> = (0..100).collect();
        let view = view_with_ints(&values);
        let result = select_groups(
            &view,
            &PathTuple::parse("col"),
            None,
            10,
            1_000,
            100_000,
            GroupSortBy::Value,
            SortDirection::Asc,
            None,
        )
        .unwrap();
        match result {
            SelectGroupsResult::Grouped(bins) => {
                assert_eq!(bins.len(), 10);
                assert_eq!(bins[0].start, None);
                assert_eq!(bins[9].end, None);
                assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 100);
            }
            SelectGroupsResult::TooManyDistinct => panic!("expected grouped result"),
        }
    }

    #[test]
    fn too_many_distinct_short_circuits_binning() {
        let values: Vec<i64> = (0..50).collect();
        let view = view_with_ints(&values);
        let result = select_groups(
            &view,
            &PathTuple::parse("col"),
            None,
            10,
            5,
            100_000,
            GroupSortBy::Value,
            SortDirection::Asc,
            None,
        )
        .unwrap();
        assert!(matches!(result, SelectGroupsResult::TooManyDistinct));
    }
}
