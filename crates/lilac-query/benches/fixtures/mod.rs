// Synthetic dataset generators for benchmarking the query and vector layers.

use std::collections::BTreeMap as Map;
use std::path::PathBuf;

use lilac_core::schema::{DType, Field, Schema, Value};
use lilac_core::store::{DatasetView, Row};

/// Workload size presets.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum WorkloadSize {
    Small,  // 1k rows
    Medium, // 25k rows
}

impl WorkloadSize {
    pub fn row_count(&self) -> usize {
        match self {
            WorkloadSize::Small => 1_000,
            WorkloadSize::Medium => 25_000,
        }
    }
}

/// A view with an `int` leaf and a `text` leaf, `n` rows, values spread
/// across a range wide enough to exercise filtering, sorting, and grouping.
pub fn generate_view(size: WorkloadSize) -> DatasetView {
    let n = size.row_count();

    let mut root = Map::new();
    root.insert("int".to_string(), Field::leaf(DType::Int32));
    root.insert("text".to_string(), Field::leaf(DType::String));
    let schema = Schema::new(root);

    let rows: Vec<Row> = (0..n)
        .map(|i| {
            let mut fields = Map::new();
            fields.insert("int".to_string(), Value::Int((i % 1_000) as i64));
            fields.insert("text".to_string(), Value::Str(format!("row number {i} has some words in it")));
            Row {
                row_id: format!("r{i:08}"),
                value: Value::Record(fields),
            }
        })
        .collect();

    DatasetView::from_rows(PathBuf::from("bench-dataset"), schema, rows)
}

/// `n` normalized-ish vectors of `dim` dimensions, keyed `(row_id, 0)`.
pub fn generate_vectors(n: usize, dim: usize) -> Vec<((String, u32), Vec<f32>)> {
    (0..n)
        .map(|i| {
            let vector: Vec<f32> = (0..dim).map(|d| ((i * 31 + d * 7) % 97) as f32).collect();
            ((format!("r{i:08}"), 0u32), vector)
        })
        .collect()
}
