//! `Engine`: the facade that wires the Columnar Store, UDF Runner, Query
//! Planner/Executor, and Manifest Writer behind one per-dataset handle (spec
//! §6 "Query API"; §9 "the engine is instantiated per dataset directory").

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lilac_core::error::{LilacError, Result};
use lilac_core::schema::{PathTuple, Schema, Value};
use lilac_core::store::{
    self, DatasetLock, DatasetView, DiscoveredManifest, PhysicalRow, SourceInfo, SourceManifest,
    SOURCE_MANIFEST_FILENAME,
};
use lilac_core::selector;
use lilac_udf::{InputKind, Signal, SignalInput, UdfRunner};
use lilac_vector::{DenseVectorIndex, VectorIndex};

pub use lilac_config::RuntimeConfig;
pub use lilac_query::{
    select_groups, stats, ColumnSelector, Filter, FilterOp, GroupBin, GroupSortBy, GroupSortDirection, ResultRow,
    Search, SelectGroupsResult, SelectRowsRequest, SelectRowsResult, SortDirection, SortSpec, Stats,
};

/// `manifest()`'s result (spec §6; SPEC_FULL §C.2): the dataset's name
/// (the directory's final path component), its joined schema, and its row
/// count (authoritative from the source, since signals never add rows).
#[derive(Debug, Clone)]
pub struct ManifestInfo {
    pub dataset_name: String,
    pub schema: Schema,
    pub num_rows: usize,
}

/// Per-dataset handle. Holds the dataset directory, the commit lock shared
/// across every write this process makes to it, and the tunables that size
/// stats/groups sampling (spec §5: "the engine is instantiated per dataset
/// directory; no process-wide singletons").
pub struct Engine {
    dataset_dir: PathBuf,
    lock: DatasetLock,
    config: RuntimeConfig,
}

impl Engine {
    pub fn open(dataset_dir: impl Into<PathBuf>, config: RuntimeConfig) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            lock: DatasetLock::new(),
            config,
        }
    }

    pub fn dataset_dir(&self) -> &Path {
        &self.dataset_dir
    }

    /// Ingest a sample of JSON-shaped records as the dataset's source shard
    /// (SPEC_FULL §C.1: schema inferred from the sample via `Schema::infer`).
    /// `row_id_field`, if present on a record, supplies that row's row-id;
    /// otherwise rows are numbered `r0`, `r1`, ... in ingest order. Row-id
    /// stability across a second `ingest` call on the same directory is not
    /// guaranteed (spec §9 open question) — re-ingesting overwrites the
    /// source shard and any existing signal shards become orphaned until
    /// explicitly recomputed or deleted.
    pub fn ingest(&self, records: &[serde_json::Value], row_id_field: Option<&str>) -> Result<()> {
        std::fs::create_dir_all(&self.dataset_dir).map_err(|e| LilacError::Io {
            location: self.dataset_dir.display().to_string(),
            source: e,
        })?;

        // The row-id field (if any) identifies a row; it isn't dataset
        // content, so it's excluded from the inferred schema and the row's
        // own fragment.
        let without_row_id = |record: &serde_json::Value| -> serde_json::Value {
            match (row_id_field, record) {
                (Some(field), serde_json::Value::Object(map)) => {
                    let mut map = map.clone();
                    map.remove(field);
                    serde_json::Value::Object(map)
                }
                _ => record.clone(),
            }
        };
        let content: Vec<serde_json::Value> = records.iter().map(without_row_id).collect();
        let schema = Schema::infer(&content, content.len().max(1));

        let rows: Vec<PhysicalRow> = records
            .iter()
            .zip(&content)
            .enumerate()
            .map(|(i, (record, content))| {
                let row_id = row_id_field
                    .and_then(|field| record.get(field))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("r{i}"));
                PhysicalRow {
                    row_id,
                    fragment: json_to_value(content),
                }
            })
            .collect();

        let shard_path = self.dataset_dir.join("data-00000-of-00001.parquet");
        self.lock.with_lock(|| {
            store::write_shard(&shard_path, &rows)?;
            let manifest = SourceManifest {
                files: vec!["data-00000-of-00001.parquet".to_string()],
                data_schema: schema,
                source: SourceInfo {
                    name: self
                        .dataset_dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                },
            };
            let manifest_path = self.dataset_dir.join(SOURCE_MANIFEST_FILENAME);
            let bytes = serde_json::to_vec_pretty(&manifest).map_err(|e| LilacError::Serde {
                location: manifest_path.display().to_string(),
                source: e,
            })?;
            std::fs::write(&manifest_path, bytes).map_err(|e| LilacError::Io {
                location: manifest_path.display().to_string(),
                source: e,
            })
        })
    }

    fn open_view(&self) -> Result<DatasetView> {
        store::open_view(&self.dataset_dir)
    }

    /// Rebuild the shared vector index from every committed embedding
    /// signal's persisted file (there is one process-wide index per
    /// dataset; a `VectorKey` carries no signal identity of its own, so
    /// every embedding signal's vectors share the same index — spec §4.4).
    fn load_vector_index(&self) -> Result<DenseVectorIndex> {
        let index = DenseVectorIndex::new();
        for discovered in store::discover(&self.dataset_dir)? {
            if let DiscoveredManifest::Signal { dir, manifest } = discovered {
                if let Some(prefix) = &manifest.embedding_filename_prefix {
                    let path = dir.join(format!("{prefix}.vectors.bin"));
                    if path.exists() {
                        index.load_into(&path)?;
                    }
                }
            }
        }
        Ok(index)
    }

    pub fn manifest(&self) -> Result<ManifestInfo> {
        let view = self.open_view()?;
        Ok(ManifestInfo {
            dataset_name: self
                .dataset_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            schema: view.schema,
            num_rows: view.rows().len(),
        })
    }

    pub fn select_rows(&self, request: SelectRowsRequest) -> Result<SelectRowsResult> {
        let view = self.open_view()?;
        let index = self.load_vector_index()?;
        let plan = lilac_query::plan(request, &view.schema)?;
        lilac_query::execute(&view, &plan, &index)
    }

    pub fn stats(&self, path: &PathTuple) -> Result<Stats> {
        let view = self.open_view()?;
        lilac_query::stats(&view, path, self.config.stats.approx_distinct_sample_size)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn select_groups(
        &self,
        path: &PathTuple,
        sort_by: GroupSortBy,
        direction: GroupSortDirection,
        limit: Option<usize>,
    ) -> Result<SelectGroupsResult> {
        let view = self.open_view()?;
        let declared_bins = view.schema.get_field(path).ok().and_then(|f| match f {
            lilac_core::schema::Field::Leaf { bins, .. } => bins.as_deref(),
            _ => None,
        });
        lilac_query::select_groups(
            &view,
            path,
            declared_bins,
            self.config.stats.num_auto_bins,
            self.config.stats.too_many_distinct_threshold,
            self.config.stats.approx_distinct_sample_size,
            sort_by,
            direction,
            limit,
        )
    }

    /// Run `signal` over `enriched_path` and commit its outputs as a new
    /// signal shard under `signal_key` (spec §4.9).
    pub fn compute_signal(&self, signal: Arc<dyn Signal>, enriched_path: PathTuple, signal_key: String) -> Result<()> {
        let view = self.open_view()?;
        let index = self.load_vector_index()?;

        let outputs: Vec<(String, Option<Value>)> = match signal.input_kind() {
            InputKind::TextEmbedding => {
                let keys: Vec<(String, u32)> = view.rows().iter().map(|r| (r.row_id.clone(), 0)).collect();
                let scores = signal.vector_compute(&keys, &index)?;
                view.rows()
                    .iter()
                    .zip(scores)
                    .map(|(row, score)| (row.row_id.clone(), score.map(|v| Value::Float(v as f64))))
                    .collect()
            }
            InputKind::Text | InputKind::Any => {
                let inputs: Vec<SignalInput> = view
                    .rows()
                    .iter()
                    .map(|row| {
                        let value = selector::select_and_resolve(&row.value, &view.schema, &enriched_path)?;
                        let parent_span_start = parent_span_start(&row.value, &view.schema, &enriched_path)?;
                        Ok(SignalInput {
                            row_id: row.row_id.clone(),
                            value,
                            parent_span_start,
                        })
                    })
                    .collect::<Result<_>>()?;
                let raw = UdfRunner::run(signal.as_ref(), &inputs, &index)?;
                view.rows()
                    .iter()
                    .zip(raw)
                    .map(|(row, v)| (row.row_id.clone(), v))
                    .collect()
            }
        };

        lilac_writer::commit_signal(
            &self.dataset_dir,
            &self.lock,
            signal.as_ref(),
            enriched_path,
            signal_key,
            &outputs,
            &index,
        )
    }

    pub fn delete_signal(&self, enriched_path: &PathTuple, signal_key: &str) -> Result<()> {
        lilac_writer::delete_signal(&self.dataset_dir, &self.lock, enriched_path, signal_key)
    }
}

/// If `path` resolves to a `string_span` leaf, the start of that span in its
/// source string — needed so a chained signal's spans offset correctly
/// (spec §4.5 rule 3; mirrors the executor's identical computation for
/// query-time UDF columns).
fn parent_span_start(row: &Value, schema: &Schema, path: &PathTuple) -> Result<Option<usize>> {
    use lilac_core::schema::{DType, Field};
    match schema.get_field(path) {
        Ok(Field::Leaf { dtype: DType::StringSpan, .. }) => Ok(selector::select_structured(row, schema, path)?
            .as_span()
            .map(|(start, _)| start)),
        _ => Ok(None),
    }
}

/// Convert a parsed JSON value into a dataset [`Value`] (e.g. for CLI
/// filter literals, which arrive as JSON text).
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => Value::Record(map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lilac_udf::builtins::{TextLengthSignal, ToyEmbeddingSignal};

    fn engine(dir: &Path) -> Engine {
        Engine::open(dir, RuntimeConfig::default())
    }

    #[test]
    fn ingest_then_manifest_reports_row_count_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let records = vec![
            serde_json::json!({"row_id": "r1", "text": "hello"}),
            serde_json::json!({"row_id": "r2", "text": "hi"}),
        ];
        engine.ingest(&records, Some("row_id")).unwrap();

        let info = engine.manifest().unwrap();
        assert_eq!(info.num_rows, 2);
        assert!(info.schema.has_path(&PathTuple::parse("text")));
    }

    #[test]
    fn compute_signal_then_select_rows_sees_new_column() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .ingest(
                &[
                    serde_json::json!({"row_id": "r1", "text": "hello"}),
                    serde_json::json!({"row_id": "r2", "text": "hi"}),
                ],
                Some("row_id"),
            )
            .unwrap();

        engine
            .compute_signal(Arc::new(TextLengthSignal), PathTuple::parse("text"), "length".to_string())
            .unwrap();

        let request = SelectRowsRequest {
            columns: vec![ColumnSelector::column(PathTuple::parse("text.length"))],
            ..Default::default()
        };
        let result = engine.select_rows(request).unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn delete_signal_is_a_left_inverse_of_compute_signal() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.ingest(&[serde_json::json!({"row_id": "r1", "text": "hello"})], Some("row_id")).unwrap();

        let before = engine.manifest().unwrap().schema;
        engine
            .compute_signal(Arc::new(TextLengthSignal), PathTuple::parse("text"), "length".to_string())
            .unwrap();
        assert!(engine.manifest().unwrap().schema.has_path(&PathTuple::parse("text.length")));

        engine.delete_signal(&PathTuple::parse("text"), "length").unwrap();
        let after = engine.manifest().unwrap().schema;
        assert_eq!(before, after);
    }

    #[test]
    fn embedding_signal_round_trips_through_a_second_engine_instance() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .ingest(
                &[
                    serde_json::json!({"row_id": "r1", "text": "hello world"}),
                    serde_json::json!({"row_id": "r2", "text": "goodbye"}),
                ],
                Some("row_id"),
            )
            .unwrap();
        engine
            .compute_signal(Arc::new(ToyEmbeddingSignal), PathTuple::parse("text"), "embedding".to_string())
            .unwrap();

        // A fresh `Engine` over the same directory must reload the
        // persisted vector file, not rely on in-process state.
        let reopened = engine(dir.path());
        let request = SelectRowsRequest {
            searches: vec![Search::Semantic {
                path: PathTuple::parse("text.embedding"),
                signal: Arc::new(lilac_udf::builtins::SemanticSimilaritySignal::new("hello world")),
            }],
            limit: Some(1),
            ..Default::default()
        };
        let result = reopened.select_rows(request).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].row_id, "r1");
    }
}
