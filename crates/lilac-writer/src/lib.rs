//! Manifest Writer (spec §4.9): turns a [`Signal`]'s computed per-row
//! outputs into a committed signal shard, and tears one back down.
//!
//! The heavy lifting — atomic shard write, manifest write-then-rename,
//! per-dataset commit lock — already lives in `lilac_core::store`; this
//! crate is the glue that shapes a signal's outputs into a
//! [`SignalManifest`] and a batch of [`PhysicalRow`]s, and persists the
//! vector index for embedding-producing signals ahead of the manifest
//! write (spec invariant: the manifest commit is the linearization point,
//! so nothing it references may be missing once it lands).

use std::collections::BTreeMap;
use std::path::Path;

use lilac_core::error::{LilacError, Result};
use lilac_core::schema::{PathTuple, Schema, Value};
use lilac_core::store::{self, DatasetLock, PhysicalRow, SignalIdentity, SignalManifest};
use lilac_udf::{Signal, SignalKind};
use lilac_vector::VectorIndex;

const EMBEDDING_VECTOR_SUFFIX: &str = "vectors.bin";

/// Commit `signal`'s outputs as a new signal shard, grafted at
/// `enriched_path` under `signal_key` (spec §4.9 "Append signal shard").
///
/// `outputs` must carry one entry per row-id the signal ran over, in the
/// same row-id set as the source (rows the signal skipped carry `None`,
/// persisted as a null fragment rather than omitted — the shard's row set
/// always matches the source's, per sparse preservation).
pub fn commit_signal(
    dataset_dir: &Path,
    lock: &DatasetLock,
    signal: &dyn Signal,
    enriched_path: PathTuple,
    signal_key: String,
    outputs: &[(String, Option<Value>)],
    vector_index: &dyn VectorIndex,
) -> Result<()> {
    let rows: Vec<PhysicalRow> = outputs
        .iter()
        .map(|(row_id, value)| PhysicalRow {
            row_id: row_id.clone(),
            fragment: value.clone().unwrap_or(Value::Null),
        })
        .collect();

    let parquet_id = store::content_hash(&rows)?;
    let shard_name = format!("{parquet_id}.parquet");

    let mut data_schema_root = BTreeMap::new();
    data_schema_root.insert(signal_key.clone(), signal.output_schema_fragment());
    let data_schema = Schema::new(data_schema_root);

    // Only embedding-producing signals park vectors in the Vector Index;
    // everything else's output lives entirely in the row-store fragment.
    let embedding_filename_prefix = matches!(signal.kind(), SignalKind::TextToEmbedding).then(|| signal_key.clone());

    let manifest = SignalManifest {
        files: vec![shard_name],
        parquet_id,
        data_schema,
        signal: SignalIdentity {
            name: signal.name().to_string(),
            params: signal.params(),
        },
        enriched_path,
        signal_key,
        embedding_filename_prefix: embedding_filename_prefix.clone(),
    };

    // Persist the vector index before the manifest commits, so a reader
    // that sees `embedding_filename_prefix` in the manifest can always find
    // the file it names.
    if let Some(prefix) = &embedding_filename_prefix {
        let dir = dataset_dir.join(manifest.relative_dir());
        std::fs::create_dir_all(&dir).map_err(|e| LilacError::Io {
            location: dir.display().to_string(),
            source: e,
        })?;
        let vector_path = dir.join(format!("{prefix}.{EMBEDDING_VECTOR_SUFFIX}"));
        vector_index.persist(&vector_path)?;
        tracing::debug!(path = %vector_path.display(), "persisted vector index ahead of manifest commit");
    }

    store::append_signal_shard(dataset_dir, lock, &manifest, &rows)
}

/// Remove a previously committed signal's shard, manifest, and any
/// persisted vector file (spec §4.9 "Delete signal subtree"; property 7:
/// a left inverse of `compute_signal`). The vector file lives alongside
/// the manifest it was committed with, so `delete_signal_subtree`'s
/// directory removal already covers it.
pub fn delete_signal(dataset_dir: &Path, lock: &DatasetLock, enriched_path: &PathTuple, signal_key: &str) -> Result<()> {
    store::delete_signal_subtree(dataset_dir, lock, enriched_path, signal_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lilac_core::schema::{DType, Field, PathTuple};
    use lilac_core::store::{open_view, SourceInfo, SourceManifest, SOURCE_MANIFEST_FILENAME};
    use lilac_udf::builtins::{TextLengthSignal, ToyEmbeddingSignal};
    use lilac_udf::{InputKind, SignalInput, UdfRunner};
    use lilac_vector::DenseVectorIndex;

    fn seed_source(dir: &Path, texts: &[(&str, &str)]) {
        let mut root = BTreeMap::new();
        root.insert("text".to_string(), Field::leaf(DType::String));
        let schema = Schema::new(root);

        let rows: Vec<PhysicalRow> = texts
            .iter()
            .map(|(row_id, text)| {
                let mut fields = BTreeMap::new();
                fields.insert("text".to_string(), Value::Str(text.to_string()));
                PhysicalRow {
                    row_id: row_id.to_string(),
                    fragment: Value::Record(fields),
                }
            })
            .collect();

        let shard_path = dir.join("data-00000-of-00001.parquet");
        store::write_shard(&shard_path, &rows).unwrap();

        let manifest = SourceManifest {
            files: vec!["data-00000-of-00001.parquet".to_string()],
            data_schema: schema,
            source: SourceInfo {
                name: "test".to_string(),
            },
        };
        let manifest_path = dir.join(SOURCE_MANIFEST_FILENAME);
        std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();
    }

    #[test]
    fn commit_signal_is_visible_through_open_view() {
        let dir = tempfile::tempdir().unwrap();
        seed_source(dir.path(), &[("r1", "hello"), ("r2", "hi")]);

        let signal = TextLengthSignal;
        let index = DenseVectorIndex::new();
        let view = open_view(dir.path()).unwrap();
        let inputs: Vec<SignalInput> = view
            .rows()
            .iter()
            .map(|r| SignalInput {
                row_id: r.row_id.clone(),
                value: r.value.as_record().unwrap().get("text").cloned().unwrap(),
                parent_span_start: None,
            })
            .collect();
        let outputs = UdfRunner::run(&signal, &inputs, &index).unwrap();
        let keyed: Vec<(String, Option<Value>)> = view
            .rows()
            .iter()
            .zip(outputs)
            .map(|(r, v)| (r.row_id.clone(), v))
            .collect();

        let lock = DatasetLock::new();
        commit_signal(
            dir.path(),
            &lock,
            &signal,
            PathTuple::parse("text"),
            "length".to_string(),
            &keyed,
            &index,
        )
        .unwrap();

        let view = open_view(dir.path()).unwrap();
        let r1 = view.row_by_id("r1").unwrap();
        let text = r1.value.as_record().unwrap().get("text").unwrap();
        let length = text.as_record().unwrap().get("length").unwrap();
        assert_eq!(length, &Value::Int(5));
    }

    #[test]
    fn delete_signal_removes_the_committed_subtree() {
        let dir = tempfile::tempdir().unwrap();
        seed_source(dir.path(), &[("r1", "hello")]);

        let signal = TextLengthSignal;
        let index = DenseVectorIndex::new();
        let lock = DatasetLock::new();
        commit_signal(
            dir.path(),
            &lock,
            &signal,
            PathTuple::parse("text"),
            "length".to_string(),
            &[("r1".to_string(), Some(Value::Int(5)))],
            &index,
        )
        .unwrap();

        delete_signal(dir.path(), &lock, &PathTuple::parse("text"), "length").unwrap();

        let view = open_view(dir.path()).unwrap();
        let r1 = view.row_by_id("r1").unwrap();
        let text = r1.value.as_record().unwrap().get("text").unwrap();
        assert!(text.as_record().is_none() || !text.as_record().unwrap().contains_key("length"));
    }

    #[test]
    fn embedding_signal_persists_vector_file_before_manifest_references_it() {
        let dir = tempfile::tempdir().unwrap();
        seed_source(dir.path(), &[("r1", "hello world")]);

        let signal = ToyEmbeddingSignal;
        let index = DenseVectorIndex::new();
        let view = open_view(dir.path()).unwrap();
        let inputs: Vec<SignalInput> = view
            .rows()
            .iter()
            .map(|r| SignalInput {
                row_id: r.row_id.clone(),
                value: r.value.as_record().unwrap().get("text").cloned().unwrap(),
                parent_span_start: None,
            })
            .collect();
        assert_eq!(signal.input_kind(), InputKind::Text);
        let outputs = UdfRunner::run(&signal, &inputs, &index).unwrap();
        let keyed: Vec<(String, Option<Value>)> =
            view.rows().iter().zip(outputs).map(|(r, v)| (r.row_id.clone(), v)).collect();

        let lock = DatasetLock::new();
        commit_signal(
            dir.path(),
            &lock,
            &signal,
            PathTuple::parse("text"),
            "embedding".to_string(),
            &keyed,
            &index,
        )
        .unwrap();

        let vector_path = dir.path().join("text/embedding/embedding.vectors.bin");
        assert!(vector_path.exists());
        let reloaded = DenseVectorIndex::load(&vector_path).unwrap();
        assert!(reloaded.dim().is_some());
    }
}
