//! Columnar Store (spec §4.2): discovers manifests, opens a joined logical
//! view, and commits/deletes signal shards.

mod graft;
pub mod manifest;
mod shard_io;

pub use manifest::{
    DiscoveredManifest, SignalIdentity, SignalManifest, SourceInfo, SourceManifest,
    SETTINGS_FILENAME, SHARD_FILENAME, SIGNAL_MANIFEST_FILENAME, SOURCE_MANIFEST_FILENAME,
};
pub use shard_io::{content_hash, read_shard, read_shard_map, write_shard, PhysicalRow};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{LilacError, Result};
use crate::schema::{PathTuple, Schema, Value};

/// A fully joined logical row: row-id plus the merged value across the
/// source row and every signal row with the same row-id (spec invariant 5).
#[derive(Debug, Clone)]
pub struct Row {
    pub row_id: String,
    pub value: Value,
}

/// A logical, joined view over one dataset directory's shards.
///
/// The store does not enforce global ordering across shards; row-id join
/// is the only linkage (spec §4.2).
pub struct DatasetView {
    pub dataset_dir: PathBuf,
    pub schema: Schema,
    pub source_manifest: SourceManifest,
    pub signal_manifests: Vec<(PathBuf, SignalManifest)>,
    rows: Vec<Row>,
    row_index: BTreeMap<String, usize>,
}

impl DatasetView {
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_by_id(&self, row_id: &str) -> Option<&Row> {
        self.row_index.get(row_id).map(|&i| &self.rows[i])
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Build a view directly from a schema and rows, bypassing discovery.
    /// Used by callers (and tests) that already hold a materialized view,
    /// e.g. the query engine's in-memory scenario fixtures.
    pub fn from_rows(dataset_dir: PathBuf, schema: Schema, rows: Vec<Row>) -> Self {
        let mut row_vec = rows;
        row_vec.sort_by(|a, b| a.row_id.cmp(&b.row_id));
        let row_index = row_vec
            .iter()
            .enumerate()
            .map(|(i, r)| (r.row_id.clone(), i))
            .collect();
        Self {
            source_manifest: SourceManifest {
                files: Vec::new(),
                data_schema: schema.clone(),
                source: SourceInfo {
                    name: dataset_dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                },
            },
            dataset_dir,
            schema,
            signal_manifests: Vec::new(),
            rows: row_vec,
            row_index,
        }
    }
}

/// Discover all manifests under a dataset directory, source-first, then
/// signals in discovery order (a stable directory walk order — spec notes
/// this ordering is observable and part of the contract).
pub fn discover(dataset_dir: &Path) -> Result<Vec<DiscoveredManifest>> {
    let mut out = Vec::new();

    let source_path = dataset_dir.join(SOURCE_MANIFEST_FILENAME);
    if source_path.exists() {
        let manifest = read_json::<SourceManifest>(&source_path)?;
        out.push(DiscoveredManifest::Source {
            dir: dataset_dir.to_path_buf(),
            manifest,
        });
    }

    let mut signal_dirs = Vec::new();
    walk_signal_manifests(dataset_dir, &mut signal_dirs)?;
    signal_dirs.sort();

    for dir in signal_dirs {
        let manifest_path = dir.join(SIGNAL_MANIFEST_FILENAME);
        match read_json::<SignalManifest>(&manifest_path) {
            Ok(manifest) => out.push(DiscoveredManifest::Signal { dir, manifest }),
            Err(err) => {
                // Manifest corruption degrades gracefully: skip and warn,
                // discovery continues (spec §7 propagation policy).
                warn!(path = %manifest_path.display(), error = %err, "skipping corrupt signal manifest");
            }
        }
    }

    Ok(out)
}

fn walk_signal_manifests(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let entries = std::fs::read_dir(dir).map_err(|e| LilacError::Io {
        location: dir.display().to_string(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| LilacError::Io {
            location: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            if path.join(SIGNAL_MANIFEST_FILENAME).exists() {
                out.push(path.clone());
            }
            walk_signal_manifests(&path, out)?;
        }
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| LilacError::Io {
        location: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| LilacError::Serde {
        location: path.display().to_string(),
        source: e,
    })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| LilacError::Serde {
        location: path.display().to_string(),
        source: e,
    })?;
    // Write-then-rename so a reader never observes a partially written
    // manifest (the commit's linearization point, spec §4.9).
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &bytes).map_err(|e| LilacError::Io {
        location: tmp_path.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| LilacError::Io {
        location: path.display().to_string(),
        source: e,
    })
}

/// Open the joined view: source row values merged with every discovered
/// signal's output, grafted at its enriched path (spec §4.2 "Open view").
pub fn open_view(dataset_dir: &Path) -> Result<DatasetView> {
    let manifests = discover(dataset_dir)?;

    let mut source_manifest = None;
    let mut schema = Schema::empty();
    let mut rows: BTreeMap<String, Value> = BTreeMap::new();
    let mut signal_manifests = Vec::new();

    for discovered in manifests {
        match discovered {
            DiscoveredManifest::Source { dir, manifest } => {
                schema = schema.merge(&manifest.data_schema)?;
                for file in &manifest.files {
                    let shard_path = dir.join(file);
                    for physical in read_shard(&shard_path)? {
                        rows.insert(physical.row_id, physical.fragment);
                    }
                }
                source_manifest = Some(manifest);
            }
            DiscoveredManifest::Signal { dir, manifest } => {
                debug!(path = %manifest.enriched_path, signal = %manifest.signal.name, "joining signal shard");
                let fragment_field = wrap_signal_schema(&manifest);
                schema = attach_schema(&schema, &manifest.enriched_path, &manifest.signal_key, fragment_field)?;

                for file in &manifest.files {
                    let shard_path = dir.join(file);
                    for physical in read_shard(&shard_path)? {
                        if let Some(existing) = rows.get(&physical.row_id) {
                            let grafted = graft::graft_at(
                                existing,
                                &manifest.enriched_path,
                                &manifest.signal_key,
                                &physical.fragment,
                            )?;
                            rows.insert(physical.row_id.clone(), grafted);
                        }
                        // Row-ids the signal produced that no longer exist
                        // in the source are silently dropped: the source
                        // manifest's row-ids are authoritative (spec §9
                        // open question, resolved in DESIGN.md).
                    }
                }
                signal_manifests.push((dir, manifest));
            }
        }
    }

    let source_manifest = source_manifest.ok_or_else(|| LilacError::ManifestCorrupt {
        location: dataset_dir.display().to_string(),
        reason: "no source manifest found".to_string(),
    })?;

    let mut row_vec: Vec<Row> = rows
        .into_iter()
        .map(|(row_id, value)| Row { row_id, value })
        .collect();
    row_vec.sort_by(|a, b| a.row_id.cmp(&b.row_id));
    let row_index = row_vec
        .iter()
        .enumerate()
        .map(|(i, r)| (r.row_id.clone(), i))
        .collect();

    Ok(DatasetView {
        dataset_dir: dataset_dir.to_path_buf(),
        schema,
        source_manifest,
        signal_manifests,
        rows: row_vec,
        row_index,
    })
}

fn wrap_signal_schema(manifest: &SignalManifest) -> crate::schema::Field {
    manifest
        .data_schema
        .root
        .get(&manifest.signal_key)
        .cloned()
        .unwrap_or_else(|| crate::schema::Field::leaf(crate::schema::DType::String))
}

fn attach_schema(
    schema: &Schema,
    enriched_path: &PathTuple,
    signal_key: &str,
    fragment: crate::schema::Field,
) -> Result<Schema> {
    use crate::schema::{Field, PathSegment, SignalDescriptor};

    fn recurse(
        field: &Field,
        remaining: &[PathSegment],
        signal_key: &str,
        fragment: &Field,
        descriptor: &SignalDescriptor,
    ) -> Field {
        match remaining.split_first() {
            None => field.attach_signal(signal_key, fragment.clone(), descriptor.clone()),
            Some((PathSegment::Key(k), rest)) => match field {
                Field::Record { fields, signal } => {
                    let mut fields = fields.clone();
                    if let Some(child) = fields.get(k) {
                        let updated = recurse(child, rest, signal_key, fragment, descriptor);
                        fields.insert(k.clone(), updated);
                    }
                    Field::Record {
                        fields,
                        signal: signal.clone(),
                    }
                }
                other => other.clone(),
            },
            Some((PathSegment::Wildcard, rest)) => match field {
                Field::Repeated { child } => Field::Repeated {
                    child: Box::new(recurse(child, rest, signal_key, fragment, descriptor)),
                },
                other => other.clone(),
            },
        }
    }

    let descriptor = SignalDescriptor {
        name: signal_key.to_string(),
        params: serde_json::Value::Null,
        input_path: enriched_path.clone(),
    };

    let mut root = schema.root.clone();
    if let Some(PathSegment::Key(top)) = enriched_path.segments.first() {
        if let Some(field) = root.get(top) {
            let updated = recurse(
                field,
                &enriched_path.segments[1..],
                signal_key,
                &fragment,
                &descriptor,
            );
            root.insert(top.clone(), updated);
        }
    }
    Ok(Schema { root })
}

/// Per-dataset commit lock. The store serializes manifest writes with this
/// lock; cross-process coordination is out of scope (DESIGN.md resolves
/// this as a library limitation — single-writer-per-process).
#[derive(Default, Clone)]
pub struct DatasetLock(Arc<Mutex<()>>);

impl DatasetLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.0.lock();
        f()
    }
}

/// Atomically write a new signal shard plus manifest (spec §4.2 "Append
/// signal shard"). The manifest write is the linearization point.
pub fn append_signal_shard(
    dataset_dir: &Path,
    lock: &DatasetLock,
    manifest: &SignalManifest,
    rows: &[PhysicalRow],
) -> Result<()> {
    lock.with_lock(|| {
        let dir = dataset_dir.join(manifest.relative_dir());
        std::fs::create_dir_all(&dir).map_err(|e| LilacError::Io {
            location: dir.display().to_string(),
            source: e,
        })?;

        for file in &manifest.files {
            let shard_path = dir.join(file);
            retry_write(&shard_path, 3, || write_shard(&shard_path, rows))?;
        }

        let manifest_path = dir.join(SIGNAL_MANIFEST_FILENAME);
        write_json(&manifest_path, manifest)?;
        info!(dir = %dir.display(), signal = %manifest.signal.name, "committed signal shard");
        Ok(())
    })
}

fn retry_write(path: &Path, attempts: usize, mut f: impl FnMut() -> Result<()>) -> Result<()> {
    let mut last_err = None;
    for _ in 0..attempts {
        match f() {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or(LilacError::CommitConflict {
        path: path.display().to_string(),
        reason: "retries exhausted".to_string(),
    }))
}

/// Remove the manifest and artifacts that contributed the given enriched
/// path (spec §4.2 "Delete signal subtree"; property 7: a left inverse of
/// `compute_signal`).
pub fn delete_signal_subtree(
    dataset_dir: &Path,
    lock: &DatasetLock,
    enriched_path: &PathTuple,
    signal_key: &str,
) -> Result<()> {
    lock.with_lock(|| {
        let stripped: Vec<String> = enriched_path
            .segments
            .iter()
            .filter_map(|s| match s {
                crate::schema::PathSegment::Key(k) => Some(k.clone()),
                crate::schema::PathSegment::Wildcard => None,
            })
            .collect();
        let dir = dataset_dir.join(stripped.join("/")).join(signal_key);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| LilacError::Io {
                location: dir.display().to_string(),
                source: e,
            })?;
            info!(dir = %dir.display(), "deleted signal subtree");
        }
        Ok(())
    })
}
