//! Physical shard encoding.
//!
//! Row-id is a required top-level string column on every shard (spec §6).
//! Nested values are stored JSON-encoded in a single `fragment` column —
//! the same trick the teacher's schema builder uses for structs that a
//! target format can't express natively ("S3 Tables doesn't support
//! complex types - use JSON-encoded strings instead"); here the reason is
//! that spans/embeddings/repeated fields nest arbitrarily deep and a fixed
//! Arrow struct schema can't describe every signal's shape generically.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};

use crate::error::{LilacError, Result};
use crate::schema::Value;

const ROW_ID_COLUMN: &str = "row_id";
const FRAGMENT_COLUMN: &str = "fragment";

fn arrow_shard_schema() -> Arc<ArrowSchema> {
    static SCHEMA: OnceLock<Arc<ArrowSchema>> = OnceLock::new();
    Arc::clone(SCHEMA.get_or_init(|| {
        Arc::new(ArrowSchema::new(vec![
            ArrowField::new(ROW_ID_COLUMN, DataType::Utf8, false),
            ArrowField::new(FRAGMENT_COLUMN, DataType::Utf8, true),
        ]))
    }))
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_dictionary_enabled(true)
        .set_statistics_enabled(EnabledStatistics::Page)
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(2).unwrap()))
        .set_max_row_group_size(32 * 1024)
        .build()
}

/// A row as stored physically: a row-id plus the JSON-shaped fragment this
/// shard contributes for that row (the whole source record for a source
/// shard, or a signal's output fragment for a signal shard).
#[derive(Debug, Clone)]
pub struct PhysicalRow {
    pub row_id: String,
    pub fragment: Value,
}

pub fn write_shard(path: &Path, rows: &[PhysicalRow]) -> Result<()> {
    let row_ids: Vec<&str> = rows.iter().map(|r| r.row_id.as_str()).collect();
    let fragments: Vec<String> = rows
        .iter()
        .map(|r| serde_json::to_string(&r.fragment))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| LilacError::Serde {
            location: path.display().to_string(),
            source: e,
        })?;

    let row_id_array: ArrayRef = Arc::new(StringArray::from(row_ids));
    let fragment_array: ArrayRef = Arc::new(StringArray::from(fragments));

    let batch = RecordBatch::try_new(arrow_shard_schema(), vec![row_id_array, fragment_array])
        .map_err(|e| LilacError::Arrow {
            location: path.display().to_string(),
            source: e,
        })?;

    let file = File::create(path).map_err(|e| LilacError::Io {
        location: path.display().to_string(),
        source: e,
    })?;
    let props = writer_properties();
    let mut writer = ArrowWriter::try_new(file, arrow_shard_schema(), Some(props)).map_err(|e| {
        LilacError::Parquet {
            location: path.display().to_string(),
            source: e,
        }
    })?;
    writer.write(&batch).map_err(|e| LilacError::Parquet {
        location: path.display().to_string(),
        source: e,
    })?;
    writer.close().map_err(|e| LilacError::Parquet {
        location: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

pub fn read_shard(path: &Path) -> Result<Vec<PhysicalRow>> {
    let file = File::open(path).map_err(|e| LilacError::Io {
        location: path.display().to_string(),
        source: e,
    })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| LilacError::Parquet {
        location: path.display().to_string(),
        source: e,
    })?;
    let reader = builder.build().map_err(|e| LilacError::Parquet {
        location: path.display().to_string(),
        source: e,
    })?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| LilacError::Arrow {
            location: path.display().to_string(),
            source: e,
        })?;
        let row_id_col = batch
            .column_by_name(ROW_ID_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| LilacError::ManifestCorrupt {
                location: path.display().to_string(),
                reason: "missing row_id column".to_string(),
            })?;
        let fragment_col = batch
            .column_by_name(FRAGMENT_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| LilacError::ManifestCorrupt {
                location: path.display().to_string(),
                reason: "missing fragment column".to_string(),
            })?;

        for i in 0..batch.num_rows() {
            let row_id = row_id_col.value(i).to_string();
            let fragment = if fragment_col.is_null(i) {
                Value::Null
            } else {
                serde_json::from_str(fragment_col.value(i)).map_err(|e| LilacError::Serde {
                    location: path.display().to_string(),
                    source: e,
                })?
            };
            out.push(PhysicalRow { row_id, fragment });
        }
    }
    Ok(out)
}

/// Convenience for callers that just want a row-id → fragment map.
pub fn read_shard_map(path: &Path) -> Result<HashMap<String, Value>> {
    Ok(read_shard(path)?
        .into_iter()
        .map(|r| (r.row_id, r.fragment))
        .collect())
}

/// Content hash of a shard's encoded bytes, used to name shard files so
/// repeated commits of identical content are idempotent (grounded in the
/// teacher's Blake3 content-addressed partition naming).
pub fn content_hash(rows: &[PhysicalRow]) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    for row in rows {
        hasher.update(row.row_id.as_bytes());
        let encoded = serde_json::to_vec(&row.fragment).map_err(|e| LilacError::Serde {
            location: row.row_id.clone(),
            source: e,
        })?;
        hasher.update(&encoded);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_shard_through_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.parquet");

        let rows = vec![
            PhysicalRow {
                row_id: "r1".to_string(),
                fragment: Value::Str("a".to_string()),
            },
            PhysicalRow {
                row_id: "r2".to_string(),
                fragment: Value::Null,
            },
        ];
        write_shard(&path, &rows).unwrap();
        let read_back = read_shard(&path).unwrap();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[0].row_id, "r1");
        assert_eq!(read_back[0].fragment, Value::Str("a".to_string()));
        assert_eq!(read_back[1].fragment, Value::Null);
    }
}
