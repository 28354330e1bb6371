//! On-disk manifest formats (spec §6 "On-disk layout").

use serde::{Deserialize, Serialize};

use crate::schema::{PathTuple, Schema};

pub const SOURCE_MANIFEST_FILENAME: &str = "manifest.json";
pub const SIGNAL_MANIFEST_FILENAME: &str = "signal_manifest.json";
pub const SETTINGS_FILENAME: &str = "settings.json";
pub const SHARD_FILENAME: &str = "data-00000-of-00001.parquet";

/// `{files:[…], data_schema:…, source:…}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceManifest {
    pub files: Vec<String>,
    pub data_schema: Schema,
    pub source: SourceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,
}

/// `{files:[…], parquet_id, data_schema, signal:{name,params}, enriched_path,
/// embedding_filename_prefix?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalManifest {
    pub files: Vec<String>,
    pub parquet_id: String,
    /// Schema fragment this signal contributes, rooted at `signal_key`.
    pub data_schema: Schema,
    pub signal: SignalIdentity,
    pub enriched_path: PathTuple,
    /// The key this signal's output is attached under, as a child of
    /// `enriched_path` (spec glossary "Enriched path").
    pub signal_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_filename_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalIdentity {
    pub name: String,
    pub params: serde_json::Value,
}

impl SignalManifest {
    /// The manifest's on-disk directory, relative to the dataset root:
    /// `<path-with-wildcards-stripped>/<signal_key>`.
    pub fn relative_dir(&self) -> String {
        let stripped: Vec<String> = self
            .enriched_path
            .segments
            .iter()
            .filter_map(|s| match s {
                crate::schema::PathSegment::Key(k) => Some(k.clone()),
                crate::schema::PathSegment::Wildcard => None,
            })
            .collect();
        format!("{}/{}", stripped.join("/"), self.signal_key)
    }
}

/// One discovered manifest, source or signal (spec §4.2 "Discover": source
/// first, then signals in discovery order).
#[derive(Debug, Clone)]
pub enum DiscoveredManifest {
    Source {
        dir: std::path::PathBuf,
        manifest: SourceManifest,
    },
    Signal {
        dir: std::path::PathBuf,
        manifest: SignalManifest,
    },
}
