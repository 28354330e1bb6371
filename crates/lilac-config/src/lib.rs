// lilac-config - Layered runtime configuration
//
// Supports configuration from multiple sources, highest priority first:
// 1. Environment variables (LILAC_*)
// 2. Config file path from LILAC_CONFIG env var, or inline LILAC_CONFIG_CONTENT
// 3. Default config file locations (./lilac.toml, ./.lilac.toml)
// 4. Built-in defaults

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod sources;
mod validation;

/// Vector index backend. `Dense` (the only one shipped today) is the default;
/// the field exists so a future alternate implementation behind
/// `lilac_vector::VectorIndex` has somewhere to be selected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorIndexKind {
    Dense,
}

impl std::fmt::Display for VectorIndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorIndexKind::Dense => write!(f, "dense"),
        }
    }
}

impl std::str::FromStr for VectorIndexKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dense" => Ok(VectorIndexKind::Dense),
            _ => anyhow::bail!("Unsupported vector index kind: {}. Supported: dense", s),
        }
    }
}

/// Stats & Groups tunables (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_num_auto_bins")]
    pub num_auto_bins: usize,
    #[serde(default = "default_approx_distinct_sample_size")]
    pub approx_distinct_sample_size: usize,
    #[serde(default = "default_too_many_distinct_threshold")]
    pub too_many_distinct_threshold: usize,
}

fn default_num_auto_bins() -> usize {
    15
}

fn default_approx_distinct_sample_size() -> usize {
    100_000
}

fn default_too_many_distinct_threshold() -> usize {
    500
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            num_auto_bins: default_num_auto_bins(),
            approx_distinct_sample_size: default_approx_distinct_sample_size(),
            too_many_distinct_threshold: default_too_many_distinct_threshold(),
        }
    }
}

/// UDF execution tunables (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdfConfig {
    /// `rayon` thread count for batch signal execution; `0` defers to
    /// `rayon`'s own default (number of logical cores).
    #[serde(default)]
    pub worker_threads: usize,
}

impl Default for UdfConfig {
    fn default() -> Self {
        Self { worker_threads: 0 }
    }
}

/// Main runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory holding the dataset's manifests and shards (spec §4.2).
    pub dataset_root: PathBuf,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub udf: UdfConfig,

    #[serde(default = "default_vector_index_kind")]
    pub vector_index: VectorIndexKind,
}

fn default_vector_index_kind() -> VectorIndexKind {
    VectorIndexKind::Dense
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("./data"),
            stats: StatsConfig::default(),
            udf: UdfConfig::default(),
            vector_index: default_vector_index_kind(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority (env > file >
    /// defaults), then validate.
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
