//! Error taxonomy shared across the Lilac engine crates.
//!
//! Every variant carries a stable `kind()` tag plus enough identifying
//! context (a path, a signal name, a dataset directory) that a caller can
//! act on the failure without parsing the message text.

use crate::schema::PathTuple;
use thiserror::Error;

/// Stable, API-facing error kind tag. Do not reorder or rename variants;
/// callers match on `kind()` programmatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PathNotFound,
    NotALeaf,
    DtypeConflict,
    DtypeUnsupportedForSignal,
    EmbeddingNotComputed,
    SignalDependencyMissing,
    InvalidFilter,
    SortKeyUnknown,
    UnknownSearchKind,
    UdfContractViolation,
    VectorIndexMissing,
    Cancelled,
    ManifestCorrupt,
    ShardMissing,
    CommitConflict,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PathNotFound => "PathNotFound",
            Self::NotALeaf => "NotALeaf",
            Self::DtypeConflict => "DtypeConflict",
            Self::DtypeUnsupportedForSignal => "DtypeUnsupportedForSignal",
            Self::EmbeddingNotComputed => "EmbeddingNotComputed",
            Self::SignalDependencyMissing => "SignalDependencyMissing",
            Self::InvalidFilter => "InvalidFilter",
            Self::SortKeyUnknown => "SortKeyUnknown",
            Self::UnknownSearchKind => "UnknownSearchKind",
            Self::UdfContractViolation => "UdfContractViolation",
            Self::VectorIndexMissing => "VectorIndexMissing",
            Self::Cancelled => "Cancelled",
            Self::ManifestCorrupt => "ManifestCorrupt",
            Self::ShardMissing => "ShardMissing",
            Self::CommitConflict => "CommitConflict",
        }
    }
}

/// The engine's single error type. Library code returns this; binary/CLI
/// code is free to wrap it in `anyhow::Error` at the boundary.
#[derive(Debug, Error)]
pub enum LilacError {
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    #[error("path is not a leaf: {path}")]
    NotALeaf { path: String },

    #[error("dtype conflict at {path}: {left:?} vs {right:?}")]
    DtypeConflict {
        path: String,
        left: crate::schema::DType,
        right: crate::schema::DType,
    },

    #[error("signal does not support dtype {dtype:?} at {path}")]
    DtypeUnsupportedForSignal {
        path: String,
        dtype: crate::schema::DType,
    },

    #[error("embedding not computed at {path}; run compute_signal first")]
    EmbeddingNotComputed { path: String },

    #[error("signal dependency missing: {signal} requires {dependency}")]
    SignalDependencyMissing { signal: String, dependency: String },

    #[error("invalid filter on {path}: {message}")]
    InvalidFilter { path: String, message: String },

    #[error("sort key unknown: {path}")]
    SortKeyUnknown { path: String },

    #[error("unknown search kind: {kind}")]
    UnknownSearchKind { kind: String },

    #[error("UDF '{signal}' violated its output contract: expected {expected} outputs, got {actual}")]
    UdfContractViolation {
        signal: String,
        expected: usize,
        actual: usize,
    },

    #[error("vector index missing for {path}")]
    VectorIndexMissing { path: String },

    #[error("query cancelled")]
    Cancelled,

    #[error("manifest corrupt at {location}: {reason}")]
    ManifestCorrupt { location: String, reason: String },

    #[error("shard missing: {location}")]
    ShardMissing { location: String },

    #[error("commit conflict for {path}: {reason}")]
    CommitConflict { path: String, reason: String },

    #[error("io error at {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("(de)serialization error at {location}: {source}")]
    Serde {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("parquet error at {location}: {source}")]
    Parquet {
        location: String,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error("arrow error at {location}: {source}")]
    Arrow {
        location: String,
        #[source]
        source: arrow::error::ArrowError,
    },
}

impl LilacError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PathNotFound { .. } => ErrorKind::PathNotFound,
            Self::NotALeaf { .. } => ErrorKind::NotALeaf,
            Self::DtypeConflict { .. } => ErrorKind::DtypeConflict,
            Self::DtypeUnsupportedForSignal { .. } => ErrorKind::DtypeUnsupportedForSignal,
            Self::EmbeddingNotComputed { .. } => ErrorKind::EmbeddingNotComputed,
            Self::SignalDependencyMissing { .. } => ErrorKind::SignalDependencyMissing,
            Self::InvalidFilter { .. } => ErrorKind::InvalidFilter,
            Self::SortKeyUnknown { .. } => ErrorKind::SortKeyUnknown,
            Self::UnknownSearchKind { .. } => ErrorKind::UnknownSearchKind,
            Self::UdfContractViolation { .. } => ErrorKind::UdfContractViolation,
            Self::VectorIndexMissing { .. } => ErrorKind::VectorIndexMissing,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ManifestCorrupt { .. } => ErrorKind::ManifestCorrupt,
            Self::ShardMissing { .. } => ErrorKind::ShardMissing,
            Self::CommitConflict { .. } => ErrorKind::CommitConflict,
            // I/O and codec failures surface as storage-layer kinds; callers
            // that need finer detail match on the variant itself.
            Self::Io { .. } | Self::Serde { .. } => ErrorKind::ManifestCorrupt,
            Self::Parquet { .. } | Self::Arrow { .. } => ErrorKind::ShardMissing,
        }
    }

    pub fn path_not_found(path: &PathTuple) -> Self {
        Self::PathNotFound {
            path: path.to_string(),
        }
    }

    pub fn not_a_leaf(path: &PathTuple) -> Self {
        Self::NotALeaf {
            path: path.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LilacError>;
