//! `lilac-core`: schema & value model, columnar store, and path selector
//! for the Lilac dataset enrichment-and-query engine.

pub mod error;
pub mod schema;
pub mod selector;
pub mod store;

pub use error::{ErrorKind, LilacError, Result};
pub use schema::{Bin, DType, Field, PathSegment, PathTuple, Schema, SignalDescriptor, Value};
pub use store::{DatasetLock, DatasetView, Row};
