//! Query Planner input shapes (spec §4.6): column selectors, filters,
//! searches, sort, and pagination.

use std::collections::BTreeMap;
use std::sync::Arc;

use lilac_core::schema::{PathTuple, Value};
use lilac_udf::Signal;

/// A requested output column: a path, optionally aliased, optionally with a
/// UDF attached (the UDF's input is the path's resolved value).
#[derive(Clone)]
pub struct ColumnSelector {
    pub path: PathTuple,
    pub alias: String,
    pub udf: Option<Arc<dyn Signal>>,
}

impl ColumnSelector {
    pub fn column(path: PathTuple) -> Self {
        let alias = path.to_string();
        Self {
            path,
            alias,
            udf: None,
        }
    }

    pub fn udf(path: PathTuple, alias: impl Into<String>, signal: Arc<dyn Signal>) -> Self {
        Self {
            path,
            alias: alias.into(),
            udf: Some(signal),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Exists,
}

/// A filter targets a path or a column selector's alias; the planner
/// decides which (spec §4.6 rule 2).
#[derive(Clone)]
pub struct Filter {
    pub target: String,
    pub op: FilterOp,
    pub value: Option<Value>,
    pub values: Option<Vec<Value>>,
}

impl Filter {
    pub fn new(target: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            target: target.into(),
            op,
            value: Some(value),
            values: None,
        }
    }

    pub fn exists(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            op: FilterOp::Exists,
            value: None,
            values: None,
        }
    }

    pub fn in_list(target: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            op: FilterOp::In,
            value: None,
            values: Some(values),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone)]
pub struct SortSpec {
    pub target: String,
    pub direction: SortDirection,
}

/// A search request (spec §4.6 rule 5); the planner lowers each into one or
/// more synthesized UDF columns plus, for keyword search, a pre-UDF filter.
#[derive(Clone)]
pub enum Search {
    Keyword {
        path: PathTuple,
        query: String,
    },
    Semantic {
        path: PathTuple,
        signal: Arc<dyn Signal>,
    },
    Concept {
        path: PathTuple,
        scorer: Arc<dyn Signal>,
        labeler: Arc<dyn Signal>,
    },
}

pub struct SelectRowsRequest {
    pub columns: Vec<ColumnSelector>,
    pub filters: Vec<Filter>,
    pub searches: Vec<Search>,
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub combine_columns: bool,
}

impl Default for SelectRowsRequest {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            filters: Vec::new(),
            searches: Vec::new(),
            sort: None,
            limit: None,
            offset: 0,
            combine_columns: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultRow {
    pub row_id: String,
    pub columns: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct SelectRowsResult {
    pub rows: Vec<ResultRow>,
    pub total_matching_rows: usize,
}
