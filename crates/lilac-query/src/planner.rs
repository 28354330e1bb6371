//! Query Planner (spec §4.6): lowers a [`SelectRowsRequest`] into a [`Plan`]
//! the Executor can run mechanically.

use std::collections::HashSet;

use lilac_core::error::{LilacError, Result};
use lilac_core::schema::{DType, Field, PathTuple, Schema};
use lilac_udf::SignalKind;

use crate::types::{ColumnSelector, Filter, Search, SelectRowsRequest, SortDirection, SortSpec};

pub struct ResolvedSort {
    pub target: String,
    pub direction: SortDirection,
    pub is_pre_udf: bool,
}

/// The lowered, executable form of a query (spec §4.6 planner
/// responsibilities 1-6).
pub struct Plan {
    pub columns: Vec<ColumnSelector>,
    /// Keyword searches: a case-insensitive substring condition on a
    /// physical string leaf (always pre-UDF).
    pub keyword_filters: Vec<(PathTuple, String)>,
    pub pre_filters: Vec<Filter>,
    pub post_filters: Vec<Filter>,
    pub sort: Option<ResolvedSort>,
    /// Index into `columns` of the UDF selector a vector top-K shortcut
    /// should be driven from (spec §4.6 rule 4).
    pub vector_shortcut: Option<usize>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub combine_columns: bool,
}

pub fn plan(request: SelectRowsRequest, schema: &Schema) -> Result<Plan> {
    let mut columns = request.columns;
    let mut keyword_filters = Vec::new();
    let mut default_sort: Option<SortSpec> = None;

    for (i, search) in request.searches.into_iter().enumerate() {
        match search {
            Search::Keyword { path, query } => {
                if !schema.has_path(&path) {
                    return Err(LilacError::path_not_found(&path));
                }
                keyword_filters.push((path.clone(), query.clone()));
                let signal = lilac_udf::builtins::SubstringSearchSignal::new(query);
                columns.push(ColumnSelector::udf(
                    path,
                    format!("_search_keyword_{i}"),
                    std::sync::Arc::new(signal),
                ));
            }
            Search::Semantic { path, signal } => {
                require_embedding_path(schema, &path)?;
                let alias = format!("_search_semantic_{i}");
                columns.push(ColumnSelector::udf(path, alias.clone(), signal));
                default_sort.get_or_insert(SortSpec {
                    target: alias,
                    direction: SortDirection::Desc,
                });
            }
            Search::Concept { path, scorer, labeler } => {
                require_embedding_path(schema, &path)?;
                let score_alias = format!("_search_concept_score_{i}");
                let label_alias = format!("_search_concept_label_{i}");
                columns.push(ColumnSelector::udf(path.clone(), score_alias.clone(), scorer));
                // The label UDF is a parallel sibling; it never contributes
                // a sort key (spec §4.6 rule 5, SPEC_FULL §C.5).
                columns.push(ColumnSelector::udf(path, label_alias, labeler));
                default_sort.get_or_insert(SortSpec {
                    target: score_alias,
                    direction: SortDirection::Desc,
                });
            }
        }
    }

    for selector in &columns {
        if let Some(udf) = &selector.udf {
            if udf.input_kind() == lilac_udf::InputKind::TextEmbedding {
                require_embedding_path(schema, &selector.path)?;
            }
        }
    }

    let udf_aliases: HashSet<String> = columns
        .iter()
        .filter(|c| c.udf.is_some())
        .map(|c| c.alias.clone())
        .collect();

    let mut pre_filters = Vec::new();
    let mut post_filters = Vec::new();
    for filter in request.filters {
        if udf_aliases.contains(&filter.target) {
            post_filters.push(filter);
        } else {
            let path = PathTuple::parse(&filter.target);
            if !schema.has_path(&path) {
                return Err(LilacError::InvalidFilter {
                    path: filter.target.clone(),
                    message: "references neither a known path nor a UDF alias".to_string(),
                });
            }
            pre_filters.push(filter);
        }
    }

    let sort_spec = request.sort.or(default_sort);
    let sort = match sort_spec {
        Some(s) => {
            let is_pre_udf = !udf_aliases.contains(&s.target);
            if is_pre_udf && !schema.has_path(&PathTuple::parse(&s.target)) {
                return Err(LilacError::SortKeyUnknown { path: s.target });
            }
            Some(ResolvedSort {
                target: s.target,
                direction: s.direction,
                is_pre_udf,
            })
        }
        None => None,
    };

    let vector_shortcut = sort.as_ref().and_then(|s| {
        if s.is_pre_udf || s.direction != SortDirection::Desc || request.limit.is_none() {
            return None;
        }
        columns.iter().position(|c| {
            c.alias == s.target
                && c.udf
                    .as_ref()
                    .map(|u| u.kind() == SignalKind::EmbeddingToScore)
                    .unwrap_or(false)
        })
    });

    Ok(Plan {
        columns,
        keyword_filters,
        pre_filters,
        post_filters,
        sort,
        vector_shortcut,
        limit: request.limit,
        offset: request.offset,
        combine_columns: request.combine_columns,
    })
}

fn require_embedding_path(schema: &Schema, path: &PathTuple) -> Result<()> {
    match schema.get_field(path) {
        Ok(Field::Leaf { dtype: DType::Embedding, .. }) => Ok(()),
        Ok(_) => Err(LilacError::EmbeddingNotComputed { path: path.to_string() }),
        Err(_) => Err(LilacError::EmbeddingNotComputed { path: path.to_string() }),
    }
}
