//! `lilac`: local operator CLI over the `Engine` facade, one subcommand per
//! §6 Query API operation (SPEC_FULL §B.4). Calls the library directly,
//! in-process — there is no HTTP layer, mirroring how `otlp2parquet-cli`
//! calls `otlp2parquet-core` directly rather than through the server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use lilac::{
    ColumnSelector, Filter, FilterOp, GroupSortBy, GroupSortDirection, RuntimeConfig, Search, SelectGroupsResult,
    SelectRowsRequest, SortDirection, SortSpec,
};
use lilac_core::schema::PathTuple;
use lilac_udf::builtins::{
    ConceptLabelsSignal, ConceptScorerSignal, SemanticSimilaritySignal, SubstringSearchSignal, TextLengthSignal,
    ToyEmbeddingSignal,
};
use lilac_udf::Signal;

#[derive(Parser)]
#[command(name = "lilac")]
#[command(version)]
#[command(about = "Dataset enrichment-and-query engine", long_about = None)]
struct Cli {
    /// Dataset directory (holds manifests and shards).
    #[arg(short, long, global = true, value_name = "DIR")]
    dataset: PathBuf,

    /// Log level: trace, debug, info, warn, error.
    #[arg(short = 'v', long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a JSON-array file as the dataset's source shard.
    Ingest {
        /// Path to a file containing a JSON array of record objects.
        input: PathBuf,
        /// Record field supplying each row's row-id (else rows are numbered).
        #[arg(long)]
        row_id_field: Option<String>,
    },
    /// Run a built-in signal over `path` and commit its output at `key`.
    ComputeSignal {
        /// Dotted path the signal reads from.
        path: String,
        /// Name the signal's output is attached under.
        key: String,
        #[command(subcommand)]
        signal: SignalArg,
    },
    /// Remove a previously committed signal's shard, manifest, and vectors.
    DeleteSignal {
        /// Enriched path the signal was computed at.
        path: String,
        /// The signal's key under that path.
        key: String,
    },
    /// Query rows.
    SelectRows {
        /// Column to project, dotted path (repeatable).
        #[arg(long = "column")]
        columns: Vec<String>,
        /// `path:op:json_value`, op one of eq,ne,lt,le,gt,ge,exists.
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// `keyword:path:query` or `semantic:path:query`.
        #[arg(long = "search")]
        searches: Vec<String>,
        /// `target:asc` or `target:desc`.
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        combine_columns: bool,
    },
    /// Count rows grouped by value (optionally binned) at a path.
    SelectGroups {
        path: String,
        #[arg(long, value_enum, default_value = "value")]
        sort_by: GroupSortByArg,
        #[arg(long, value_enum, default_value = "asc")]
        direction: DirectionArg,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Per-leaf statistics.
    Stats { path: String },
    /// Dataset name, schema, and row count.
    Manifest,
}

#[derive(Subcommand)]
enum SignalArg {
    /// Character count of the input text.
    TextLength,
    /// Every non-overlapping occurrence of `query` as a span.
    SubstringSearch { query: String },
    /// Deterministic toy text embedding.
    ToyEmbedding,
    /// Cosine similarity against a fixed query text.
    SemanticSimilarity { query: String },
    /// Distance from a concept's centroid vector (average of examples).
    ConceptScorer {
        namespace: String,
        concept_name: String,
        /// `|`-separated positive examples.
        examples: String,
    },
    /// Label derived from thresholding a concept score.
    ConceptLabels {
        namespace: String,
        concept_name: String,
        examples: String,
        threshold: f32,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum GroupSortByArg {
    Value,
    Count,
}

#[derive(Clone, clap::ValueEnum)]
enum DirectionArg {
    Asc,
    Desc,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = RuntimeConfig {
        dataset_root: cli.dataset.clone(),
        ..RuntimeConfig::load().unwrap_or_default()
    };
    let engine = lilac::Engine::open(cli.dataset, config);

    match cli.command {
        Command::Ingest { input, row_id_field } => {
            let content = std::fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
            let records: Vec<serde_json::Value> =
                serde_json::from_str(&content).context("input must be a JSON array of record objects")?;
            engine.ingest(&records, row_id_field.as_deref())?;
            println!("ingested {} rows", records.len());
        }
        Command::ComputeSignal { path, key, signal } => {
            let signal = build_signal(signal)?;
            engine.compute_signal(signal, PathTuple::parse(&path), key)?;
            println!("committed signal shard");
        }
        Command::DeleteSignal { path, key } => {
            engine.delete_signal(&PathTuple::parse(&path), &key)?;
            println!("deleted signal subtree");
        }
        Command::SelectRows {
            columns,
            filters,
            searches,
            sort,
            limit,
            offset,
            combine_columns,
        } => {
            let request = build_select_rows_request(columns, filters, searches, sort, limit, offset, combine_columns)?;
            let result = engine.select_rows(request)?;
            let rows: Vec<serde_json::Value> = result
                .rows
                .iter()
                .map(|r| serde_json::json!({"row_id": r.row_id, "columns": r.columns}))
                .collect();
            print_json(&serde_json::json!({"rows": rows, "total_matching_rows": result.total_matching_rows}))?;
        }
        Command::SelectGroups {
            path,
            sort_by,
            direction,
            limit,
        } => {
            let sort_by = match sort_by {
                GroupSortByArg::Value => GroupSortBy::Value,
                GroupSortByArg::Count => GroupSortBy::Count,
            };
            let direction = match direction {
                DirectionArg::Asc => GroupSortDirection::Asc,
                DirectionArg::Desc => GroupSortDirection::Desc,
            };
            let result = engine.select_groups(&PathTuple::parse(&path), sort_by, direction, limit)?;
            match result {
                SelectGroupsResult::Grouped(bins) => {
                    let bins: Vec<serde_json::Value> = bins
                        .iter()
                        .map(|b| serde_json::json!({"label": b.label, "start": b.start, "end": b.end, "count": b.count}))
                        .collect();
                    print_json(&serde_json::json!({"bins": bins}))?;
                }
                SelectGroupsResult::TooManyDistinct => print_json(&serde_json::json!({"too_many_distinct": true}))?,
            }
        }
        Command::Stats { path } => {
            let stats = engine.stats(&PathTuple::parse(&path))?;
            print_json(&serde_json::json!({
                "total_count": stats.total_count,
                "approx_distinct": stats.approx_distinct,
                "min": stats.min,
                "max": stats.max,
                "avg_text_length": stats.avg_text_length,
            }))?;
        }
        Command::Manifest => {
            let info = engine.manifest()?;
            print_json(&serde_json::json!({
                "dataset_name": info.dataset_name,
                "schema": info.schema,
                "num_rows": info.num_rows,
            }))?;
        }
    }

    Ok(())
}

fn build_signal(arg: SignalArg) -> Result<Arc<dyn Signal>> {
    Ok(match arg {
        SignalArg::TextLength => Arc::new(TextLengthSignal),
        SignalArg::SubstringSearch { query } => Arc::new(SubstringSearchSignal::new(query)),
        SignalArg::ToyEmbedding => Arc::new(ToyEmbeddingSignal),
        SignalArg::SemanticSimilarity { query } => Arc::new(SemanticSimilaritySignal::new(&query)),
        SignalArg::ConceptScorer {
            namespace,
            concept_name,
            examples,
        } => {
            let examples: Vec<&str> = examples.split('|').collect();
            Arc::new(ConceptScorerSignal::new(&namespace, &concept_name, &examples))
        }
        SignalArg::ConceptLabels {
            namespace,
            concept_name,
            examples,
            threshold,
        } => {
            let examples: Vec<&str> = examples.split('|').collect();
            let scorer = ConceptScorerSignal::new(&namespace, &concept_name, &examples);
            Arc::new(ConceptLabelsSignal::new(scorer, threshold))
        }
    })
}

fn build_select_rows_request(
    columns: Vec<String>,
    filters: Vec<String>,
    searches: Vec<String>,
    sort: Option<String>,
    limit: Option<usize>,
    offset: usize,
    combine_columns: bool,
) -> Result<SelectRowsRequest> {
    let columns = columns
        .into_iter()
        .map(|c| ColumnSelector::column(PathTuple::parse(&c)))
        .collect();

    let filters = filters.iter().map(|f| parse_filter(f)).collect::<Result<Vec<_>>>()?;
    let searches = searches.iter().map(|s| parse_search(s)).collect::<Result<Vec<_>>>()?;

    let sort = sort
        .map(|s| {
            let (target, direction) = s.rsplit_once(':').context("sort must be `target:asc|desc`")?;
            Ok::<_, anyhow::Error>(SortSpec {
                target: target.to_string(),
                direction: parse_direction(direction)?,
            })
        })
        .transpose()?;

    Ok(SelectRowsRequest {
        columns,
        filters,
        searches,
        sort,
        limit,
        offset,
        combine_columns,
    })
}

fn parse_filter(spec: &str) -> Result<Filter> {
    let mut parts = spec.splitn(3, ':');
    let target = parts.next().context("filter missing path")?.to_string();
    let op = parts.next().context("filter missing operator")?;
    if op == "exists" {
        return Ok(Filter::exists(target));
    }
    let value_json = parts.next().context("filter missing value")?;
    let parsed: serde_json::Value = serde_json::from_str(value_json).context("filter value must be valid JSON")?;
    let value = lilac::json_to_value(&parsed);
    let op = match op {
        "eq" => FilterOp::Eq,
        "ne" => FilterOp::Ne,
        "lt" => FilterOp::Lt,
        "le" => FilterOp::Le,
        "gt" => FilterOp::Gt,
        "ge" => FilterOp::Ge,
        other => bail!("unknown filter operator '{other}'"),
    };
    Ok(Filter::new(target, op, value))
}

fn parse_search(spec: &str) -> Result<Search> {
    let mut parts = spec.splitn(3, ':');
    let kind = parts.next().context("search missing kind")?;
    match kind {
        "keyword" => {
            let path = parts.next().context("keyword search missing path")?;
            let query = parts.next().context("keyword search missing query")?;
            Ok(Search::Keyword {
                path: PathTuple::parse(path),
                query: query.to_string(),
            })
        }
        "semantic" => {
            let path = parts.next().context("semantic search missing path")?;
            let query = parts.next().context("semantic search missing query")?;
            Ok(Search::Semantic {
                path: PathTuple::parse(path),
                signal: Arc::new(SemanticSimilaritySignal::new(query)),
            })
        }
        other => bail!("unknown search kind '{other}'; use keyword or semantic"),
    }
}

fn parse_direction(s: &str) -> Result<SortDirection> {
    match s {
        "asc" => Ok(SortDirection::Asc),
        "desc" => Ok(SortDirection::Desc),
        other => bail!("unknown sort direction '{other}'"),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing/logging (SPEC_FULL §B.1, mirroring
/// `otlp2parquet-server`'s `init_tracing`: an `EnvFilter` seeded from a CLI
/// flag rather than a server config block, text output since this is
/// always-local operator tooling, never JSON).
fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry().with(env_filter).with(fmt::layer()).try_init();
}
