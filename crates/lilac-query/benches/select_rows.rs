// Query planner/executor benchmark - measure filter+sort+paginate over a
// joined view.
//
// Isolates plan + execute from manifest discovery and shard I/O, which have
// their own cost profile (disk, not CPU).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lilac_core::schema::{PathTuple, Value};
use lilac_query::{plan, execute, ColumnSelector, Filter, FilterOp, SelectRowsRequest, SortDirection, SortSpec};
use lilac_vector::DenseVectorIndex;

mod fixtures;
use fixtures::{generate_view, WorkloadSize};

fn bench_filter_sort_paginate(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_rows");
    let index = DenseVectorIndex::new();

    for size in [WorkloadSize::Small, WorkloadSize::Medium] {
        let view = generate_view(size);
        let row_count = size.row_count();

        group.throughput(Throughput::Elements(row_count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(format!("{size:?}")), &view, |b, view| {
            b.iter(|| {
                let request = SelectRowsRequest {
                    columns: vec![ColumnSelector::column(PathTuple::parse("text"))],
                    filters: vec![Filter::new("int", FilterOp::Gt, Value::Int(500))],
                    sort: Some(SortSpec {
                        target: "int".to_string(),
                        direction: SortDirection::Desc,
                    }),
                    limit: Some(50),
                    ..Default::default()
                };
                let plan = plan(request, &view.schema).unwrap();
                let result = execute(view, &plan, &index).unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_filter_sort_paginate);
criterion_main!(benches);
