// Vector Index benchmark - measure cosine top-K search cost as the index
// grows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lilac_vector::{DenseVectorIndex, VectorIndex};

mod fixtures;
use fixtures::generate_vectors;

const DIM: usize = 32;

fn bench_top_k(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_topk");

    for n in [1_000usize, 25_000] {
        let entries = generate_vectors(n, DIM);
        let index = DenseVectorIndex::new();
        index.add(&entries).unwrap();
        let query = entries[0].1.clone();

        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::from_parameter(n), &index, |b, index| {
            b.iter(|| {
                let results = index.top_k(&query, 10, None).unwrap();
                black_box(results);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_top_k);
criterion_main!(benches);
