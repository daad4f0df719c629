use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vecmem::{HnswConfig, HnswIndex};

const DIM: usize = 384;

fn random_vectors(n: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn build(vectors: &[Vec<f32>]) -> HnswIndex {
    let mut index = HnswIndex::new(HnswConfig {
        seed: Some(1),
        ..HnswConfig::default()
    });
    for (i, v) in vectors.iter().enumerate() {
        index.insert(&i.to_string(), v.clone());
    }
    index
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw_insert");
    group.sample_size(10);
    for n in [1_000, 5_000] {
        let vectors = random_vectors(n, 7);
        group.bench_with_input(BenchmarkId::from_parameter(n), &vectors, |b, vectors| {
            b.iter(|| black_box(build(vectors)));
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let vectors = random_vectors(10_000, 7);
    let index = build(&vectors);
    let queries = random_vectors(100, 99);

    let mut group = c.benchmark_group("hnsw_search");
    for ef in [10, 50, 200] {
        group.bench_with_input(BenchmarkId::new("ef", ef), &ef, |b, &ef| {
            let mut i = 0;
            b.iter(|| {
                let query = &queries[i % queries.len()];
                i += 1;
                black_box(index.search(query, ef))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_search);
criterion_main!(benches);
