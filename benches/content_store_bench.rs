// Content id assignment benchmarks

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use repomine::store::{Compactor, ContentStore};
use std::hint::black_box;
use tempfile::TempDir;

fn generate_blobs(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("export const value{} = {};\n", i, i * 7).into_bytes())
        .collect()
}

fn open_store(dir: &TempDir) -> ContentStore {
    ContentStore::open(
        &dir.path().join("files"),
        &dir.path().join("content_hashes.csv"),
        1000,
        false,
        Compactor::disabled(),
    )
    .unwrap()
}

fn bench_assign_misses(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_assign_new");
    group.sample_size(10);
    for size in [100, 1_000] {
        let blobs = generate_blobs(size);

        group.bench_with_input(BenchmarkId::new("blobs", size), &blobs, |b, blobs| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let store = open_store(&dir);
                for blob in blobs {
                    black_box(store.assign_bytes(blob).unwrap());
                }
                store.finalize().unwrap();
            });
        });
    }
    group.finish();
}

fn bench_assign_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_assign_known");
    for size in [1_000, 10_000] {
        let blobs = generate_blobs(size);
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for blob in &blobs {
            store.assign_bytes(blob).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("blobs", size), &blobs, |b, blobs| {
            b.iter(|| {
                for blob in blobs {
                    black_box(store.assign_bytes(blob).unwrap());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_assign_misses, bench_assign_hits);
criterion_main!(benches);
