//! Benchmarks for block copies and carve packaging.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_carver::carver::{BlockCopier, Packager};
use rust_carver::config::{CarverConfig, CompressionKind};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Cursor};
use tempfile::TempDir;

/// Benchmark block copies of a 4MB buffer at different block sizes
fn bench_block_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_copy");
    let data = vec![0x5Au8; 4 * 1024 * 1024];

    for block_size in [512usize, 4096, 8192, 65536] {
        let copier = BlockCopier::new(block_size).unwrap();
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(block_size), &data, |b, data| {
            b.iter(|| {
                let mut src = Cursor::new(data.as_slice());
                copier
                    .copy(&mut src, data.len() as u64, &mut io::sink())
                    .unwrap();
                black_box(&src);
            });
        });
    }

    group.finish();
}

/// Benchmark packaging of a staged set with and without gzip
fn bench_packaging(c: &mut Criterion) {
    let mut group = c.benchmark_group("packaging");
    let staging = TempDir::new().unwrap();
    let file_count = 50;
    let file_size = 64 * 1024;

    let mut staged = BTreeSet::new();
    for i in 0..file_count {
        let path = staging.path().join(format!("file_{}.log", i));
        let data: Vec<u8> = (0..file_size).map(|j| ((i + j) % 97) as u8).collect();
        fs::write(&path, data).unwrap();
        staged.insert(path);
    }

    for (label, compression) in [("gzip", CompressionKind::Gzip), ("none", CompressionKind::None)] {
        let config = CarverConfig {
            compression,
            ..CarverConfig::default()
        };
        let packager = Packager::new("bench", &config);

        group.throughput(Throughput::Bytes((file_count * file_size) as u64));
        group.bench_function(label, |b| {
            b.iter(|| {
                let outcome = packager.package(staging.path(), &staged).unwrap();
                fs::remove_file(&outcome.archive_path).ok();
                fs::remove_file(&outcome.compressed_path).ok();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_block_sizes, bench_packaging);
criterion_main!(benches);
