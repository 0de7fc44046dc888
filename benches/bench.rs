//! Criterion benchmarks for obspace.
//!
//! Covers the hot paths of a run:
//! - nearest-grid-point partition assignment
//! - collective vector reductions on a single worker
//! - observation file encoding and decoding

use std::hint::black_box;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use obspace::codec::{GlobalObservations, read_obs_file, write_obs_file};
use obspace::comm::SerialComm;
use obspace::geometry::{LatitudeBands, Point3, RegularLonLatGrid, to_unit_xyz};
use obspace::obs::{ColumnSet, ObsContext, ObsSpace, ObsSpaceConfig, ObsVector, TimeWindow};
use obspace::partition::{KdTree, SpatialPartitioner};
use obspace::storage::memory::{MemoryStorage, MemoryStorageConfig};

/// Random points on the sphere.
fn random_points(count: usize) -> Vec<Point3> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let lon = 360.0 * rng.random::<f64>();
            let lat = 90.0 - (1.0 - 2.0 * rng.random::<f64>()).acos().to_degrees();
            Point3::new(lon, lat, 1000.0 * rng.random::<f64>())
        })
        .collect()
}

/// Benchmark partition assignment.
fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    let grid = RegularLonLatGrid::global(180, 90).unwrap();
    let points = random_points(10_000);

    group.bench_function("kdtree_build_16200", |b| {
        b.iter_with_setup(
            || {
                (0..16_200)
                    .map(|i| to_unit_xyz((i % 180) as f64 * 2.0, (i / 180) as f64 * 2.0 - 89.0))
                    .collect::<Vec<_>>()
            },
            |xyz| black_box(KdTree::build(xyz)),
        );
    });

    let partitioner = SpatialPartitioner::new(&grid, &LatitudeBands, 8).unwrap();
    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("assign_10000_points", |b| {
        b.iter(|| black_box(partitioner.assign_all(black_box(&points)).unwrap()));
    });

    group.finish();
}

/// Benchmark vector reductions.
fn bench_vector(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector");
    group.sample_size(20);

    let storage = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
    let grid = Arc::new(RegularLonLatGrid::global(36, 18).unwrap());
    let ctx = ObsContext::new(Arc::new(SerialComm::new()), storage, grid, &LatitudeBands).unwrap();
    let config = ObsSpaceConfig::new(vec!["temperature".to_string(), "humidity".to_string()]);
    let window = TimeWindow::instant(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
    let mut space = ObsSpace::new(&config, ctx, window, false).unwrap();
    space.generate_distribution(20_000, "temperature", &[0.5, 0.1]).unwrap();

    let mut x = ObsVector::new(&space);
    x.random().unwrap();
    let y = ObsVector::from_group(&space, "ObsError").unwrap();

    group.throughput(Throughput::Elements(40_000));
    group.bench_function("dot_product", |b| {
        b.iter(|| black_box(x.dot_product_with(&y).unwrap()));
    });
    group.bench_function("rms", |b| {
        b.iter(|| black_box(x.rms().unwrap()));
    });
    group.bench_function("random", |b| {
        b.iter(|| {
            let mut v = ObsVector::new(&space);
            v.random().unwrap();
            black_box(v.size())
        });
    });

    group.finish();
}

/// Benchmark file encoding.
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    group.sample_size(20);

    let count = 10_000;
    let observations = GlobalObservations {
        times: vec![Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(); count],
        locations: random_points(count),
        order: (0..count as u64).collect(),
        groups: vec![
            ColumnSet::from_columns("ObsValue", vec![("temperature".to_string(), vec![273.15; count])])
                .unwrap(),
        ],
    };
    let file = observations.to_file().unwrap();
    let storage = MemoryStorage::new(MemoryStorageConfig::default());

    group.throughput(Throughput::Elements(count as u64));
    group.bench_function("write_10000_records", |b| {
        b.iter(|| write_obs_file(&storage, "bench.obs", black_box(&file)).unwrap());
    });
    write_obs_file(&storage, "bench.obs", &file).unwrap();
    group.bench_function("read_10000_records", |b| {
        b.iter(|| black_box(read_obs_file(&storage, "bench.obs").unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_partition, bench_vector, bench_codec);
criterion_main!(benches);
