//! Benchmarks canonical serialization and hashing of a config snapshot --
//! the hot path on every `/config/poll` request, since a cluster's version
//! is recomputed from its current rows on every poll rather than cached.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use marchproxy::distributor::canonical::{canonical_bytes, version};
use marchproxy::domain::cluster::LoggingConfig;
use marchproxy::domain::service::Transport;
use marchproxy::domain::{ClusterId, Mapping, Service};

fn fixture(service_count: usize, mapping_count: usize) -> (LoggingConfig, Vec<Service>, Vec<Mapping>) {
    let cluster = ClusterId::new();

    let services: Vec<Service> = (0..service_count)
        .map(|i| Service::new(cluster.clone(), format!("service-{i}"), "10.0.0.1", 8080 + i as i32, Transport::Tcp))
        .collect();

    let mappings: Vec<Mapping> =
        (0..mapping_count).map(|i| Mapping::new(cluster.clone(), format!("mapping-{i}"), i as i32)).collect();

    (LoggingConfig::default(), services, mappings)
}

fn bench_canonical_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonical_bytes");
    for &size in &[10usize, 100, 1000] {
        let (logging, services, mappings) = fixture(size, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| canonical_bytes(&logging, &services, &mappings, &[]));
        });
    }
    group.finish();
}

fn bench_version(c: &mut Criterion) {
    let mut group = c.benchmark_group("version");
    for &size in &[10usize, 100, 1000] {
        let (logging, services, mappings) = fixture(size, size);
        let bytes = canonical_bytes(&logging, &services, &mappings, &[]);
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| version(bytes));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_canonical_bytes, bench_version);
criterion_main!(benches);
