//! Gatekeeper Cache Benchmarks
//!
//! Hot-path lookups against a populated cache, plus the periodic sweep.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gk_cache::{AttributeRequest, CacheConfig, FlowRequest, GatekeeperCache, RequestKind};
use gk_common::{FlowDirection, FlowKey, MacAddr, ManualClock, Timestamp};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

fn device(i: u32) -> MacAddr {
    let b = i.to_be_bytes();
    MacAddr::new([0x02, 0, b[0], b[1], b[2], b[3]])
}

fn populate(cache: &mut GatekeeperCache, devices: u32, per_device: u32) {
    for d in 0..devices {
        for i in 0..per_device {
            let req = AttributeRequest::new(Some(device(d)), RequestKind::Fqdn, format!("host{i}.example.com"));
            let _ = cache.add_attribute(&req);
        }
    }
}

fn bench_attribute_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("attribute_lookup");
    group.throughput(Throughput::Elements(1));

    for per_device in [100u32, 1_000, 10_000] {
        let mut cache = GatekeeperCache::new(CacheConfig::default());
        populate(&mut cache, 8, per_device);

        let hit = AttributeRequest::new(Some(device(3)), RequestKind::Sni, format!("host{}.example.com", per_device / 2));
        let miss = AttributeRequest::new(Some(device(3)), RequestKind::Sni, "absent.example.com");

        group.bench_with_input(BenchmarkId::new("hit", per_device), &hit, |b, req| {
            b.iter(|| black_box(cache.lookup_attribute(black_box(req), true)))
        });
        group.bench_with_input(BenchmarkId::new("miss", per_device), &miss, |b, req| {
            b.iter(|| black_box(cache.lookup_attribute(black_box(req), true)))
        });
    }
    group.finish();
}

fn bench_flow_lookup(c: &mut Criterion) {
    let mut cache = GatekeeperCache::new(CacheConfig::default());
    for i in 0..10_000u32 {
        let b = i.to_be_bytes();
        let key = FlowKey::from_v4(
            Ipv4Addr::new(10, b[1], b[2], b[3]),
            Ipv4Addr::new(8, 8, 8, 8),
            40_000,
            443,
            6,
            FlowDirection::Outbound,
        );
        let _ = cache.add_flow(&FlowRequest::new(device(0), key));
    }

    let key = FlowKey::from_v4(
        Ipv4Addr::new(10, 0, 19, 136),
        Ipv4Addr::new(8, 8, 8, 8),
        40_000,
        443,
        6,
        FlowDirection::Outbound,
    );
    let req = FlowRequest::new(device(0), key);

    c.bench_function("flow_lookup_hit", |b| {
        b.iter(|| black_box(cache.lookup_flow(black_box(&req), true)))
    });
}

fn bench_sweep(c: &mut Criterion) {
    c.bench_function("sweep_expired_50k", |b| {
        b.iter_batched(
            || {
                let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1)));
                let mut cache = GatekeeperCache::with_clock(CacheConfig::default(), clock.clone());
                populate(&mut cache, 50, 1_000);
                clock.advance(Duration::from_secs(3_600));
                cache
            },
            |mut cache| black_box(cache.sweep_expired()),
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_attribute_lookup, bench_flow_lookup, bench_sweep);
criterion_main!(benches);
