//! Handle registry benchmarks
//!
//! - resolve under a populated registry (the hot path of every command)
//! - insert of a connection subtree
//! - cascade release of a connection subtree

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rtc_bridge::{Handle, HandleRegistry, NativeObject, ObjectKind};
use std::sync::Arc;

type BenchRegistry = HandleRegistry<u64, u64, u64>;

/// Register one connection owning `streams` streams with two tracks each
fn populate_connection(registry: &BenchRegistry, streams: usize) -> (Handle, Vec<Handle>) {
    let pc = registry
        .insert(NativeObject::PeerConnection(Arc::new(0)), None)
        .unwrap();

    let mut tracks = Vec::with_capacity(streams * 2);
    for s in 0..streams {
        let stream = registry
            .insert(NativeObject::MediaStream(Arc::new(s as u64)), Some(&pc))
            .unwrap();
        for t in 0..2 {
            tracks.push(
                registry
                    .insert(NativeObject::MediaTrack(Arc::new(t)), Some(&stream))
                    .unwrap(),
            );
        }
    }
    (pc, tracks)
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_resolve");

    for connections in [1usize, 10, 100] {
        let registry = BenchRegistry::new();
        let mut tracks = Vec::new();
        for _ in 0..connections {
            tracks.extend(populate_connection(&registry, 4).1);
        }

        group.throughput(Throughput::Elements(tracks.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(connections),
            &tracks,
            |b, tracks| {
                b.iter(|| {
                    for handle in tracks {
                        black_box(registry.resolve(handle, ObjectKind::MediaTrack));
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_insert_and_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_subtree");

    for streams in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("insert_then_release_all", streams),
            &streams,
            |b, &streams| {
                let registry = BenchRegistry::new();
                b.iter(|| {
                    let (pc, _) = populate_connection(&registry, streams);
                    black_box(registry.release_all(&pc));
                })
            },
        );
    }

    group.finish();
}

fn bench_mint(c: &mut Criterion) {
    let registry = BenchRegistry::new();
    c.bench_function("registry_mint_handle", |b| {
        b.iter(|| black_box(registry.mint_handle()))
    });
}

criterion_group!(benches, bench_resolve, bench_insert_and_release, bench_mint);
criterion_main!(benches);
