//! Benchmarks for workflow execution and artifact handling.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use forgeflow::agents::AgentRegistry;
use forgeflow::core::{ArtifactKind, Payload, StageKind};
use forgeflow::session::RunSession;
use forgeflow::stages::parse_file_sections;
use forgeflow::store::ArtifactStore;
use forgeflow::testing::{fixtures, ScriptedAgent};

fn workflow_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    c.bench_function("scripted_run", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let agents = AgentRegistry::uniform(Arc::new(ScriptedAgent::new()));
                let session = RunSession::new(fixtures::calculator_request(), agents).unwrap();
                black_box(session.run().await)
            })
        });
    });
}

fn store_benchmark(c: &mut Criterion) {
    c.bench_function("store_put_latest", |b| {
        b.iter(|| {
            let store = ArtifactStore::new();
            for i in 0..64 {
                store.put(
                    StageKind::Implementation,
                    ArtifactKind::SourceFiles,
                    Payload::text(format!("revision {i}")),
                );
            }
            black_box(store.latest_of_kind(ArtifactKind::SourceFiles))
        });
    });
}

fn parse_benchmark(c: &mut Criterion) {
    c.bench_function("parse_file_sections", |b| {
        b.iter(|| black_box(parse_file_sections(black_box(fixtures::IMPLEMENTATION))));
    });
}

criterion_group!(benches, workflow_benchmark, store_benchmark, parse_benchmark);
criterion_main!(benches);
