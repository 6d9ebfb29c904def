use criterion::{criterion_group, criterion_main, Criterion};
use scenelink_core::deferred::{DeferredEnvelope, DeferredQueue, PatchKind};
use scenelink_core::session::SceneSession;
use scenelink_core::sync::{decide_incoming, IncomingContext};
use scenelink_core::version::RemoteVersion;
use serde_json::json;
use std::hint::black_box;

const LIMIT: usize = 120;

fn envelope(sequence: i64) -> DeferredEnvelope {
    DeferredEnvelope::new(
        PatchKind::ScenePatch,
        json!({ "sequence": sequence, "patch": { "upserts": [] } }),
        0,
        RemoteVersion::with_sequence(sequence),
    )
}

fn full_queue() -> DeferredQueue {
    (0..LIMIT as i64).fold(DeferredQueue::new(), |queue, sequence| queue.pushed(envelope(sequence), LIMIT))
}

fn bench_decide_incoming(c: &mut Criterion) {
    let queue = full_queue();
    let incoming = envelope(LIMIT as i64 + 1);

    c.bench_function("decide_incoming_apply_now_120", |b| {
        b.iter(|| {
            let context = IncomingContext {
                applied_version: RemoteVersion::with_sequence(0),
                deferred_queue: &queue,
                deferred_queue_limit: LIMIT,
                has_local_edits: false,
                hold_enabled: false,
            };
            black_box(decide_incoming(black_box(context), incoming.clone()));
        })
    });

    c.bench_function("decide_incoming_stale_120", |b| {
        b.iter(|| {
            let context = IncomingContext {
                applied_version: RemoteVersion::with_sequence(500),
                deferred_queue: &queue,
                deferred_queue_limit: LIMIT,
                has_local_edits: true,
                hold_enabled: true,
            };
            black_box(decide_incoming(black_box(context), incoming.clone()));
        })
    });
}

fn bench_deferred_push(c: &mut Criterion) {
    let queue = full_queue();
    let incoming = envelope(LIMIT as i64 + 1);

    c.bench_function("deferred_push_at_capacity_120", |b| {
        b.iter(|| {
            black_box(queue.pushed(black_box(incoming.clone()), LIMIT));
        })
    });
}

fn bench_apply_remote_snapshot(c: &mut Criterion) {
    let placements: Vec<_> = (0..50)
        .map(|n| json!({ "id": format!("p-{n}"), "assetId": "chair", "positionM": [n as f64, 0.0] }))
        .collect();

    c.bench_function("apply_remote_snapshot_50", |b| {
        let mut session = SceneSession::default();
        let mut sequence = 0;
        b.iter(|| {
            sequence += 1;
            let message = json!({ "sequence": sequence, "scene": { "placements": placements } });
            black_box(session.apply_remote(PatchKind::SceneSnapshot, &message));
        })
    });
}

criterion_group!(
    benches,
    bench_decide_incoming,
    bench_deferred_push,
    bench_apply_remote_snapshot,
);
criterion_main!(benches);
