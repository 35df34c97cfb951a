//! Criterion benchmarks for the per-step decision path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use loopwarden::adapters::HashedBagOfWordsEmbedder;
use loopwarden::{CheckRequest, GuardConfig, GuardEngine};

fn step(i: u64) -> CheckRequest {
    CheckRequest::new(json!({
        "page": i % 7,
        "cart": ["sku-1", "sku-2"],
        "updated_at": "2024-05-01T10:00:00Z",
        "request_id": i,
    }))
    .with_thought("look for the product")
    .with_action("search", json!({ "query": format!("red shoes {}", i % 5), "limit": 20 }))
    .with_actor(if i % 2 == 0 { "planner" } else { "executor" })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

fn bench_check(c: &mut Criterion, name: &str, engine: GuardEngine) {
    let rt = runtime();
    let engine = Arc::new(engine);
    let counter = AtomicU64::new(0);
    // Fill the window so every iteration runs against a full ledger.
    rt.block_on(async {
        for i in 0..64 {
            engine.check("bench", step(i)).await.expect("warmup");
        }
    });

    let engine = &engine;
    let counter = &counter;
    c.bench_function(name, |b| {
        b.to_async(&rt).iter(move || async move {
            let i = counter.fetch_add(1, Ordering::Relaxed);
            black_box(engine.check("bench", black_box(step(i))).await)
        });
    });
}

fn bench_check_without_capabilities(c: &mut Criterion) {
    let engine = GuardEngine::new(GuardConfig::default()).expect("engine");
    bench_check(c, "check_full_window", engine);
}

fn bench_check_with_hashed_embedder(c: &mut Criterion) {
    let engine = GuardEngine::builder(GuardConfig::default())
        .embedder(Arc::new(HashedBagOfWordsEmbedder::new(256).expect("embedder")))
        .build()
        .expect("engine");
    bench_check(c, "check_full_window_embedded", engine);
}

criterion_group!(
    benches,
    bench_check_without_capabilities,
    bench_check_with_hashed_embedder
);
criterion_main!(benches);
