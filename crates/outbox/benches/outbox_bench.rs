use criterion::{Criterion, criterion_group, criterion_main};
use messaging::InMemoryBroker;
use outbox::{InMemoryOutboxStore, OutboxEvent, OutboxPublisher, OutboxStore, PublisherConfig};

fn make_event(n: usize) -> OutboxEvent {
    OutboxEvent::new(
        "User",
        format!("user-{n}"),
        "user.created.v2",
        serde_json::json!({
            "saga_id": "00000000-0000-0000-0000-000000000001",
            "user_id": format!("user-{n}"),
            "role": "STAFF"
        }),
    )
}

fn bench_insert_single_row(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("outbox/insert_single_row", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryOutboxStore::new();
                store.insert(make_event(0)).await.unwrap();
            });
        });
    });
}

fn bench_drain_batch_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("outbox/drain_batch_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryOutboxStore::new();
                for n in 0..100 {
                    store.insert(make_event(n)).await.unwrap();
                }

                let publisher = OutboxPublisher::new(
                    store,
                    InMemoryBroker::new(),
                    PublisherConfig::default(),
                );
                publisher.drain_once().await.unwrap();
            });
        });
    });
}

fn bench_fetch_unpublished_from_backlog(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryOutboxStore::new();

    // Pre-populate a backlog larger than one batch
    rt.block_on(async {
        for n in 0..1000 {
            store.insert(make_event(n)).await.unwrap();
        }
    });

    c.bench_function("outbox/fetch_unpublished_from_backlog", |b| {
        b.iter(|| {
            rt.block_on(async {
                let batch = store.fetch_unpublished(100).await.unwrap();
                assert_eq!(batch.len(), 100);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_insert_single_row,
    bench_drain_batch_100,
    bench_fetch_unpublished_from_backlog
);
criterion_main!(benches);
