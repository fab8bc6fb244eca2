//! Tests for tokio spawner utilities

use host_substrate::runtime::{Spawn, TokioSpawner};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_current_spawner_can_abort() {
    let spawner = TokioSpawner::current();
    let handle = spawner.spawn(std::future::pending());
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
}
