//! Tests for the process supervisor

use std::sync::Arc;

use host_substrate::client::CoordinationClient;
use host_substrate::config::{StoreConfig, SupervisorConfig};
use host_substrate::core::RuntimeError;
use host_substrate::scheduler::epoch_key;
use host_substrate::store::spawn_store;
use host_substrate::supervisor::Supervisor;

#[tokio::test(start_paused = true)]
async fn test_each_generation_takes_a_new_epoch() {
    let client = CoordinationClient::local(spawn_store(&StoreConfig::default()).unwrap());
    let epochs = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let supervisor = Supervisor::new(
        "scheduler",
        SupervisorConfig {
            max_restarts: Some(5),
            restart_delay_ms: 100,
        },
    );

    let seen = Arc::clone(&epochs);
    let report = supervisor
        .run(move |generation| {
            let client = client.clone();
            let seen = Arc::clone(&seen);
            async move {
                let epoch = client.incr(&epoch_key("prod", "node-a")).await?;
                seen.lock().push(epoch);
                if generation < 2 {
                    return Err(RuntimeError::Fatal("store connection lost".into()));
                }
                Ok(())
            }
        })
        .await
        .unwrap();

    assert_eq!(report.restarts, 2);
    assert_eq!(*epochs.lock(), vec![1, 2, 3]);
}
