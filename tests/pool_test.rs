//! Integration tests for the bounded resource pool.
//!
//! This test validates:
//! 1. A zero wait timeout blocks until a slot is released
//! 2. A bounded wait fails with `ResourceExhausted` once it elapses
//! 3. Open slots never exceed `max_open` under contention
//! 4. A closed pool refuses new checkouts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use host_substrate::core::{Manager, PoolLimits, ResourcePool, RuntimeError};
use tokio::time::Instant;

struct Counter {
    opened: AtomicU64,
}

#[async_trait]
impl Manager for Counter {
    type Resource = u64;

    async fn connect(&self) -> Result<u64, RuntimeError> {
        Ok(self.opened.fetch_add(1, Ordering::AcqRel))
    }
}

fn pool(max_open: usize, wait: Duration) -> ResourcePool<Counter> {
    ResourcePool::new(
        Counter {
            opened: AtomicU64::new(0),
        },
        PoolLimits {
            max_open,
            max_idle: max_open,
            max_lifetime: Duration::from_secs(3600),
            wait_timeout: wait,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_zero_wait_blocks_until_release() {
    let pool = pool(1, Duration::ZERO);
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let slot = pool.acquire().await;
            (slot.map(|s| s.id()), started.elapsed())
        })
    };

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!waiter.is_finished());
    assert_eq!(pool.stats().waiting, 1);

    let held_id = held.id();
    pool.release(held);
    let (slot, waited) = waiter.await.unwrap();
    assert_eq!(slot.unwrap(), held_id);
    assert!(waited >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_bounded_wait_times_out() {
    let pool = pool(1, Duration::from_millis(250));
    let _held = pool.acquire().await.unwrap();

    let started = Instant::now();
    let result = pool.acquire().await;
    let waited = started.elapsed();

    assert!(matches!(result, Err(RuntimeError::ResourceExhausted(_))));
    assert!(waited >= Duration::from_millis(250));
    assert!(waited < Duration::from_millis(260));
    assert_eq!(pool.stats().exhausted, 1);
}

#[tokio::test]
async fn test_open_slots_bounded_under_contention() {
    let pool = pool(3, Duration::ZERO);
    let peak = Arc::new(AtomicU64::new(0));

    let mut workers = Vec::new();
    for _ in 0..24 {
        let pool = pool.clone();
        let peak = Arc::clone(&peak);
        workers.push(tokio::spawn(async move {
            let slot = pool.acquire().await.unwrap();
            peak.fetch_max(u64::try_from(pool.stats().open).unwrap(), Ordering::AcqRel);
            tokio::time::sleep(Duration::from_millis(5)).await;
            drop(slot);
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    assert!(peak.load(Ordering::Acquire) <= 3);
    let stats = pool.stats();
    assert!(stats.created <= 3);
    assert_eq!(stats.waiting, 0);
}

#[tokio::test]
async fn test_closed_pool_refuses_checkout() {
    let pool = pool(2, Duration::ZERO);
    drop(pool.acquire().await.unwrap());
    pool.close();
    assert!(matches!(pool.acquire().await, Err(RuntimeError::Unavailable(_))));
    assert_eq!(pool.stats().idle, 0);
}
