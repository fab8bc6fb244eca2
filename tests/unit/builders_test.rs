//! Tests for builder modules

use host_substrate::builders::{build_client, build_store_pool};
use host_substrate::config::PoolConfig;
use host_substrate::core::{PoolInit, RuntimeError};

async fn dead_addr() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().to_string()
}

#[tokio::test]
async fn test_store_pool_unavailable() {
    let addr = dead_addr().await;
    match build_store_pool(&addr, &PoolConfig::default()).await.unwrap() {
        PoolInit::Unavailable { reason } => assert!(!reason.is_empty()),
        PoolInit::Ready(_) => panic!("nothing listens on {addr}"),
    }
}

#[tokio::test]
async fn test_client_absent_when_store_unreachable() {
    let addr = dead_addr().await;
    assert!(build_client(&addr, &PoolConfig::default()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_pool_config_is_error() {
    let cfg = PoolConfig {
        max_open: 0,
        ..PoolConfig::default()
    };
    assert!(matches!(
        build_store_pool("127.0.0.1:1", &cfg).await,
        Err(RuntimeError::InvalidConfig(_))
    ));
}
