//! Integration tests for the coordination store.
//!
//! This test validates:
//! 1. Commands over TCP behave like in-process commands
//! 2. Malformed frames get a protocol error reply and the connection closes
//! 3. A snapshot reproduces every value shape after a restart
//! 4. Append-only logs land in day-partitioned files

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::BytesMut;
use host_substrate::client::{CoordinationClient, StoreConnection};
use host_substrate::config::{PoolConfig, StoreConfig};
use host_substrate::core::{PoolInit, RuntimeError};
use host_substrate::store::{decode, decode_command, spawn_store, Reply, StoreServer};
use host_substrate::builders::build_store_pool;
use host_substrate::util::day_partition;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

fn store_config() -> StoreConfig {
    StoreConfig {
        bind_addr: "127.0.0.1:0".into(),
        ..StoreConfig::default()
    }
}

async fn start_server(config: StoreConfig) -> (String, oneshot::Sender<()>) {
    let server = StoreServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(server.serve(async {
        let _ = stop_rx.await;
    }));
    (addr, stop_tx)
}

#[tokio::test]
async fn test_commands_over_tcp() {
    let (addr, _stop) = start_server(store_config()).await;
    let mut conn = StoreConnection::connect(&addr).await.unwrap();

    assert_eq!(conn.call(&["PING"]).await.unwrap(), Reply::Status("PONG".into()));
    assert_eq!(conn.call(&["set", "k", "v"]).await.unwrap(), Reply::ok());
    assert_eq!(conn.call(&["GET", "k"]).await.unwrap(), Reply::Bulk("v".into()));
    assert_eq!(conn.call(&["RPUSH", "l", "a"]).await.unwrap(), Reply::Integer(1));
    assert_eq!(
        conn.call(&["LRANGE", "l", "0", "-1"]).await.unwrap(),
        Reply::Array(vec![Reply::Bulk("a".into())])
    );
    assert!(matches!(
        conn.call(&["NOPE"]).await.unwrap(),
        Reply::Error(msg) if msg.contains("unknown command")
    ));
    assert!(!conn.is_broken());
}

#[tokio::test]
async fn test_pooled_client_over_tcp() {
    let (addr, _stop) = start_server(store_config()).await;
    let pool = match build_store_pool(&addr, &PoolConfig::default()).await.unwrap() {
        PoolInit::Ready(pool) => pool,
        PoolInit::Unavailable { reason } => panic!("store unreachable: {reason}"),
    };
    let client = CoordinationClient::remote(pool.clone());

    let mut tasks = Vec::new();
    for i in 0..20 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move { client.incr(&format!("c{}", i % 4)).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(client.get("c0").await.unwrap().as_deref(), Some("5"));
    assert!(pool.stats().open <= PoolConfig::default().max_open);
}

/// A server that answers every command with `:1`, whatever was asked.
async fn start_integer_only_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = BytesMut::new();
                while stream.read_buf(&mut buf).await.is_ok_and(|n| n > 0) {
                    while let Ok(Some(_)) = decode_command(&mut buf) {
                        if stream.write_all(b":1\r\n").await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_mismatched_reply_evicts_pooled_connection() {
    let addr = start_integer_only_server().await;
    let pool = match build_store_pool(&addr, &PoolConfig::default()).await.unwrap() {
        PoolInit::Ready(pool) => pool,
        PoolInit::Unavailable { reason } => panic!("server unreachable: {reason}"),
    };
    let client = CoordinationClient::remote(pool.clone());
    assert_eq!(pool.stats().created, 1);

    assert!(matches!(client.get("k").await, Err(RuntimeError::Protocol(_))));
    let stats = pool.stats();
    assert_eq!(stats.open, 0);
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.evicted, 1);

    // The next call cannot reuse the out-of-step connection.
    assert!(matches!(client.ping().await, Err(RuntimeError::Protocol(_))));
    assert_eq!(pool.stats().created, 2);

    // A reply of the expected shape keeps its connection pooled.
    assert_eq!(client.incr("n").await.unwrap(), 1);
    assert_eq!(pool.stats().idle, 1);
}

#[tokio::test]
async fn test_malformed_frame_gets_protocol_error_and_close() {
    let (addr, _stop) = start_server(store_config()).await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream.write_all(b"?garbage\r\n").await.unwrap();

    let mut buf = BytesMut::new();
    loop {
        if stream.read_buf(&mut buf).await.unwrap() == 0 {
            break;
        }
    }
    match decode(&mut buf).unwrap() {
        Some(Reply::Error(msg)) => assert!(msg.contains("Protocol error"), "{msg}"),
        other => panic!("expected protocol error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_store_is_unavailable_sentinel() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let init = build_store_pool(&addr, &PoolConfig::default()).await.unwrap();
    assert!(!init.is_available());
}

#[tokio::test]
async fn test_snapshot_round_trip_every_shape() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        snapshot_path: Some(dir.path().join("store.json")),
        ..store_config()
    };

    {
        let client = CoordinationClient::local(spawn_store(&config).unwrap());
        client.set("scalar", "value").await.unwrap();
        client.rpush("list", "a").await.unwrap();
        client.rpush("list", "b").await.unwrap();
        client.sadd("set", "x").await.unwrap();
        client.sadd("set", "y").await.unwrap();
        client.hset("hash", &[("f1", "1"), ("f2", "2")]).await.unwrap();
        client.set_ex("ttl", "soon", 3600).await.unwrap();
        client.save().await.unwrap();
    }

    let client = CoordinationClient::local(spawn_store(&config).unwrap());
    assert_eq!(client.get("scalar").await.unwrap().as_deref(), Some("value"));
    assert_eq!(client.lrange("list", 0, -1).await.unwrap(), vec!["a", "b"]);
    assert_eq!(client.smembers("set").await.unwrap(), vec!["x", "y"]);
    let expected: BTreeMap<String, String> =
        [("f1", "1"), ("f2", "2")].iter().map(|(k, v)| ((*k).into(), (*v).into())).collect();
    assert_eq!(client.hgetall("hash").await.unwrap(), expected);
    let ttl = client.ttl("ttl").await.unwrap();
    assert!(ttl > 3500 && ttl <= 3600, "ttl {ttl}");
}

#[tokio::test]
async fn test_missing_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        snapshot_path: Some(dir.path().join("absent.json")),
        ..store_config()
    };
    let client = CoordinationClient::local(spawn_store(&config).unwrap());
    assert!(!client.exists("anything").await.unwrap());
}

#[tokio::test]
async fn test_final_snapshot_when_last_handle_drops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let config = StoreConfig {
        snapshot_path: Some(path.clone()),
        ..store_config()
    };

    let handle = spawn_store(&config).unwrap();
    CoordinationClient::local(handle.clone()).set("k", "v").await.unwrap();
    drop(handle);

    for _ in 0..50 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let client = CoordinationClient::local(spawn_store(&config).unwrap());
    assert_eq!(client.get("k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn test_append_logs_are_day_partitioned() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        log_dir: Some(dir.path().to_path_buf()),
        ..store_config()
    };
    let client = CoordinationClient::local(spawn_store(&config).unwrap());

    assert_eq!(client.append_log("audit", "first").await.unwrap(), 1);
    assert_eq!(client.append_log("audit", "second").await.unwrap(), 2);
    assert_eq!(client.count_log("audit", None).await.unwrap(), 2);

    let today = day_partition();
    assert_eq!(
        client.read_log("audit", &today, 0, 10).await.unwrap(),
        vec!["first", "second"]
    );
    assert!(dir.path().join("audit").join(format!("{today}.log")).exists());
    assert!(client.exists("audit").await.is_ok_and(|found| !found));
}

#[tokio::test]
async fn test_logs_disabled_is_backend_error() {
    let client = CoordinationClient::local(spawn_store(&store_config()).unwrap());
    assert!(matches!(
        client.append_log("audit", "x").await,
        Err(RuntimeError::Backend(_))
    ));
}
