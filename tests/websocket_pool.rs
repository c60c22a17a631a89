//! The pool driving real WebSocket connections against a local server.

use std::time::Duration;
use tokio::time;

use exchange_resilience::config::PoolConfig;
use exchange_resilience::{ConnectionHandle, ConnectionPool, PingProbe, PoolError, WsConnector};

mod common;

fn ws_config() -> PoolConfig {
    PoolConfig {
        size: 2,
        rotation_interval_ms: 150,
        forced_disconnect_ms: 1_000,
        grace_delay_ms: 50,
        retry_delay_ms: 50,
        probe_timeout_ms: 500,
        connect_timeout_ms: 2_000,
        shutdown_timeout_ms: 1_000,
        replenish_retired: false,
    }
}

#[tokio::test]
async fn test_pool_rotates_websocket_connections() {
    let url = common::start_echo_server().await;
    let connector = WsConnector::new(&url, Duration::from_secs(2)).unwrap();
    let pool = ConnectionPool::new(connector, PingProbe::default(), ws_config()).unwrap();

    let first = pool.get_connection().await.unwrap();
    first.send_text("tick").await.unwrap();
    let echoed = first.recv().await.unwrap().unwrap();
    assert_eq!(echoed.to_text().unwrap(), "tick");

    time::sleep(Duration::from_millis(400)).await;
    let stats = pool.get_stats();
    assert!(stats.successful_rotations >= 1, "{stats:?}");

    let current = pool.get_connection().await.unwrap();
    current.send_text("tock").await.unwrap();
    let echoed = current.recv().await.unwrap().unwrap();
    assert_eq!(echoed.to_text().unwrap(), "tock");

    pool.shutdown().await;
    assert!(first.is_closed());
    assert!(current.is_closed());
}

#[tokio::test]
async fn test_closed_socket_triggers_emergency_rotation() {
    let url = common::start_echo_server().await;
    let connector = WsConnector::new(&url, Duration::from_secs(2)).unwrap();
    let mut config = ws_config();
    config.rotation_interval_ms = 900;
    let pool = ConnectionPool::new(connector, PingProbe::default(), config).unwrap();

    let first = pool.get_connection().await.unwrap();
    first.close().await.unwrap();

    let replacement = pool.get_connection().await.unwrap();
    assert_ne!(replacement.id(), first.id());
    assert!(!replacement.is_closed());
    assert_eq!(pool.get_stats().emergency_rotations, 1);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_endpoint_exhausts_pool() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector = WsConnector::new(&format!("ws://{addr}/ws"), Duration::from_millis(500)).unwrap();
    let pool = ConnectionPool::new(connector, PingProbe::default(), ws_config()).unwrap();

    let err = pool.get_connection().await.unwrap_err();
    assert!(matches!(err, PoolError::Exhausted { .. }), "{err}");
}
