//! Shared utilities for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use exchange_resilience::config::PoolConfig;
use exchange_resilience::{
    ConnectionFactory, ConnectionHandle, ConnectionId, ConnectionPool, ConnectorError, HealthProbe,
};

/// In-memory connection whose health is flipped by the test.
#[derive(Debug)]
pub struct MockConnection {
    id: ConnectionId,
    pub healthy: AtomicBool,
    pub closed: AtomicBool,
    pub close_calls: AtomicUsize,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            healthy: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionHandle for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory that can be switched into a failing mode. Clones share their flags.
#[derive(Debug, Default, Clone)]
pub struct MockFactory {
    fail: Arc<AtomicBool>,
    created: Arc<AtomicUsize>,
    delay_ms: Arc<AtomicU64>,
}

impl MockFactory {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every later `create` wait this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;

    async fn create(&self) -> Result<MockConnection, ConnectorError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ConnectorError::Connect("mock factory offline".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection::new())
    }
}

/// Healthy while the connection is flagged healthy and not closed.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProbe;

#[async_trait]
impl HealthProbe<MockConnection> for MockProbe {
    async fn is_healthy(&self, connection: &MockConnection) -> bool {
        connection.healthy.load(Ordering::SeqCst) && !connection.is_closed()
    }
}

pub type MockPool = ConnectionPool<MockFactory, MockProbe>;

/// Pool config with a 1s rotation interval and a 200ms grace delay.
pub fn fast_pool_config(size: usize) -> PoolConfig {
    PoolConfig {
        size,
        rotation_interval_ms: 1000,
        forced_disconnect_ms: 5000,
        grace_delay_ms: 200,
        retry_delay_ms: 300,
        probe_timeout_ms: 100,
        connect_timeout_ms: 500,
        shutdown_timeout_ms: 1000,
        replenish_retired: false,
    }
}

pub fn mock_pool(config: PoolConfig) -> (MockPool, MockFactory) {
    let factory = MockFactory::default();
    let pool = ConnectionPool::new(factory.clone(), MockProbe, config).unwrap();
    (pool, factory)
}

/// Start a WebSocket echo server on an ephemeral port and return its URL.
pub async fn start_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_close() {
                        break;
                    }
                    if msg.is_text() && ws.send(msg).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    format!("ws://{addr}/ws")
}
