//! Exchange stream keeper.
//!
//! Keeps a rotating pool of WebSocket connections to one exchange endpoint and
//! periodically pings the active connection through the `stream` circuit breaker.
//!
//! ```text
//!   ticker ──▶ stream breaker ──▶ pool.get_connection() ──▶ ping
//!                   │                      │
//!                   │ open: reject fast    │ unhealthy: emergency rotation
//!                   ▼                      ▼
//!              status log            rotation task (every rotation_interval)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::Parser;
use thiserror::Error;
use tokio::time;

use exchange_resilience::config::loader::{load_config, ConfigError};
use exchange_resilience::config::validation::validate_config;
use exchange_resilience::lifecycle::signals::wait_for_signal;
use exchange_resilience::observability::{logging, metrics};
use exchange_resilience::{
    CircuitBreaker, CircuitBreakerRegistry, Classify, ConnectionHandle, ConnectionPool, ConnectorError, ErrorKind,
    PingProbe, PoolError, ResilienceConfig, StateChange, WsConnector,
};

type WsPool = ConnectionPool<WsConnector, PingProbe>;

#[derive(Parser)]
#[command(name = "exchange-resilience")]
#[command(about = "Rotating WebSocket pool guarded by circuit breakers", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `transport.url`.
    #[arg(short, long)]
    url: Option<String>,

    #[arg(long, default_value_t = 10)]
    stats_interval_secs: u64,
}

#[derive(Debug, Error)]
enum HeartbeatError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Transport(#[from] ConnectorError),
}

impl Classify for HeartbeatError {
    fn kind(&self) -> ErrorKind {
        match self {
            HeartbeatError::Pool(e) => e.kind(),
            HeartbeatError::Transport(e) => e.kind(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ResilienceConfig::default(),
    };
    if let Some(url) = cli.url {
        config.transport.url = url;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("exchange-resilience v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = CircuitBreakerRegistry::new(config.breaker.clone()).with_listener(Arc::new(|change: &StateChange| {
        tracing::warn!(breaker = %change.breaker, from = %change.from, to = %change.to, "Breaker state changed");
    }));
    let stream_breaker = registry.get_or_create("stream", Some(config.breaker_for("stream")));

    let connector = WsConnector::new(&config.transport.url, config.pool.connect_timeout())?;
    let pool = ConnectionPool::new(connector, PingProbe::new(config.transport.ping_on_probe), config.pool.clone())?;

    tracing::info!(
        url = %config.transport.url,
        pool_size = config.pool.size,
        rotation_interval = ?config.pool.rotation_interval(),
        "Configuration loaded"
    );

    if let Err(e) = stream_breaker.run(|| pool.initialize()).await {
        tracing::warn!(error = %e, "Initial pool setup failed, retrying on the next heartbeat");
    }

    let mut ticker = time::interval(Duration::from_secs(cli.stats_interval_secs.max(1)));
    let signal = wait_for_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            _ = &mut signal => break,
            _ = ticker.tick() => {
                heartbeat(&pool, &stream_breaker).await;
                report(&pool, &registry);
            }
        }
    }

    pool.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn heartbeat(pool: &WsPool, breaker: &CircuitBreaker) {
    let result = breaker
        .run(|| async {
            let conn = pool.get_connection().await?;
            conn.ping().await?;
            Ok::<_, HeartbeatError>(conn.id())
        })
        .await;

    match result {
        Ok(id) => tracing::debug!(connection = %id, "Heartbeat ok"),
        Err(e) if e.is_open() => tracing::debug!(error = %e, "Heartbeat skipped"),
        Err(e) => tracing::warn!(error = %e, "Heartbeat failed"),
    }
}

fn report(pool: &WsPool, registry: &CircuitBreakerRegistry) {
    match serde_json::to_string(&pool.get_stats()) {
        Ok(stats) => tracing::info!(%stats, "Pool status"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize pool stats"),
    }
    match serde_json::to_string(&registry.all_status()) {
        Ok(breakers) => tracing::info!(%breakers, health = registry.health_score(), "Breaker status"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize breaker status"),
    }
}
