//! Tape Engine Binary
//!
//! Starts the trade ingestion engine.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tape-engine
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL`: SQLite database URL, e.g. `sqlite://tape.db`
//!
//! ## Optional
//! - `TAPE_SYMBOL`: Symbol to stream (default: BTCUSDT)
//! - `TAPE_FEED_ENDPOINT`: Websocket endpoint base (default: Binance spot)
//! - `TAPE_RETRY_DELAY_MS`: Base reconnect delay (default: 5000)
//! - `TAPE_WINDOW_SIZE`: Volatility window length (default: 100)
//! - `TAPE_DEPTH`: Bar tape depth in trades (default: 3000)
//! - `TAPE_REPLAY_LIMIT`: Rows replayed at startup (default: 3000)
//! - `TAPE_BAR_BUCKET_MS`: Bar bucket width (default: 1000)
//! - `TAPE_SNAPSHOT_INTERVAL_MS`: Snapshot log cadence (default: 2000)
//! - `RUST_LOG`: Log level (default: info)

use tape_engine::analytics::AnalyticsEngine;
use tape_engine::config::EngineConfig;
use tape_engine::feed::WsFeedClient;
use tape_engine::ingest::Ingestor;
use tape_engine::store::SqliteEventStore;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS operations
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();
    init_tracing();

    info!("Starting tape engine");

    let config = EngineConfig::from_env()?;
    info!(
        symbol = %config.symbol,
        endpoint = %config.feed_endpoint,
        window = config.window_size,
        tape_depth = config.tape_depth,
        "Configuration loaded"
    );

    let store = SqliteEventStore::connect(&config.database_url).await?;
    let analytics = AnalyticsEngine::shared(config.analytics());
    let feed = WsFeedClient::new(config.feed());

    let shutdown = CancellationToken::new();
    let mut ingestor = Ingestor::new(feed, store, analytics.clone(), config.ingest());

    let ingest_shutdown = shutdown.clone();
    let ingest_handle = tokio::spawn(async move {
        ingestor.run(ingest_shutdown).await;
        (ingestor.state(), ingestor.counters())
    });

    let snapshot_symbol = config.symbol.clone();
    let snapshot_analytics = analytics.clone();
    let snapshot_shutdown = shutdown.clone();
    let snapshot_interval = config.snapshot_interval;
    let snapshot_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(snapshot_interval);
        loop {
            tokio::select! {
                () = snapshot_shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let snapshot = snapshot_analytics.read().snapshot(&snapshot_symbol);
            if let Some(snap) = snapshot {
                info!(
                    symbol = %snap.symbol,
                    trades = snap.trade_count,
                    last = %snap.last_price,
                    vwap = %snap.vwap,
                    flow = %snap.flow,
                    "Session snapshot"
                );
            }
        }
    });

    shutdown_signal().await;
    info!("Shutdown signal received");
    shutdown.cancel();

    let (state, counters) = ingest_handle.await?;
    snapshot_handle.await?;

    info!(
        state = ?state,
        stored = counters.stored,
        duplicates = counters.duplicates,
        reconnects = counters.reconnects,
        "Tape engine stopped"
    );
    Ok(())
}

fn load_dotenv() {
    // Missing .env is fine; real deployments set variables directly.
    let _ = dotenvy::dotenv();
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "tape_engine=info"
                    .parse()
                    .expect("static directive 'tape_engine=info' is valid"),
            ),
        )
        .init();
}

/// Wait for SIGINT or SIGTERM.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; a process that cannot
/// respond to termination signals should not keep running.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("signal handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
