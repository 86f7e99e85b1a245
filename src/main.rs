// =============================================================================
// Solana Signal Engine — Main Entry Point
// =============================================================================
//
// Polls Binance spot/futures and Solana RPC, turns the data into six scored
// signals, fuses them into BUY / SELL / HOLD and keeps a SQLite log.
// Interactive console by default; `--daemon` runs the polling loop only.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod binance;
mod client;
mod console;
mod engine;
mod indicators;
mod journal;
mod market_data;
mod runtime_config;
mod signals;
mod solana;
mod storage;
mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::binance::{ApiFamily, Credentials, ExchangeClient};
use crate::client::{EndpointPool, ReqwestTransport, Transport};
use crate::console::Console;
use crate::engine::SignalEngine;
use crate::runtime_config::RuntimeConfig;
use crate::signals::{Clock, SignalProducers, SignalScheduler, SystemClock};
use crate::solana::{ChainClient, DistinctAddressEstimator};
use crate::storage::{SqliteStore, Store};

#[derive(Debug, Parser)]
#[command(name = "solana-signal-engine", version, about = "Solana market signal engine")]
struct Cli {
    /// Interactive command loop (default).
    #[arg(long, conflicts_with = "daemon")]
    console: bool,

    /// Run the polling loop unattended until Ctrl-C / SIGTERM.
    #[arg(long)]
    daemon: bool,

    /// JSON runtime configuration.
    #[arg(long, default_value = "signal_engine.json")]
    config: PathBuf,

    /// SQLite database file; overrides `database_path` from the config.
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match RuntimeConfig::load(&cli.config) {
        Ok(config) => config,
        Err(_) if !cli.config.exists() => {
            let config = RuntimeConfig::default();
            match config.save(&cli.config) {
                Ok(()) => info!(path = %cli.config.display(), "No config file, wrote defaults"),
                Err(e) => warn!(error = %e, "Failed to write default config"),
            }
            config
        }
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            RuntimeConfig::default()
        }
    };
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    config.validate().context("invalid runtime configuration")?;

    info!(
        symbol = %config.symbol,
        signals = config.signals.len(),
        database = %config.database_path,
        "Solana signal engine starting"
    );

    // ── 2. Upstream clients ──────────────────────────────────────────────
    let policy = config.retry.policy();
    let exchange_transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(
        Duration::from_secs(config.exchange.connect_timeout_secs),
        Duration::from_secs(config.exchange.read_timeout_secs),
    )?);
    let chain_transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::with_timeout(
        Duration::from_secs(config.chain.timeout_secs),
    )?);

    let credentials = Credentials::from_env();
    if credentials.is_none() {
        info!("no Binance credentials in environment, using public endpoints only");
    }

    let spot = Arc::new(ExchangeClient::new(
        ApiFamily::Spot,
        config.symbol.clone(),
        EndpointPool::new(config.exchange.spot_endpoints.clone())?,
        policy,
        exchange_transport.clone(),
        credentials.clone(),
    ));
    let futures = Arc::new(ExchangeClient::new(
        ApiFamily::Futures,
        config.symbol.clone(),
        EndpointPool::new(config.exchange.futures_endpoints.clone())?,
        policy,
        exchange_transport,
        credentials,
    ));
    let chain = Arc::new(ChainClient::new(
        EndpointPool::new(config.chain.rpc_endpoints.clone())?,
        policy,
        chain_transport,
        config.chain.pacing(),
    ));

    // ── 3. Signal pipeline ───────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let producers = Arc::new(SignalProducers::new(
        spot,
        futures,
        chain,
        Arc::new(DistinctAddressEstimator {
            factor: config.chain.address_factor,
        }),
        clock.clone(),
        config.chain.whale_threshold_sol,
        config.chain.recent_tx_limit,
    ));
    let scheduler = SignalScheduler::new(config.signals.clone(), clock);

    // ── 4. Storage ───────────────────────────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.database_path)
            .await
            .with_context(|| format!("failed to open database {}", config.database_path))?,
    );

    let engine = Arc::new(SignalEngine::new(
        &config,
        scheduler,
        producers.clone(),
        store.clone(),
    ));

    // ── 5. Run ───────────────────────────────────────────────────────────
    if cli.daemon && !cli.console {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            wait_for_shutdown().await;
            warn!("Shutdown signal received, stopping after the current cycle");
            let _ = tx.send(true);
        });
        engine.run(rx).await;
    } else {
        Console::new(engine, producers, store.clone()).run().await?;
        store.close().await;
    }

    info!("Solana signal engine shut down complete.");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
