//! Stock price service
//!
//! Serves recent daily closing prices for a stock symbol, read from an
//! upstream market data API through a TTL cache and a circuit breaker.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                    STOCK SERVICE                      │
//!                      │                                                       │
//!   Client Request     │  ┌─────────┐    ┌──────────┐    ┌────────────────┐   │
//!   ───────────────────┼─▶│  http   │───▶│  fetch   │───▶│     cache      │   │
//!                      │  │ server  │    │orchestr. │    │   (TTL map)    │   │
//!                      │  └─────────┘    └────┬─────┘    └────────────────┘   │
//!                      │                      │ miss                          │
//!                      │                      ▼                               │
//!                      │               ┌─────────────┐    ┌────────────────┐  │
//!                      │               │ resilience  │───▶│   upstream     │──┼──▶ Market
//!                      │               │  breaker    │    │ Alpha Vantage  │  │    Data API
//!                      │               └─────────────┘    └────────────────┘  │
//!                      │                                                       │
//!                      │  ┌─────────────────────────────────────────────────┐ │
//!                      │  │             Cross-Cutting Concerns              │ │
//!                      │  │  config · observability · lifecycle             │ │
//!                      │  └─────────────────────────────────────────────────┘ │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use stock_service::config::load_config;
use stock_service::lifecycle::{signals, startup, Shutdown};
use stock_service::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "stock-service", version, about = "Cached, circuit-broken stock price API")]
struct Cli {
    /// TOML configuration file; defaults and environment are used without one.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    if cli.check {
        println!("configuration OK");
        return Ok(());
    }

    logging::init(&config.observability)?;
    tracing::info!("stock-service v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        upstream = %config.upstream.base_url,
        "Configuration loaded"
    );

    let metrics_handle = if config.observability.metrics_enabled {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let state = startup::build_state(&config, metrics_handle)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        trigger.trigger();
    });

    startup::serve(&config, listener, state, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
