use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use reality_relay::config::{BridgeArgs, BroadcastArgs, Mode};
use reality_relay::{
    serve_metrics, BridgeNotice, BridgeRuntime, BroadcastRuntime, Config, DownstreamListener,
    InMemoryAggregateStore, PrometheusReporter, RelayEvent, RelayHandle, SystemClock,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();
    config.validate()?;

    // Initialize logging
    let filter = if config.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // Initialize metrics
    PrometheusReporter::init_metrics()?;

    // Handle Ctrl+C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
            return;
        }
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    match config.mode.clone() {
        Mode::Bridge(args) => run_bridge(&config, args, shutdown_rx).await?,
        Mode::Broadcast(args) => run_broadcast(&config, args, shutdown_rx).await?,
    }

    info!("Relay shutdown complete");
    Ok(())
}

async fn run_bridge(config: &Config, args: BridgeArgs, shutdown: watch::Receiver<bool>) -> Result<()> {
    info!("Starting relay bridge");
    info!("  Upstream: {}", args.upstream_url);
    info!("  Downstream port: {}", args.listen_port);
    info!("  Metrics port: {}", config.metrics_port);

    // Convert CLI config to domain configs
    let bridge_config = args
        .to_bridge_config()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let policy = args
        .to_reconnect_policy()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let metrics_reporter = Arc::new(PrometheusReporter::new());
    let (relay, bridge_task) = BridgeRuntime::start(
        bridge_config,
        policy,
        Box::new(InMemoryAggregateStore::new()),
        metrics_reporter,
    );
    tokio::spawn(log_notices(relay.subscribe()));

    let (_, server) = serve_metrics(
        config.metrics_port,
        Some(relay.status_receiver()),
        wait_for_shutdown(shutdown.clone()),
    );
    let metrics_server = tokio::spawn(server);

    let listener = DownstreamListener::bind(SocketAddr::from(([0, 0, 0, 0], args.listen_port))).await?;
    info!("Downstream listener on {}", listener.local_addr()?);
    let listener_task = tokio::spawn(listener.run(relay.clone(), wait_for_shutdown(shutdown.clone())));

    relay.connect()?;

    wait_for_shutdown(shutdown).await;
    stop_bridge(&relay);

    bridge_task.await?;
    listener_task.await?;
    metrics_server.await?;
    Ok(())
}

async fn run_broadcast(
    config: &Config,
    args: BroadcastArgs,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!("Starting adaptive broadcaster");
    info!("  Listen port: {}", args.listen_port);
    info!("  Nominal FPS: {}", args.nominal_fps);
    info!("  Metrics port: {}", config.metrics_port);

    let broadcast_config = args
        .to_broadcast_config()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let metrics_reporter = Arc::new(PrometheusReporter::new());
    let (broadcaster, broadcast_task) =
        BroadcastRuntime::start(broadcast_config, Arc::new(SystemClock), metrics_reporter);

    let (_, server) = serve_metrics(config.metrics_port, None, wait_for_shutdown(shutdown.clone()));
    let metrics_server = tokio::spawn(server);

    let listener = DownstreamListener::bind(SocketAddr::from(([0, 0, 0, 0], args.listen_port))).await?;
    info!("Sink listener on {}", listener.local_addr()?);
    let listener_task =
        tokio::spawn(listener.run(broadcaster.clone(), wait_for_shutdown(shutdown.clone())));

    // Events arrive as one JSON envelope per stdin line
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let stop = wait_for_shutdown(shutdown.clone());
    tokio::pin!(stop);
    let mut reading = true;
    while reading {
        tokio::select! {
            _ = &mut stop => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match RelayEvent::decode(&line) {
                    Ok(event) => {
                        if broadcaster.publish(event).is_err() {
                            reading = false;
                        }
                    }
                    Err(e) => warn!("Skipping stdin event: {}", e),
                },
                Ok(None) => {
                    info!("Event input closed; serving until shutdown");
                    reading = false;
                }
                Err(e) => {
                    error!("Failed to read events: {}", e);
                    reading = false;
                }
            },
        }
    }

    wait_for_shutdown(shutdown).await;
    if broadcaster.shutdown().is_err() {
        warn!("Broadcaster already stopped");
    }

    broadcast_task.await?;
    listener_task.await?;
    metrics_server.await?;
    Ok(())
}

fn stop_bridge(relay: &RelayHandle) {
    if relay.shutdown().is_err() {
        warn!("Bridge already stopped");
    }
}

async fn log_notices(mut notices: broadcast::Receiver<BridgeNotice>) {
    loop {
        match notices.recv().await {
            Ok(BridgeNotice::Connected) => info!("Upstream connection established"),
            Ok(BridgeNotice::Disconnected { reason }) => warn!("Upstream connection lost: {}", reason),
            Ok(BridgeNotice::PermanentDisconnect { attempts }) => {
                error!(
                    "Upstream unreachable after {} attempts; relay keeps serving cached state",
                    attempts
                )
            }
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("Missed {} bridge notices", n),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
