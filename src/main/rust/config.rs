use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::domain::value_objects::{BridgeConfig, BroadcastConfig, ReconnectPolicy};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "reality-relay",
    version = "0.1.0",
    about = "Real-time event relay with adaptive fan-out and self-healing upstream bridge"
)]
pub struct Config {
    #[command(subcommand)]
    pub mode: Mode,

    /// Metrics server port
    #[arg(long, global = true, env = "METRICS_PORT", default_value = "9100")]
    pub metrics_port: u16,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// Relay an upstream event stream to downstream WebSocket clients
    Bridge(BridgeArgs),
    /// Serve events read from stdin (one JSON envelope per line) to WebSocket sinks
    Broadcast(BroadcastArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BridgeArgs {
    /// Upstream WebSocket URL
    #[arg(long, env = "UPSTREAM_URL", default_value = "ws://localhost:8090")]
    pub upstream_url: String,

    /// Port for downstream clients
    #[arg(long, env = "LISTEN_PORT", default_value = "8091")]
    pub listen_port: u16,

    /// Reconnects before giving up
    #[arg(long, env = "MAX_RECONNECT_ATTEMPTS", default_value = "20")]
    pub max_reconnect_attempts: u32,

    /// First reconnect delay in milliseconds
    #[arg(long, env = "BASE_RECONNECT_INTERVAL_MS", default_value = "5000")]
    pub base_reconnect_interval_ms: u64,

    /// Reconnect backoff multiplier
    #[arg(long, env = "BACKOFF_FACTOR", default_value = "1.5")]
    pub backoff_factor: f64,

    /// Reconnect delay cap in milliseconds
    #[arg(long, env = "MAX_RECONNECT_INTERVAL_MS", default_value = "60000")]
    pub max_reconnect_interval_ms: u64,

    /// Heartbeat period in milliseconds
    #[arg(long, env = "HEARTBEAT_INTERVAL_MS", default_value = "30000")]
    pub heartbeat_interval_ms: u64,

    /// Per-client outbound backlog above which frames are dropped
    #[arg(long, env = "BACKLOG_THRESHOLD_BYTES", default_value = "1048576")]
    pub backlog_threshold_bytes: usize,
}

#[derive(Args, Debug, Clone)]
pub struct BroadcastArgs {
    /// Port for WebSocket sinks
    #[arg(long, env = "LISTEN_PORT", default_value = "8090")]
    pub listen_port: u16,

    /// Target frames per second when encoding is fast
    #[arg(long, env = "NOMINAL_FPS", default_value = "10")]
    pub nominal_fps: u32,

    /// Per-sink outbound backlog above which frames are dropped
    #[arg(long, env = "BACKLOG_THRESHOLD_BYTES", default_value = "1048576")]
    pub backlog_threshold_bytes: usize,

    /// Encode latency in milliseconds above which the rate drops to 1 fps
    #[arg(long, env = "ENCODE_LATENCY_THRESHOLD_MS", default_value = "50")]
    pub encode_latency_threshold_ms: u64,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        Self::validate_port(self.metrics_port, "metrics")?;

        match &self.mode {
            Mode::Bridge(args) => {
                Self::validate_port(args.listen_port, "listen")?;
                if args.listen_port == self.metrics_port {
                    anyhow::bail!("Listen and metrics ports must differ ({})", args.listen_port);
                }
                args.validate()
            }
            Mode::Broadcast(args) => {
                Self::validate_port(args.listen_port, "listen")?;
                if args.listen_port == self.metrics_port {
                    anyhow::bail!("Listen and metrics ports must differ ({})", args.listen_port);
                }
                if args.nominal_fps == 0 {
                    anyhow::bail!("Nominal FPS must be at least 1");
                }
                Ok(())
            }
        }
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }
}

impl BridgeArgs {
    fn validate(&self) -> anyhow::Result<()> {
        if !self.upstream_url.starts_with("ws://") && !self.upstream_url.starts_with("wss://") {
            anyhow::bail!("Upstream URL must start with ws:// or wss://");
        }

        if self.backoff_factor <= 1.0 {
            anyhow::bail!("Backoff factor must be > 1.0");
        }

        if self.base_reconnect_interval_ms == 0 {
            anyhow::bail!("Base reconnect interval cannot be 0");
        }

        if self.max_reconnect_interval_ms < self.base_reconnect_interval_ms {
            anyhow::bail!(
                "Maximum reconnect interval ({}) cannot be less than base interval ({})",
                self.max_reconnect_interval_ms,
                self.base_reconnect_interval_ms
            );
        }

        if self.heartbeat_interval_ms == 0 {
            anyhow::bail!("Heartbeat interval cannot be 0");
        }

        Ok(())
    }

    pub fn to_bridge_config(&self) -> crate::domain::errors::Result<BridgeConfig> {
        Ok(BridgeConfig::new(self.upstream_url.clone())?
            .with_heartbeat_interval(Duration::from_millis(self.heartbeat_interval_ms))?
            .with_backlog_threshold(self.backlog_threshold_bytes))
    }

    pub fn to_reconnect_policy(&self) -> crate::domain::errors::Result<ReconnectPolicy> {
        ReconnectPolicy::new(
            self.max_reconnect_attempts,
            Duration::from_millis(self.base_reconnect_interval_ms),
            self.backoff_factor,
            Duration::from_millis(self.max_reconnect_interval_ms),
        )
    }
}

impl BroadcastArgs {
    pub fn to_broadcast_config(&self) -> crate::domain::errors::Result<BroadcastConfig> {
        BroadcastConfig::new(
            self.nominal_fps,
            self.backlog_threshold_bytes,
            Duration::from_millis(self.encode_latency_threshold_ms),
        )
    }
}
