use std::time::Duration;

use crate::domain::errors::{RelayError, Result};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_BACKLOG_THRESHOLD: usize = 1024 * 1024;

/// Configuration for the reconnecting relay bridge
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    upstream_url: String,
    heartbeat_interval: Duration,
    backlog_threshold: usize,
}

impl BridgeConfig {
    pub fn new(upstream_url: String) -> Result<Self> {
        Self::validate_upstream_url(&upstream_url)?;

        Ok(Self {
            upstream_url,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            backlog_threshold: DEFAULT_BACKLOG_THRESHOLD,
        })
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(RelayError::InvalidHeartbeatInterval);
        }
        self.heartbeat_interval = interval;
        Ok(self)
    }

    pub fn with_backlog_threshold(mut self, bytes: usize) -> Self {
        self.backlog_threshold = bytes;
        self
    }

    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Silence after an unacknowledged heartbeat that forces a close
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval * 2
    }

    pub fn backlog_threshold(&self) -> usize {
        self.backlog_threshold
    }

    fn validate_upstream_url(url: &str) -> Result<()> {
        let rest = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"));
        match rest {
            Some(host) if !host.is_empty() => Ok(()),
            _ => Err(RelayError::InvalidUpstreamUrl(url.to_string())),
        }
    }
}
