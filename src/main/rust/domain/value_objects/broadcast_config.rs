use std::time::Duration;

use crate::domain::errors::{RelayError, Result};
use crate::domain::value_objects::bridge_config::DEFAULT_BACKLOG_THRESHOLD;

/// Tuning for the adaptive broadcaster
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastConfig {
    nominal_fps: u32,
    backlog_threshold: usize,
    encode_latency_threshold: Duration,
}

impl BroadcastConfig {
    pub fn new(
        nominal_fps: u32,
        backlog_threshold: usize,
        encode_latency_threshold: Duration,
    ) -> Result<Self> {
        if nominal_fps == 0 {
            return Err(RelayError::InvalidFrameRate);
        }

        Ok(Self {
            nominal_fps,
            backlog_threshold,
            encode_latency_threshold,
        })
    }

    pub fn nominal_fps(&self) -> u32 {
        self.nominal_fps
    }

    pub fn backlog_threshold(&self) -> usize {
        self.backlog_threshold
    }

    pub fn encode_latency_threshold(&self) -> Duration {
        self.encode_latency_threshold
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            nominal_fps: 10,
            backlog_threshold: DEFAULT_BACKLOG_THRESHOLD,
            encode_latency_threshold: Duration::from_millis(50),
        }
    }
}

/// Minimum spacing between broadcasts at `fps`
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}
