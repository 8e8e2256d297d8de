use serde::Serialize;

/// Outcome of one fan-out pass over the attached clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Frames handed to a client
    pub delivered: usize,
    /// Skipped because the client's backlog was over the threshold
    pub dropped_backpressure: usize,
    /// Skipped because the client was no longer open
    pub skipped_closed: usize,
    /// Removed after a failed send
    pub evicted: usize,
}

/// Running counters for a relay service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetrics {
    pub total_events: u64,
    pub dropped_frames: u64,
    pub skipped_closed: u64,
    pub active_connections: usize,
    pub current_fps: u32,
}

impl ServiceMetrics {
    pub fn with_fps(current_fps: u32) -> Self {
        Self {
            current_fps,
            ..Self::default()
        }
    }

    /// Fold one fan-out pass into the counters
    pub fn record_fan_out(&mut self, report: &FanOutReport, active_connections: usize) {
        self.total_events += 1;
        self.dropped_frames += report.dropped_backpressure as u64;
        self.skipped_closed += report.skipped_closed as u64;
        self.active_connections = active_connections;
    }
}
