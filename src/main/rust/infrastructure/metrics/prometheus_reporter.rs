use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{ConnectionState, FanOutReport};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Upstream state (0=Idle, 1=Connecting, 2=Connected, 3=ReconnectScheduled, 4=PermanentlyDisconnected, 5=Stopped)
    pub static ref UPSTREAM_STATE: Gauge = Gauge::new(
        "relay_upstream_state",
        "Current upstream connection state"
    ).expect("metric can be created");

    pub static ref RECONNECT_ATTEMPTS: IntCounter = IntCounter::new(
        "relay_reconnect_attempts_total",
        "Total number of scheduled upstream reconnects"
    ).expect("metric can be created");

    pub static ref BACKOFF_SECONDS: Gauge = Gauge::new(
        "relay_reconnect_backoff_seconds",
        "Delay before the pending reconnect"
    ).expect("metric can be created");

    pub static ref DOWNSTREAM_CLIENTS: IntGauge = IntGauge::new(
        "relay_downstream_clients",
        "Currently attached downstream sockets"
    ).expect("metric can be created");

    pub static ref EVENTS_TOTAL: IntCounter = IntCounter::new(
        "relay_events_total",
        "Events fanned out to downstream sockets"
    ).expect("metric can be created");

    pub static ref DROPPED_FRAMES: IntCounter = IntCounter::new(
        "relay_dropped_frames_total",
        "Frames skipped for a backpressured socket"
    ).expect("metric can be created");

    pub static ref SKIPPED_CLOSED: IntCounter = IntCounter::new(
        "relay_skipped_closed_total",
        "Frames skipped because the socket had already closed"
    ).expect("metric can be created");

    pub static ref CURRENT_FPS: IntGauge = IntGauge::new(
        "relay_current_fps",
        "Target broadcast rate"
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(UPSTREAM_STATE.clone()))?;
        REGISTRY.register(Box::new(RECONNECT_ATTEMPTS.clone()))?;
        REGISTRY.register(Box::new(BACKOFF_SECONDS.clone()))?;
        REGISTRY.register(Box::new(DOWNSTREAM_CLIENTS.clone()))?;
        REGISTRY.register(Box::new(EVENTS_TOTAL.clone()))?;
        REGISTRY.register(Box::new(DROPPED_FRAMES.clone()))?;
        REGISTRY.register(Box::new(SKIPPED_CLOSED.clone()))?;
        REGISTRY.register(Box::new(CURRENT_FPS.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_state_change(&self, state: &ConnectionState) {
        UPSTREAM_STATE.set(state.as_metric());
    }

    fn report_reconnect_attempt(&self) {
        RECONNECT_ATTEMPTS.inc();
    }

    fn report_backoff(&self, delay_secs: f64) {
        BACKOFF_SECONDS.set(delay_secs);
    }

    fn report_downstream_clients(&self, count: usize) {
        DOWNSTREAM_CLIENTS.set(count as i64);
    }

    fn report_fan_out(&self, report: &FanOutReport) {
        EVENTS_TOTAL.inc();
        DROPPED_FRAMES.inc_by(report.dropped_backpressure as u64);
        SKIPPED_CLOSED.inc_by(report.skipped_closed as u64);
    }

    fn report_fps(&self, fps: u32) {
        CURRENT_FPS.set(i64::from(fps));
    }
}
