use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::entities::DownstreamRegistry;
use crate::domain::errors::ProtocolError;
use crate::domain::ports::{ClientId, Clock, DownstreamClient, MetricsReporter};
use crate::domain::value_objects::{
    frame_interval, now_millis, BroadcastConfig, FanOutReport, RelayEvent, ServiceMetrics,
};

/// Fastest rate the broadcaster falls back to under encode pressure
const DEGRADED_FPS: u32 = 1;

/// What happened to one offered event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Nobody attached; the event was not even encoded
    NoSinks,
    /// Arrived inside the current frame interval and was discarded
    Superseded,
    EncodeFailed,
    Sent(FanOutReport),
}

/// Producer-side fan-out with self-throttling.
///
/// Each event's serialization time decides the target frame rate; events
/// arriving faster than that rate are superseded rather than queued.
pub struct AdaptiveBroadcaster {
    config: BroadcastConfig,
    sinks: DownstreamRegistry,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsReporter>,
    counters: ServiceMetrics,
    last_broadcast: Option<Instant>,
}

impl AdaptiveBroadcaster {
    pub fn new(
        config: BroadcastConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        metrics.report_fps(config.nominal_fps());
        Self {
            counters: ServiceMetrics::with_fps(config.nominal_fps()),
            config,
            sinks: DownstreamRegistry::new(),
            clock,
            metrics,
            last_broadcast: None,
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn current_fps(&self) -> u32 {
        self.counters.current_fps
    }

    pub fn service_metrics(&self) -> ServiceMetrics {
        self.counters.clone()
    }

    pub fn attach(&mut self, sink: Box<dyn DownstreamClient>) {
        let id = sink.id();
        self.sinks.add(sink);
        self.sync_connections();
        tracing::info!(sink = %id, sinks = self.sinks.len(), "Sink attached");
    }

    pub fn detach(&mut self, id: ClientId) {
        if self.sinks.remove(id).is_some() {
            self.sync_connections();
            tracing::info!(sink = %id, sinks = self.sinks.len(), "Sink detached");
        }
    }

    /// Pick the target rate from one encode measurement
    pub fn adapt_rate(&mut self, encode_latency: Duration) -> u32 {
        let fps = if encode_latency > self.config.encode_latency_threshold() {
            DEGRADED_FPS
        } else {
            self.config.nominal_fps()
        };

        if fps != self.counters.current_fps {
            tracing::info!(
                from = self.counters.current_fps,
                to = fps,
                latency_ms = encode_latency.as_millis() as u64,
                "Broadcast rate changed"
            );
            self.counters.current_fps = fps;
            self.metrics.report_fps(fps);
        }
        fps
    }

    /// Offer the latest event for broadcast
    pub fn offer(&mut self, event: &RelayEvent) -> BroadcastOutcome {
        if self.sinks.is_empty() {
            return BroadcastOutcome::NoSinks;
        }

        let started = self.clock.now();
        let encoded = event.encode();
        let now = self.clock.now();
        let fps = self.adapt_rate(now.saturating_duration_since(started));

        let frame = match encoded {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(kind = event.kind(), error = %e, "Failed to encode event");
                return BroadcastOutcome::EncodeFailed;
            }
        };

        if let Some(last) = self.last_broadcast {
            if now.saturating_duration_since(last) < frame_interval(fps) {
                tracing::trace!(kind = event.kind(), "Event superseded");
                return BroadcastOutcome::Superseded;
            }
        }

        let report = self.sinks.fan_out(&frame, self.config.backlog_threshold());
        self.last_broadcast = Some(now);
        self.counters.record_fan_out(&report, self.sinks.len());
        self.metrics.report_fan_out(&report);
        self.metrics.report_downstream_clients(self.sinks.len());

        if report.dropped_backpressure > 0 {
            tracing::debug!(
                dropped = report.dropped_backpressure,
                delivered = report.delivered,
                "Backpressured sinks skipped"
            );
        }

        BroadcastOutcome::Sent(report)
    }

    /// Handle a text frame a sink sent back; heartbeats get answered
    pub fn handle_sink_frame(&mut self, id: ClientId, text: &str) {
        match RelayEvent::decode(text) {
            Ok(RelayEvent::Heartbeat { .. }) => {
                let reply = match RelayEvent::heartbeat_response(now_millis()).encode() {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode heartbeat response");
                        return;
                    }
                };
                if let Err(e) = self.sinks.send_to(id, &reply) {
                    tracing::debug!(sink = %id, error = %e, "Heartbeat response not delivered");
                    self.sync_connections();
                }
            }
            Ok(event) => {
                tracing::debug!(sink = %id, kind = event.kind(), "Ignoring sink message");
            }
            Err(ProtocolError::UnknownType(kind)) => {
                tracing::debug!(sink = %id, %kind, "Ignoring unrecognized sink message");
            }
            Err(e) => {
                tracing::warn!(sink = %id, error = %e, "Dropping malformed sink frame");
            }
        }
    }

    pub fn close_all(&mut self) -> usize {
        let closed = self.sinks.close_all();
        self.sync_connections();
        closed
    }

    fn sync_connections(&mut self) {
        self.counters.active_connections = self.sinks.len();
        self.metrics.report_downstream_clients(self.sinks.len());
    }
}
