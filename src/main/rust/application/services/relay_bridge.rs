use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};

use crate::domain::entities::{ConnectionLifecycle, DownstreamRegistry};
use crate::domain::errors::{ProtocolError, RelayError, Result};
use crate::domain::ports::{
    AggregateStore, ClientId, Clock, DownstreamClient, MetricsReporter, Scheduler,
    UpstreamTransport,
};
use crate::domain::value_objects::{
    now_millis, BridgeConfig, ConnectionState, RealityStatus, ReconnectPolicy, RelayEvent,
};

const NOTICE_CAPACITY: usize = 64;

/// Everything that can happen to the bridge.
///
/// Socket tasks, timers and the hosting process all speak to the bridge
/// through this enum; [`RelayBridge::handle`] is the only entry point.
pub enum BridgeInput {
    Connect,
    UpstreamOpened,
    UpstreamFrame(String),
    UpstreamClosed { reason: String },
    ReconnectDue,
    HeartbeatDue,
    ClientAttached(Box<dyn DownstreamClient>),
    ClientDetached(ClientId),
    SendUpstream {
        message: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Lifecycle notifications for the owning process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeNotice {
    Connected,
    Disconnected { reason: String },
    PermanentDisconnect { attempts: u32 },
}

/// Health snapshot returned by `status()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub connected: bool,
    pub connected_clients: usize,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
}

/// Injected collaborators of a [`RelayBridge`]
pub struct BridgePorts {
    pub transport: Box<dyn UpstreamTransport>,
    pub scheduler: Box<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
    pub store: Box<dyn AggregateStore>,
    pub metrics: Arc<dyn MetricsReporter>,
}

/// Reconnecting relay bridge.
///
/// Keeps one upstream connection alive, detects half-open sockets with a
/// heartbeat, and republishes upstream data events to attached downstream
/// clients. Performs no I/O itself: sockets and timers sit behind ports and
/// report back through [`BridgeInput`].
pub struct RelayBridge {
    config: BridgeConfig,
    policy: ReconnectPolicy,
    lifecycle: ConnectionLifecycle,
    clients: DownstreamRegistry,
    transport: Box<dyn UpstreamTransport>,
    scheduler: Box<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    store: Box<dyn AggregateStore>,
    metrics: Arc<dyn MetricsReporter>,
    notices: broadcast::Sender<BridgeNotice>,
    desired: bool,
}

impl RelayBridge {
    pub fn new(config: BridgeConfig, policy: ReconnectPolicy, ports: BridgePorts) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            lifecycle: ConnectionLifecycle::new(policy.base_interval()),
            config,
            policy,
            clients: DownstreamRegistry::new(),
            transport: ports.transport,
            scheduler: ports.scheduler,
            clock: ports.clock,
            store: ports.store,
            metrics: ports.metrics,
            notices,
            desired: false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeNotice> {
        self.notices.subscribe()
    }

    pub fn notice_sender(&self) -> broadcast::Sender<BridgeNotice> {
        self.notices.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.lifecycle.current_state()
    }

    pub fn lifecycle(&self) -> &ConnectionLifecycle {
        &self.lifecycle
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn active_timers(&self) -> usize {
        self.scheduler.active_timers()
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            connected: self.state().is_connected(),
            connected_clients: self.clients.len(),
            reconnect_attempts: self.lifecycle.reconnect_attempts(),
            max_reconnect_attempts: self.policy.max_attempts(),
        }
    }

    /// Status message for downstream clients
    pub fn reality_status(&self) -> RelayEvent {
        RelayEvent::reality_status(
            RealityStatus {
                bridge_connected: self.state().is_connected(),
                reality_generation: self.store.snapshot(),
            },
            now_millis(),
        )
    }

    pub fn handle(&mut self, input: BridgeInput) {
        match input {
            BridgeInput::Connect => self.connect(),
            BridgeInput::UpstreamOpened => self.on_upstream_opened(),
            BridgeInput::UpstreamFrame(text) => self.on_upstream_frame(&text),
            BridgeInput::UpstreamClosed { reason } => self.on_upstream_closed(reason),
            BridgeInput::ReconnectDue => self.on_reconnect_due(),
            BridgeInput::HeartbeatDue => self.on_heartbeat_due(),
            BridgeInput::ClientAttached(client) => self.add_client(client),
            BridgeInput::ClientDetached(id) => self.remove_client(id),
            BridgeInput::SendUpstream { message, reply } => {
                let _ = reply.send(self.send_to_upstream(&message));
            }
            BridgeInput::Shutdown => self.shutdown(),
        }
    }

    /// Open the upstream socket. A permanently disconnected bridge starts a
    /// fresh retry cycle.
    pub fn connect(&mut self) {
        match self.state() {
            ConnectionState::Idle => {}
            ConnectionState::PermanentlyDisconnected => {
                self.lifecycle.reset_retries(self.policy.base_interval());
            }
            state => {
                tracing::debug!(%state, "connect() ignored");
                return;
            }
        }

        self.desired = true;
        self.open_upstream();
    }

    /// Send a message upstream; fails without side effects unless connected
    pub fn send_to_upstream<T: Serialize>(&mut self, message: &T) -> Result<()> {
        if !self.state().is_connected() {
            tracing::warn!(state = %self.state(), "Cannot send upstream: not connected");
            return Err(RelayError::NotConnected);
        }

        let frame =
            serde_json::to_string(message).map_err(|e| RelayError::Transport(e.to_string()))?;
        self.transport.send(frame)
    }

    /// Attach a downstream client and greet it with the current status
    pub fn add_client(&mut self, client: Box<dyn DownstreamClient>) {
        let id = client.id();

        if self.state() == ConnectionState::Stopped {
            tracing::debug!(client = %id, "Rejecting client after shutdown");
            client.close();
            return;
        }

        match self.reality_status().encode() {
            Ok(frame) => {
                if let Err(e) = client.send(&frame) {
                    tracing::warn!(client = %id, error = %e, "Failed to greet client");
                    return;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to encode status"),
        }

        self.clients.add(client);
        self.metrics.report_downstream_clients(self.clients.len());
        tracing::info!(client = %id, clients = self.clients.len(), "Downstream client attached");
    }

    pub fn remove_client(&mut self, id: ClientId) {
        if self.clients.remove(id).is_some() {
            self.metrics.report_downstream_clients(self.clients.len());
            tracing::info!(client = %id, clients = self.clients.len(), "Downstream client detached");
        }
    }

    /// Cancel timers, close every socket and enter the terminal state.
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.state() == ConnectionState::Stopped {
            tracing::debug!("Bridge already stopped");
            return;
        }

        self.desired = false;
        self.scheduler.cancel_reconnect();
        self.scheduler.stop_heartbeat();

        if self.state().has_live_socket() {
            self.transport.close();
        }

        let closed = self.clients.close_all();
        self.metrics.report_downstream_clients(0);

        let now = self.clock.now();
        self.lifecycle
            .transition_to_stopped(now, Some("shutdown requested".to_string()));
        self.metrics.report_state_change(self.lifecycle.current_state());

        tracing::info!(closed_clients = closed, "Relay bridge shut down");
    }

    fn open_upstream(&mut self) {
        let now = self.clock.now();
        self.lifecycle.transition_to_connecting(now);
        self.metrics.report_state_change(self.lifecycle.current_state());

        tracing::info!(url = %self.config.upstream_url(), "Connecting to upstream");
        self.transport.open(self.config.upstream_url());
    }

    fn on_upstream_opened(&mut self) {
        if self.state() != ConnectionState::Connecting {
            tracing::debug!(state = %self.state(), "Ignoring open event");
            return;
        }

        let now = self.clock.now();
        self.lifecycle
            .transition_to_connected(now, self.policy.base_interval());
        self.scheduler
            .start_heartbeat(self.config.heartbeat_interval());
        self.metrics.report_state_change(self.lifecycle.current_state());
        self.notify(BridgeNotice::Connected);

        tracing::info!(url = %self.config.upstream_url(), "Upstream connected");

        // Consumers learn about the recovery from one fresh status message.
        if !self.clients.is_empty() {
            match self.reality_status().encode() {
                Ok(frame) => self.fan_out(&frame),
                Err(e) => tracing::error!(error = %e, "Failed to encode status"),
            }
        }
    }

    fn on_upstream_closed(&mut self, reason: String) {
        if !self.state().has_live_socket() {
            tracing::debug!(state = %self.state(), %reason, "Ignoring close event");
            return;
        }

        self.scheduler.stop_heartbeat();
        let uptime_secs = self
            .lifecycle
            .uptime(self.clock.now())
            .map(|uptime| uptime.as_secs())
            .unwrap_or(0);
        tracing::warn!(%reason, uptime_secs, "Upstream disconnected");
        self.notify(BridgeNotice::Disconnected {
            reason: reason.clone(),
        });

        if !self.desired {
            return;
        }

        let now = self.clock.now();
        match self.lifecycle.begin_retry(&self.policy, now, Some(reason)) {
            Some((attempt, delay)) => {
                self.scheduler.schedule_reconnect(delay);
                self.metrics.report_reconnect_attempt();
                self.metrics.report_backoff(delay.as_secs_f64());
                self.metrics.report_state_change(self.lifecycle.current_state());

                tracing::info!(
                    attempt,
                    max_attempts = self.policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
            }
            None => {
                let attempts = self.lifecycle.reconnect_attempts();
                let error = RelayError::Exhausted(attempts);
                self.lifecycle
                    .transition_to_permanently_disconnected(now, Some(error.to_string()));
                self.metrics.report_state_change(self.lifecycle.current_state());
                self.notify(BridgeNotice::PermanentDisconnect { attempts });

                tracing::error!(error = %error, "Giving up on upstream");
            }
        }
    }

    fn on_reconnect_due(&mut self) {
        if !self.desired || !matches!(self.state(), ConnectionState::ReconnectScheduled { .. }) {
            tracing::debug!(state = %self.state(), "Stale reconnect timer");
            return;
        }

        self.open_upstream();
    }

    fn on_heartbeat_due(&mut self) {
        if !self.state().is_connected() {
            return;
        }

        let now = self.clock.now();
        if let Some(silence) = self
            .lifecycle
            .heartbeat_overdue(now, self.config.heartbeat_timeout())
        {
            tracing::warn!(error = %RelayError::Liveness(silence), "Closing half-open upstream");
            self.scheduler.stop_heartbeat();
            self.transport.close();
            return;
        }

        match RelayEvent::heartbeat(now_millis()).encode() {
            Ok(frame) => match self.transport.send(frame) {
                Ok(()) => self.lifecycle.record_heartbeat_sent(now),
                Err(e) => tracing::warn!(error = %e, "Heartbeat send failed"),
            },
            Err(e) => tracing::error!(error = %e, "Failed to encode heartbeat"),
        }
    }

    fn on_upstream_frame(&mut self, text: &str) {
        if !self.state().is_connected() {
            tracing::debug!(state = %self.state(), "Ignoring frame outside a live connection");
            return;
        }

        let event = match RelayEvent::decode(text) {
            Ok(event) => event,
            Err(ProtocolError::UnknownType(kind)) => {
                tracing::info!(%kind, "Ignoring unrecognized message type");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %RelayError::from(e), "Dropping inbound frame");
                return;
            }
        };

        match &event {
            RelayEvent::HeartbeatResponse { .. } => {
                self.lifecycle.record_heartbeat_ack(self.clock.now());
                tracing::trace!("Heartbeat acknowledged");
            }
            RelayEvent::RealityGenerated { data, .. } => self.store.record_reality(data),
            RelayEvent::ImaginationStatusUpdate { data, .. } => self.store.update_imagination(data),
            RelayEvent::MetricsUpdate { data, .. } => self.store.merge_metrics(data),
            RelayEvent::Heartbeat { .. } => {
                if let Err(e) = self.send_to_upstream(&RelayEvent::heartbeat_response(now_millis())) {
                    tracing::debug!(error = %e, "Could not answer upstream heartbeat");
                }
            }
            RelayEvent::RealityStatus { .. } => {
                tracing::debug!(kind = event.kind(), "Ignoring downstream-only message");
            }
        }

        if event.is_data() {
            self.republish(&event);
        }
    }

    fn republish(&mut self, event: &RelayEvent) {
        if self.clients.is_empty() {
            return;
        }

        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(kind = event.kind(), error = %e, "Failed to encode event");
                return;
            }
        };

        self.fan_out(&frame);
    }

    fn fan_out(&mut self, frame: &str) {
        let report = self
            .clients
            .fan_out(frame, self.config.backlog_threshold());
        self.metrics.report_fan_out(&report);
        if report.evicted > 0 || report.skipped_closed > 0 {
            self.metrics.report_downstream_clients(self.clients.len());
        }
    }

    fn notify(&self, notice: BridgeNotice) {
        // No subscriber is a normal condition.
        let _ = self.notices.send(notice);
    }
}
