use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

use crate::application::services::{
    BridgeInput, BridgeNotice, BridgePorts, BridgeStatus, RelayBridge,
};
use crate::domain::errors::{RelayError, Result};
use crate::domain::ports::{AggregateStore, ClientId, DownstreamClient, MetricsReporter};
use crate::domain::value_objects::{BridgeConfig, ReconnectPolicy};
use crate::infrastructure::websocket::{ClientEvents, ClientHandle, WsUpstreamTransport};

use super::{SystemClock, TokioScheduler};

/// Cloneable front door to a running bridge event loop
#[derive(Clone)]
pub struct RelayHandle {
    inputs: UnboundedSender<BridgeInput>,
    status: watch::Receiver<BridgeStatus>,
    notices: broadcast::Sender<BridgeNotice>,
}

impl RelayHandle {
    pub fn connect(&self) -> Result<()> {
        self.post(BridgeInput::Connect)
    }

    pub fn attach(&self, client: Box<dyn DownstreamClient>) -> Result<()> {
        self.post(BridgeInput::ClientAttached(client))
    }

    pub fn detach(&self, id: ClientId) -> Result<()> {
        self.post(BridgeInput::ClientDetached(id))
    }

    pub async fn send_to_upstream(&self, message: Value) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        self.post(BridgeInput::SendUpstream { message, reply })?;
        outcome.await.map_err(|_| RelayError::RelayStopped)?
    }

    /// Latest status published by the event loop
    pub fn status(&self) -> BridgeStatus {
        self.status.borrow().clone()
    }

    pub fn status_receiver(&self) -> watch::Receiver<BridgeStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeNotice> {
        self.notices.subscribe()
    }

    pub fn shutdown(&self) -> Result<()> {
        self.post(BridgeInput::Shutdown)
    }

    fn post(&self, input: BridgeInput) -> Result<()> {
        self.inputs.send(input).map_err(|_| RelayError::RelayStopped)
    }
}

impl ClientEvents for RelayHandle {
    fn attached(&self, client: ClientHandle) {
        if self.attach(Box::new(client)).is_err() {
            tracing::debug!("Bridge stopped; dropping new client");
        }
    }

    fn frame(&self, id: ClientId, text: String) {
        tracing::trace!(client = %id, bytes = text.len(), "Ignoring downstream frame");
    }

    fn detached(&self, id: ClientId) {
        let _ = self.detach(id);
    }
}

/// Hosts a [`RelayBridge`] on its own tokio task
pub struct BridgeRuntime;

impl BridgeRuntime {
    /// Spawn the event loop with WebSocket transport and tokio timers
    pub fn start(
        config: BridgeConfig,
        policy: ReconnectPolicy,
        store: Box<dyn AggregateStore>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> (RelayHandle, JoinHandle<()>) {
        let (inputs, receiver) = mpsc::unbounded_channel();

        let ports = BridgePorts {
            transport: Box::new(WsUpstreamTransport::new(inputs.clone())),
            scheduler: Box::new(TokioScheduler::new(inputs.clone())),
            clock: Arc::new(SystemClock),
            store,
            metrics,
        };
        let bridge = RelayBridge::new(config, policy, ports);

        Self::spawn(bridge, inputs, receiver)
    }

    /// Spawn the event loop around an already assembled bridge.
    ///
    /// `inputs` must be the sender whose receiver is passed alongside, and
    /// the bridge's ports must post into it.
    pub fn spawn(
        mut bridge: RelayBridge,
        inputs: UnboundedSender<BridgeInput>,
        mut receiver: UnboundedReceiver<BridgeInput>,
    ) -> (RelayHandle, JoinHandle<()>) {
        let (status_tx, status_rx) = watch::channel(bridge.status());
        let notices = bridge.notice_sender();

        let task = tokio::spawn(async move {
            while let Some(input) = receiver.recv().await {
                let stop = matches!(input, BridgeInput::Shutdown);
                bridge.handle(input);
                status_tx.send_if_modified(|current| {
                    let next = bridge.status();
                    let changed = *current != next;
                    *current = next;
                    changed
                });
                if stop {
                    break;
                }
            }
            tracing::debug!("Bridge event loop finished");
        });

        let handle = RelayHandle {
            inputs,
            status: status_rx,
            notices,
        };
        (handle, task)
    }
}
