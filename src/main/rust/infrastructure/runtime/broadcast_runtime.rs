use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::services::AdaptiveBroadcaster;
use crate::domain::errors::{RelayError, Result};
use crate::domain::ports::{ClientId, Clock, DownstreamClient, MetricsReporter};
use crate::domain::value_objects::{BroadcastConfig, RelayEvent, ServiceMetrics};
use crate::infrastructure::websocket::{ClientEvents, ClientHandle};

/// Inputs of the broadcaster event loop
pub enum BroadcastInput {
    Attach(Box<dyn DownstreamClient>),
    Detach(ClientId),
    SinkFrame { id: ClientId, text: String },
    Publish(RelayEvent),
    Shutdown,
}

#[derive(Clone)]
pub struct BroadcastHandle {
    inputs: UnboundedSender<BroadcastInput>,
    metrics: watch::Receiver<ServiceMetrics>,
}

impl BroadcastHandle {
    pub fn publish(&self, event: RelayEvent) -> Result<()> {
        self.post(BroadcastInput::Publish(event))
    }

    pub fn attach(&self, sink: Box<dyn DownstreamClient>) -> Result<()> {
        self.post(BroadcastInput::Attach(sink))
    }

    pub fn detach(&self, id: ClientId) -> Result<()> {
        self.post(BroadcastInput::Detach(id))
    }

    pub fn service_metrics(&self) -> ServiceMetrics {
        self.metrics.borrow().clone()
    }

    pub fn metrics_receiver(&self) -> watch::Receiver<ServiceMetrics> {
        self.metrics.clone()
    }

    pub fn shutdown(&self) -> Result<()> {
        self.post(BroadcastInput::Shutdown)
    }

    fn post(&self, input: BroadcastInput) -> Result<()> {
        self.inputs.send(input).map_err(|_| RelayError::RelayStopped)
    }
}

impl ClientEvents for BroadcastHandle {
    fn attached(&self, client: ClientHandle) {
        if self.attach(Box::new(client)).is_err() {
            tracing::debug!("Broadcaster stopped; dropping new sink");
        }
    }

    fn frame(&self, id: ClientId, text: String) {
        let _ = self.post(BroadcastInput::SinkFrame { id, text });
    }

    fn detached(&self, id: ClientId) {
        let _ = self.detach(id);
    }
}

/// Hosts an [`AdaptiveBroadcaster`] on its own tokio task
pub struct BroadcastRuntime;

impl BroadcastRuntime {
    pub fn start(
        config: BroadcastConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> (BroadcastHandle, JoinHandle<()>) {
        let mut broadcaster = AdaptiveBroadcaster::new(config, clock, metrics);
        let (inputs, mut receiver) = mpsc::unbounded_channel();
        let (metrics_tx, metrics_rx) = watch::channel(broadcaster.service_metrics());

        let task = tokio::spawn(async move {
            while let Some(input) = receiver.recv().await {
                match input {
                    BroadcastInput::Attach(sink) => broadcaster.attach(sink),
                    BroadcastInput::Detach(id) => broadcaster.detach(id),
                    BroadcastInput::SinkFrame { id, text } => {
                        broadcaster.handle_sink_frame(id, &text)
                    }
                    BroadcastInput::Publish(event) => {
                        broadcaster.offer(&event);
                    }
                    BroadcastInput::Shutdown => {
                        let closed = broadcaster.close_all();
                        tracing::info!(closed_sinks = closed, "Broadcaster shut down");
                        metrics_tx.send_replace(broadcaster.service_metrics());
                        break;
                    }
                }
                metrics_tx.send_replace(broadcaster.service_metrics());
            }
        });

        (
            BroadcastHandle {
                inputs,
                metrics: metrics_rx,
            },
            task,
        )
    }
}
