use crate::domain::errors::{RelayError, Result};
use crate::domain::ports::{ClientId, DownstreamClient};
use crate::domain::value_objects::FanOutReport;

/// Attached consumer sockets, in attach order
#[derive(Default)]
pub struct DownstreamRegistry {
    clients: Vec<Box<dyn DownstreamClient>>,
}

impl DownstreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.iter().any(|client| client.id() == id)
    }

    pub fn add(&mut self, client: Box<dyn DownstreamClient>) {
        if self.contains(client.id()) {
            tracing::debug!(client = %client.id(), "Client already attached");
            return;
        }
        self.clients.push(client);
    }

    pub fn remove(&mut self, id: ClientId) -> Option<Box<dyn DownstreamClient>> {
        let index = self.clients.iter().position(|client| client.id() == id)?;
        Some(self.clients.remove(index))
    }

    /// Send to a single attached client, evicting it if the send fails
    pub fn send_to(&mut self, id: ClientId, frame: &str) -> Result<()> {
        let client = self
            .clients
            .iter()
            .find(|client| client.id() == id)
            .ok_or_else(|| RelayError::Transport(format!("client {} not attached", id)))?;

        if let Err(e) = client.send(frame) {
            self.remove(id);
            return Err(e);
        }
        Ok(())
    }

    /// Deliver `frame` to every open client whose backlog is within
    /// `backlog_threshold`.
    ///
    /// Decisions are per client: an over-threshold client loses this frame
    /// only, a failed send evicts that client only. Evictions are applied
    /// after the pass.
    pub fn fan_out(&mut self, frame: &str, backlog_threshold: usize) -> FanOutReport {
        let mut report = FanOutReport::default();
        let mut stale = Vec::new();

        for client in &self.clients {
            if !client.is_open() {
                report.skipped_closed += 1;
                stale.push(client.id());
                continue;
            }

            let buffered = client.buffered_amount();
            if buffered > backlog_threshold {
                report.dropped_backpressure += 1;
                tracing::debug!(
                    client = %client.id(),
                    "Frame dropped: {}",
                    RelayError::Capacity {
                        buffered,
                        threshold: backlog_threshold,
                    }
                );
                continue;
            }

            match client.send(frame) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(client = %client.id(), error = %e, "Evicting client after failed send");
                    report.evicted += 1;
                    stale.push(client.id());
                }
            }
        }

        if !stale.is_empty() {
            self.clients.retain(|client| !stale.contains(&client.id()));
        }

        report
    }

    /// Close and forget every client
    pub fn close_all(&mut self) -> usize {
        let closed = self.clients.len();
        for client in self.clients.drain(..) {
            client.close();
        }
        closed
    }
}
