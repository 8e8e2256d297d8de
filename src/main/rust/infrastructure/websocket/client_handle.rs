use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::domain::errors::{RelayError, Result};
use crate::domain::ports::{ClientId, DownstreamClient};

/// Frames queued for a socket's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// Write-side bookkeeping shared between a handle and its writer task
#[derive(Debug)]
pub struct ClientOutbox {
    buffered: AtomicUsize,
    open: AtomicBool,
}

impl ClientOutbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            buffered: AtomicUsize::new(0),
            open: AtomicBool::new(true),
        })
    }

    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Called by the writer once `bytes` left the queue
    pub fn drained(&self, bytes: usize) {
        // Never underflow if a frame is accounted twice.
        let _ = self
            .buffered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    fn enqueued(&self, bytes: usize) {
        self.buffered.fetch_add(bytes, Ordering::AcqRel);
    }
}

/// A connected WebSocket consumer as seen by the relay.
///
/// Sends never block: frames go to an unbounded queue drained by the socket's
/// writer task, and the queued byte count is what backpressure checks read.
pub struct ClientHandle {
    id: ClientId,
    outbound: UnboundedSender<OutboundFrame>,
    outbox: Arc<ClientOutbox>,
}

impl ClientHandle {
    pub fn new(id: ClientId, outbound: UnboundedSender<OutboundFrame>, outbox: Arc<ClientOutbox>) -> Self {
        Self {
            id,
            outbound,
            outbox,
        }
    }
}

impl DownstreamClient for ClientHandle {
    fn id(&self) -> ClientId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.outbox.is_open() && !self.outbound.is_closed()
    }

    fn buffered_amount(&self) -> usize {
        self.outbox.buffered()
    }

    fn send(&self, frame: &str) -> Result<()> {
        if !self.outbox.is_open() {
            return Err(RelayError::Transport(format!("client {} is closed", self.id)));
        }

        self.outbox.enqueued(frame.len());
        self.outbound
            .send(OutboundFrame::Text(frame.to_string()))
            .map_err(|_| {
                self.outbox.mark_closed();
                self.outbox.drained(frame.len());
                RelayError::Transport(format!("client {} writer is gone", self.id))
            })
    }

    fn close(&self) {
        if self.outbox.is_open() {
            self.outbox.mark_closed();
            let _ = self.outbound.send(OutboundFrame::Close);
        }
    }
}
