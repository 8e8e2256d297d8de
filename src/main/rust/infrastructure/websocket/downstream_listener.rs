use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use crate::domain::errors::{RelayError, Result};
use crate::domain::ports::ClientId;

use super::client_handle::{ClientHandle, ClientOutbox, OutboundFrame};

/// Where a downstream socket's lifecycle gets reported.
///
/// Implemented by the input channels of the bridge and broadcaster event loops.
pub trait ClientEvents: Clone + Send + 'static {
    fn attached(&self, client: ClientHandle);

    fn frame(&self, id: ClientId, text: String);

    fn detached(&self, id: ClientId);
}

/// Accepts downstream WebSocket consumers
pub struct DownstreamListener {
    listener: TcpListener,
}

impl DownstreamListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Transport(format!("bind {}: {}", addr, e)))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    /// Accept until `shutdown` resolves
    pub async fn run<E, F>(self, events: E, shutdown: F)
    where
        E: ClientEvents,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Downstream listener stopped");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let events = events.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_client(stream, peer, events).await {
                                tracing::warn!(%peer, error = %e, "Downstream client error");
                            }
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "Downstream accept failed"),
                },
            }
        }
    }
}

async fn serve_client<E: ClientEvents>(stream: TcpStream, peer: SocketAddr, events: E) -> Result<()> {
    let ws = accept_async(stream)
        .await
        .map_err(|e| RelayError::Transport(format!("handshake from {}: {}", peer, e)))?;

    let id = ClientId::new();
    let (sink, mut source) = ws.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let outbox = ClientOutbox::new();

    tokio::spawn(pump_outbound(sink, outbound_rx, outbox.clone()));
    events.attached(ClientHandle::new(id, outbound_tx, outbox.clone()));
    tracing::debug!(%peer, client = %id, "Downstream socket accepted");

    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => events.frame(id, text.as_str().to_string()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(client = %id, error = %e, "Downstream read failed");
                break;
            }
        }
    }

    outbox.mark_closed();
    events.detached(id);
    tracing::debug!(%peer, client = %id, "Downstream socket closed");
    Ok(())
}

/// Writer half: drains queued frames onto the socket
async fn pump_outbound(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut outbound: UnboundedReceiver<OutboundFrame>,
    outbox: Arc<ClientOutbox>,
) {
    while let Some(frame) = outbound.recv().await {
        match frame {
            OutboundFrame::Text(text) => {
                let len = text.len();
                let sent = sink.send(Message::Text(text.into())).await;
                outbox.drained(len);
                if sent.is_err() {
                    outbox.mark_closed();
                    break;
                }
            }
            OutboundFrame::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
    outbox.mark_closed();
}
