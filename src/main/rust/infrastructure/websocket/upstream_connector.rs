use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::application::services::BridgeInput;
use crate::domain::errors::{RelayError, Result};
use crate::domain::ports::UpstreamTransport;

/// Upper bound on any single socket write, including the close handshake
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upstream WebSocket client driven by one tokio task per connection.
///
/// Every `open` ends in exactly one [`BridgeInput::UpstreamClosed`], whether
/// the dial failed, the peer went away or `close` was called.
pub struct WsUpstreamTransport {
    inputs: UnboundedSender<BridgeInput>,
    outbound: Option<UnboundedSender<String>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl WsUpstreamTransport {
    pub fn new(inputs: UnboundedSender<BridgeInput>) -> Self {
        Self {
            inputs,
            outbound: None,
            shutdown: None,
        }
    }
}

impl UpstreamTransport for WsUpstreamTransport {
    fn open(&mut self, url: &str) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.outbound = Some(outbound_tx);
        self.shutdown = Some(shutdown_tx);

        let inputs = self.inputs.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            let reason = run_connection(&url, &inputs, outbound_rx, shutdown_rx).await;
            tracing::debug!(%url, %reason, "Upstream connection task finished");
            let _ = inputs.send(BridgeInput::UpstreamClosed { reason });
        });
    }

    fn send(&mut self, frame: String) -> Result<()> {
        let outbound = self.outbound.as_ref().ok_or(RelayError::NotConnected)?;
        outbound
            .send(frame)
            .map_err(|_| RelayError::Transport("upstream writer is gone".to_string()))
    }

    fn close(&mut self) {
        self.outbound = None;
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Drive one upstream socket until it ends; returns the close reason
async fn run_connection(
    url: &str,
    inputs: &UnboundedSender<BridgeInput>,
    mut outbound: UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<()>,
) -> String {
    let dialed = tokio::select! {
        result = connect_async(url) => result,
        _ = &mut shutdown => return "closed before open".to_string(),
    };

    let ws = match dialed {
        Ok((ws, _response)) => ws,
        Err(e) => return RelayError::Transport(e.to_string()).to_string(),
    };

    if inputs.send(BridgeInput::UpstreamOpened).is_err() {
        return "bridge stopped".to_string();
    }

    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = tokio::time::timeout(WRITE_TIMEOUT, sink.send(Message::Close(None))).await;
                return "closed locally".to_string();
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = tokio::time::timeout(WRITE_TIMEOUT, sink.send(Message::Close(None))).await;
                    return "transport released".to_string();
                };
                match tokio::time::timeout(WRITE_TIMEOUT, sink.send(Message::Text(frame.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return RelayError::Transport(e.to_string()).to_string(),
                    Err(_) => return "upstream write stalled".to_string(),
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if inputs.send(BridgeInput::UpstreamFrame(text.as_str().to_string())).is_err() {
                            return "bridge stopped".to_string();
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return match frame {
                            Some(frame) if !frame.reason.as_str().is_empty() => {
                                format!("closed by upstream: {}", frame.reason.as_str())
                            }
                            _ => "closed by upstream".to_string(),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return RelayError::Transport(e.to_string()).to_string(),
                    None => return "upstream stream ended".to_string(),
                }
            }
        }
    }
}
