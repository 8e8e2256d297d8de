use std::time::Duration;

use thiserror::Error;

/// Reasons an inbound frame could not be routed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Frame has no \"type\" field")]
    MissingType,

    #[error("Unrecognized message type: {0}")]
    UnknownType(String),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid upstream URL: {0}")]
    InvalidUpstreamUrl(String),

    #[error("Invalid backoff factor: must be > 1.0")]
    InvalidBackoffFactor,

    #[error("Invalid reconnect interval: {0}")]
    InvalidReconnectInterval(String),

    #[error("Invalid heartbeat interval: cannot be zero")]
    InvalidHeartbeatInterval,

    #[error("Invalid frame rate: must be at least 1 fps")]
    InvalidFrameRate,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("No heartbeat acknowledgement for {0:?}")]
    Liveness(Duration),

    #[error("Client backlog of {buffered} bytes exceeds {threshold} bytes")]
    Capacity { buffered: usize, threshold: usize },

    #[error("Reconnect attempts exhausted after {0} attempts")]
    Exhausted(u32),

    #[error("Upstream not connected")]
    NotConnected,

    #[error("Relay stopped")]
    RelayStopped,
}

pub type Result<T> = std::result::Result<T, RelayError>;
