use std::fmt;

/// Upstream connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Constructed, connect() not called yet
    #[default]
    Idle,
    /// Upstream socket is being opened
    Connecting,
    /// Upstream socket open, heartbeat running
    Connected,
    /// Connection lost, retry timer pending
    ReconnectScheduled { attempt: u32 },
    /// Reconnect budget spent
    PermanentlyDisconnected,
    /// shutdown() was called
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::ReconnectScheduled { attempt } => {
                write!(f, "RECONNECT_SCHEDULED (attempt {})", attempt)
            }
            Self::PermanentlyDisconnected => write!(f, "PERMANENTLY_DISCONNECTED"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl ConnectionState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::ReconnectScheduled { .. } => 3.0,
            Self::PermanentlyDisconnected => 4.0,
            Self::Stopped => 5.0,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Socket open or being opened
    pub fn has_live_socket(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// No socket and no timer; only `connect()` leaves PermanentlyDisconnected
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermanentlyDisconnected | Self::Stopped)
    }
}
