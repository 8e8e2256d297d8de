use std::fmt;

use uuid::Uuid;

use crate::domain::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Port for an attached consumer socket
pub trait DownstreamClient: Send {
    fn id(&self) -> ClientId;

    fn is_open(&self) -> bool;

    /// Bytes queued for this client but not yet written to the wire
    fn buffered_amount(&self) -> usize;

    fn send(&self, frame: &str) -> Result<()>;

    fn close(&self);
}
