use crate::domain::errors::Result;

/// Port for the single upstream socket.
///
/// `open` returns immediately; the outcome (opened, frames, closed) is fed
/// back to the bridge as inputs. Every `open` yields exactly one closed
/// notification, including when `close` is called mid-handshake.
pub trait UpstreamTransport: Send {
    fn open(&mut self, url: &str);

    fn send(&mut self, frame: String) -> Result<()>;

    fn close(&mut self);
}
