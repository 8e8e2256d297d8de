mod client_handle;
mod downstream_listener;
mod upstream_connector;

pub use client_handle::{ClientHandle, ClientOutbox, OutboundFrame};
pub use downstream_listener::{ClientEvents, DownstreamListener};
pub use upstream_connector::WsUpstreamTransport;
