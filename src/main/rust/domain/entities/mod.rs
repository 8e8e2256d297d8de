mod connection_lifecycle;
mod downstream_registry;

pub use connection_lifecycle::{ConnectionLifecycle, StateTransition};
pub use downstream_registry::DownstreamRegistry;
