pub mod metrics;
pub mod runtime;
pub mod store;
pub mod websocket;
