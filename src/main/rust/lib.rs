pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    AdaptiveBroadcaster, BridgeInput, BridgeNotice, BridgePorts, BridgeStatus, BroadcastOutcome,
    RelayBridge,
};
pub use config::Config;
pub use domain::entities::{ConnectionLifecycle, DownstreamRegistry, StateTransition};
pub use domain::errors::{ProtocolError, RelayError, Result};
pub use domain::ports::{
    AggregateStore, ClientId, Clock, DownstreamClient, MetricsReporter, Scheduler,
    UpstreamTransport,
};
pub use domain::value_objects::{
    BridgeConfig, BroadcastConfig, ConnectionState, FanOutReport, RealityStatus, ReconnectPolicy,
    RelayEvent, ServiceMetrics,
};
pub use infrastructure::metrics::{serve_metrics, PrometheusReporter};
pub use infrastructure::runtime::{
    BridgeRuntime, BroadcastHandle, BroadcastRuntime, ManualClock, RelayHandle, SystemClock,
};
pub use infrastructure::store::InMemoryAggregateStore;
pub use infrastructure::websocket::{ClientHandle, DownstreamListener, WsUpstreamTransport};
