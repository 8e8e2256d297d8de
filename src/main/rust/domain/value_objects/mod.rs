mod bridge_config;
mod broadcast_config;
mod connection_state;
mod reconnect_policy;
mod relay_event;
mod service_metrics;

pub use bridge_config::{BridgeConfig, DEFAULT_BACKLOG_THRESHOLD, DEFAULT_HEARTBEAT_INTERVAL};
pub use broadcast_config::{frame_interval, BroadcastConfig};
pub use connection_state::ConnectionState;
pub use reconnect_policy::ReconnectPolicy;
pub use relay_event::{now_millis, RealityStatus, RelayEvent, KNOWN_TYPES};
pub use service_metrics::{FanOutReport, ServiceMetrics};
