mod adaptive_broadcaster;
mod relay_bridge;

pub use adaptive_broadcaster::{AdaptiveBroadcaster, BroadcastOutcome};
pub use relay_bridge::{BridgeInput, BridgeNotice, BridgePorts, BridgeStatus, RelayBridge};
