mod bridge_runtime;
mod broadcast_runtime;
mod clock;
mod tokio_scheduler;

pub use bridge_runtime::{BridgeRuntime, RelayHandle};
pub use broadcast_runtime::{BroadcastHandle, BroadcastInput, BroadcastRuntime};
pub use clock::{ManualClock, SystemClock};
pub use tokio_scheduler::TokioScheduler;
