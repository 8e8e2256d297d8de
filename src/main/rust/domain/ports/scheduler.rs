use std::time::Duration;

/// Port for the bridge's timers.
///
/// Implementations deliver expirations back to the owning event loop; they
/// never call into the bridge directly.
pub trait Scheduler: Send {
    /// Arm the one-shot reconnect timer, replacing any pending one
    fn schedule_reconnect(&mut self, delay: Duration);

    fn cancel_reconnect(&mut self);

    /// Start the periodic heartbeat timer, replacing any running one
    fn start_heartbeat(&mut self, interval: Duration);

    fn stop_heartbeat(&mut self);

    /// Number of timers still armed
    fn active_timers(&self) -> usize;
}
