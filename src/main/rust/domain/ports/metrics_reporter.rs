use crate::domain::value_objects::{ConnectionState, FanOutReport};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_state_change(&self, state: &ConnectionState);
    fn report_reconnect_attempt(&self);
    fn report_backoff(&self, delay_secs: f64);
    fn report_downstream_clients(&self, count: usize);
    fn report_fan_out(&self, report: &FanOutReport);
    fn report_fps(&self, fps: u32);
}
