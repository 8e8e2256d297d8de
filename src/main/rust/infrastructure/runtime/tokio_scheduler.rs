use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::application::services::BridgeInput;
use crate::domain::ports::Scheduler;

/// Timers as abortable tokio tasks that post back into the bridge loop
pub struct TokioScheduler {
    inputs: UnboundedSender<BridgeInput>,
    reconnect: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(inputs: UnboundedSender<BridgeInput>) -> Self {
        Self {
            inputs,
            reconnect: None,
            heartbeat: None,
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_reconnect(&mut self, delay: Duration) {
        self.cancel_reconnect();

        let inputs = self.inputs.clone();
        self.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(BridgeInput::ReconnectDue);
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(handle) = self.reconnect.take() {
            handle.abort();
        }
    }

    fn start_heartbeat(&mut self, interval: Duration) {
        self.stop_heartbeat();

        let inputs = self.inputs.clone();
        self.heartbeat = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                if inputs.send(BridgeInput::HeartbeatDue).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_heartbeat(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }

    fn active_timers(&self) -> usize {
        [&self.reconnect, &self.heartbeat]
            .into_iter()
            .filter(|timer| matches!(timer, Some(handle) if !handle.is_finished()))
            .count()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_reconnect();
        self.stop_heartbeat();
    }
}
