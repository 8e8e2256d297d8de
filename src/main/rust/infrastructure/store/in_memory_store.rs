use std::collections::VecDeque;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::ports::AggregateStore;

/// Realities kept for the status snapshot
const RECENT_LIMIT: usize = 10;

/// Last-known reality generation state, held in process memory
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryAggregateStore {
    active: bool,
    cpu_utilization: f64,
    total_realities: u64,
    last_reality: Option<Value>,
    recent_realities: VecDeque<Value>,
    metrics: Map<String, Value>,
}

impl InMemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_realities(&self) -> u64 {
        self.total_realities
    }
}

impl AggregateStore for InMemoryAggregateStore {
    fn record_reality(&mut self, data: &Value) {
        self.total_realities += 1;
        if self.recent_realities.len() == RECENT_LIMIT {
            self.recent_realities.pop_front();
        }
        self.recent_realities.push_back(data.clone());
        self.last_reality = Some(data.clone());
    }

    fn update_imagination(&mut self, data: &Value) {
        if let Some(active) = data.get("active").and_then(Value::as_bool) {
            self.active = active;
        }
        if let Some(cpu) = data.get("cpuUtilization").and_then(Value::as_f64) {
            self.cpu_utilization = cpu;
        }
    }

    /// Shallow merge; non-object payloads are ignored
    fn merge_metrics(&mut self, data: &Value) {
        match data.as_object() {
            Some(fields) => {
                for (key, value) in fields {
                    self.metrics.insert(key.clone(), value.clone());
                }
            }
            None => tracing::debug!("Ignoring non-object metrics payload"),
        }
    }

    fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to snapshot aggregate state");
            Value::Null
        })
    }
}
