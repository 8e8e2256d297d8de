use serde_json::Value;

/// Port for the aggregate state updated by inbound upstream events
pub trait AggregateStore: Send {
    fn record_reality(&mut self, data: &Value);

    fn update_imagination(&mut self, data: &Value);

    /// Shallow-merge a metrics object into the aggregate
    fn merge_metrics(&mut self, data: &Value);

    /// Last-known aggregate, sent as `realityGeneration` in status messages
    fn snapshot(&self) -> Value;
}
