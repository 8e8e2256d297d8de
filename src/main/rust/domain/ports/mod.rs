mod aggregate_store;
mod clock;
mod downstream_client;
mod metrics_reporter;
mod scheduler;
mod upstream_transport;

pub use aggregate_store::AggregateStore;
pub use clock::Clock;
pub use downstream_client::{ClientId, DownstreamClient};
pub use metrics_reporter::MetricsReporter;
pub use scheduler::Scheduler;
pub use upstream_transport::UpstreamTransport;
