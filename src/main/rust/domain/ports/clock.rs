use std::time::Instant;

/// Source of monotonic time for timeouts and rate gating
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}
