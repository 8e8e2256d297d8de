use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::domain::value_objects::{ConnectionState, ReconnectPolicy};

/// Transitions kept for diagnostics
const HISTORY_LIMIT: usize = 64;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// The bridge's single upstream connection
#[derive(Debug)]
pub struct ConnectionLifecycle {
    current_state: ConnectionState,
    state_history: VecDeque<StateTransition>,
    reconnect_attempts: u32,
    current_backoff: Duration,
    connected_at: Option<Instant>,
    last_heartbeat_sent_at: Option<Instant>,
    last_heartbeat_ack_at: Option<Instant>,
    unacked_since: Option<Instant>,
}

impl ConnectionLifecycle {
    pub fn new(base_backoff: Duration) -> Self {
        Self {
            current_state: ConnectionState::Idle,
            state_history: VecDeque::new(),
            reconnect_attempts: 0,
            current_backoff: base_backoff,
            connected_at: None,
            last_heartbeat_sent_at: None,
            last_heartbeat_ack_at: None,
            unacked_since: None,
        }
    }

    pub fn current_state(&self) -> &ConnectionState {
        &self.current_state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    pub fn last_heartbeat_sent_at(&self) -> Option<Instant> {
        self.last_heartbeat_sent_at
    }

    pub fn last_heartbeat_ack_at(&self) -> Option<Instant> {
        self.last_heartbeat_ack_at
    }

    pub fn uptime(&self, now: Instant) -> Option<Duration> {
        self.connected_at
            .map(|since| now.saturating_duration_since(since))
    }

    pub fn transition_count(&self) -> usize {
        self.state_history.len()
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.back()
    }

    pub fn transition_to_connecting(&mut self, now: Instant) {
        self.record_transition(ConnectionState::Connecting, now, None);
    }

    /// Successful open: retry bookkeeping starts over
    pub fn transition_to_connected(&mut self, now: Instant, base_backoff: Duration) {
        self.record_transition(ConnectionState::Connected, now, None);
        self.reconnect_attempts = 0;
        self.current_backoff = base_backoff;
        self.connected_at = Some(now);
        self.last_heartbeat_sent_at = None;
        self.last_heartbeat_ack_at = None;
        self.unacked_since = None;
    }

    /// Consume one retry from the budget.
    ///
    /// Returns the attempt number and the delay to wait before it, then grows
    /// the backoff for the next failure. `None` when the budget is spent.
    pub fn begin_retry(
        &mut self,
        policy: &ReconnectPolicy,
        now: Instant,
        reason: Option<String>,
    ) -> Option<(u32, Duration)> {
        let delay = policy.delay_for_attempt(self.reconnect_attempts + 1)?;

        self.reconnect_attempts += 1;
        self.current_backoff = policy.next_delay(delay);
        self.connected_at = None;
        self.record_transition(
            ConnectionState::ReconnectScheduled {
                attempt: self.reconnect_attempts,
            },
            now,
            reason,
        );
        Some((self.reconnect_attempts, delay))
    }

    pub fn transition_to_permanently_disconnected(&mut self, now: Instant, reason: Option<String>) {
        self.connected_at = None;
        self.record_transition(ConnectionState::PermanentlyDisconnected, now, reason);
    }

    pub fn transition_to_stopped(&mut self, now: Instant, reason: Option<String>) {
        self.connected_at = None;
        self.record_transition(ConnectionState::Stopped, now, reason);
    }

    /// Start a fresh retry cycle after a permanent disconnect
    pub fn reset_retries(&mut self, base_backoff: Duration) {
        self.reconnect_attempts = 0;
        self.current_backoff = base_backoff;
    }

    pub fn record_heartbeat_sent(&mut self, now: Instant) {
        self.last_heartbeat_sent_at = Some(now);
        if self.unacked_since.is_none() {
            self.unacked_since = Some(now);
        }
    }

    pub fn record_heartbeat_ack(&mut self, now: Instant) {
        self.last_heartbeat_ack_at = Some(now);
        self.unacked_since = None;
    }

    /// Silence since the oldest unacknowledged heartbeat, if it reached `timeout`
    pub fn heartbeat_overdue(&self, now: Instant, timeout: Duration) -> Option<Duration> {
        let silence = now.saturating_duration_since(self.unacked_since?);
        (silence >= timeout).then_some(silence)
    }

    fn record_transition(&mut self, new_state: ConnectionState, now: Instant, reason: Option<String>) {
        let transition = StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: now,
            reason,
        };

        if self.state_history.len() == HISTORY_LIMIT {
            self.state_history.pop_front();
        }
        self.state_history.push_back(transition);
        self.current_state = new_state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(
            max_attempts,
            Duration::from_millis(5_000),
            1.5,
            Duration::from_millis(60_000),
        )
        .unwrap()
    }

    #[test]
    fn test_initial_state_is_idle() {
        let lifecycle = ConnectionLifecycle::new(Duration::from_secs(5));
        assert_eq!(*lifecycle.current_state(), ConnectionState::Idle);
        assert_eq!(lifecycle.transition_count(), 0);
        assert_eq!(lifecycle.reconnect_attempts(), 0);
    }

    #[test]
    fn test_transitions_are_tracked() {
        let now = Instant::now();
        let mut lifecycle = ConnectionLifecycle::new(Duration::from_secs(5));

        lifecycle.transition_to_connecting(now);
        lifecycle.transition_to_connected(now, Duration::from_secs(5));

        assert_eq!(lifecycle.transition_count(), 2);
        assert_eq!(*lifecycle.current_state(), ConnectionState::Connected);

        let last = lifecycle.last_transition().unwrap();
        assert_eq!(last.from, ConnectionState::Connecting);
        assert_eq!(last.to, ConnectionState::Connected);
    }

    #[test]
    fn test_begin_retry_grows_backoff() {
        let now = Instant::now();
        let policy = policy(5);
        let mut lifecycle = ConnectionLifecycle::new(policy.base_interval());

        let first = lifecycle.begin_retry(&policy, now, None).unwrap();
        let second = lifecycle.begin_retry(&policy, now, None).unwrap();

        assert_eq!(first, (1, Duration::from_millis(5_000)));
        assert_eq!(second, (2, Duration::from_millis(7_500)));
        assert_eq!(lifecycle.current_backoff(), Duration::from_millis(11_250));
        assert_eq!(
            *lifecycle.current_state(),
            ConnectionState::ReconnectScheduled { attempt: 2 }
        );
    }

    #[test]
    fn test_begin_retry_follows_attempt_schedule() {
        let now = Instant::now();
        let policy = ReconnectPolicy::default();
        let mut lifecycle = ConnectionLifecycle::new(policy.base_interval());

        for attempt in 1..=policy.max_attempts() {
            let (n, delay) = lifecycle.begin_retry(&policy, now, None).unwrap();
            assert_eq!(n, attempt);
            assert_eq!(Some(delay), policy.delay_for_attempt(attempt));
        }
        assert!(lifecycle.begin_retry(&policy, now, None).is_none());
    }

    #[test]
    fn test_begin_retry_with_huge_factor_caps_delay() {
        let now = Instant::now();
        let policy =
            ReconnectPolicy::new(3, Duration::from_secs(5), 1e300, Duration::from_secs(60))
                .unwrap();
        let mut lifecycle = ConnectionLifecycle::new(policy.base_interval());

        assert_eq!(
            lifecycle.begin_retry(&policy, now, None),
            Some((1, Duration::from_secs(5)))
        );
        assert_eq!(
            lifecycle.begin_retry(&policy, now, None),
            Some((2, Duration::from_secs(60)))
        );
        assert_eq!(lifecycle.current_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn test_begin_retry_stops_at_budget() {
        let now = Instant::now();
        let policy = policy(2);
        let mut lifecycle = ConnectionLifecycle::new(policy.base_interval());

        assert!(lifecycle.begin_retry(&policy, now, None).is_some());
        assert!(lifecycle.begin_retry(&policy, now, None).is_some());
        assert!(lifecycle.begin_retry(&policy, now, None).is_none());
        assert_eq!(lifecycle.reconnect_attempts(), 2);
    }

    #[test]
    fn test_connected_resets_retry_state() {
        let now = Instant::now();
        let policy = policy(5);
        let mut lifecycle = ConnectionLifecycle::new(policy.base_interval());

        lifecycle.begin_retry(&policy, now, None);
        lifecycle.begin_retry(&policy, now, None);
        lifecycle.transition_to_connecting(now);
        lifecycle.transition_to_connected(now, policy.base_interval());

        assert_eq!(lifecycle.reconnect_attempts(), 0);
        assert_eq!(lifecycle.current_backoff(), policy.base_interval());
    }

    #[test]
    fn test_heartbeat_overdue_tracks_oldest_unacked() {
        let start = Instant::now();
        let timeout = Duration::from_secs(60);
        let mut lifecycle = ConnectionLifecycle::new(Duration::from_secs(5));

        assert!(lifecycle.heartbeat_overdue(start, timeout).is_none());

        lifecycle.record_heartbeat_sent(start);
        lifecycle.record_heartbeat_sent(start + Duration::from_secs(30));

        assert!(lifecycle
            .heartbeat_overdue(start + Duration::from_secs(59), timeout)
            .is_none());
        assert_eq!(
            lifecycle.heartbeat_overdue(start + Duration::from_secs(60), timeout),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_heartbeat_ack_clears_overdue() {
        let start = Instant::now();
        let timeout = Duration::from_secs(60);
        let mut lifecycle = ConnectionLifecycle::new(Duration::from_secs(5));

        lifecycle.record_heartbeat_sent(start);
        lifecycle.record_heartbeat_ack(start + Duration::from_secs(1));

        assert!(lifecycle
            .heartbeat_overdue(start + Duration::from_secs(120), timeout)
            .is_none());
        assert_eq!(
            lifecycle.last_heartbeat_ack_at(),
            Some(start + Duration::from_secs(1))
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let now = Instant::now();
        let mut lifecycle = ConnectionLifecycle::new(Duration::from_secs(5));
        for _ in 0..(HISTORY_LIMIT + 10) {
            lifecycle.transition_to_connecting(now);
        }
        assert_eq!(lifecycle.transition_count(), HISTORY_LIMIT);
    }

    #[test]
    fn test_uptime_tracking() {
        let now = Instant::now();
        let mut lifecycle = ConnectionLifecycle::new(Duration::from_secs(5));
        assert!(lifecycle.uptime(now).is_none());

        lifecycle.transition_to_connected(now, Duration::from_secs(5));
        let uptime = lifecycle.uptime(now + Duration::from_millis(10)).unwrap();
        assert_eq!(uptime, Duration::from_millis(10));
    }
}
