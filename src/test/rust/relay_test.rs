use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async};

use reality_relay::{
    BridgeConfig, BridgeInput, BridgeNotice, BridgePorts, BridgeRuntime, BroadcastConfig,
    BroadcastRuntime, ClientId, Clock, ConnectionState, DownstreamClient, DownstreamListener,
    DownstreamRegistry, FanOutReport, InMemoryAggregateStore, ManualClock, MetricsReporter,
    ReconnectPolicy, RelayBridge, RelayError, RelayEvent, Result, Scheduler, UpstreamTransport,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct RecordingTransport {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl UpstreamTransport for RecordingTransport {
    fn open(&mut self, _url: &str) {
        self.opens.fetch_add(1, Ordering::SeqCst);
    }

    fn send(&mut self, frame: String) -> Result<()> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct RecordingScheduler {
    delays: Arc<Mutex<Vec<Duration>>>,
    reconnect_pending: Arc<AtomicBool>,
    heartbeat_running: Arc<AtomicBool>,
}

impl Scheduler for RecordingScheduler {
    fn schedule_reconnect(&mut self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
        self.reconnect_pending.store(true, Ordering::SeqCst);
    }

    fn cancel_reconnect(&mut self) {
        self.reconnect_pending.store(false, Ordering::SeqCst);
    }

    fn start_heartbeat(&mut self, _interval: Duration) {
        self.heartbeat_running.store(true, Ordering::SeqCst);
    }

    fn stop_heartbeat(&mut self) {
        self.heartbeat_running.store(false, Ordering::SeqCst);
    }

    fn active_timers(&self) -> usize {
        usize::from(self.reconnect_pending.load(Ordering::SeqCst))
            + usize::from(self.heartbeat_running.load(Ordering::SeqCst))
    }
}

struct NoopMetrics;

impl MetricsReporter for NoopMetrics {
    fn report_state_change(&self, _state: &ConnectionState) {}
    fn report_reconnect_attempt(&self) {}
    fn report_backoff(&self, _delay_secs: f64) {}
    fn report_downstream_clients(&self, _count: usize) {}
    fn report_fan_out(&self, _report: &FanOutReport) {}
    fn report_fps(&self, _fps: u32) {}
}

#[derive(Clone)]
struct MemoryClient {
    id: ClientId,
    open: Arc<AtomicBool>,
    buffered: usize,
    frames: Arc<Mutex<Vec<String>>>,
}

impl MemoryClient {
    fn new(buffered: usize) -> Self {
        Self {
            id: ClientId::new(),
            open: Arc::new(AtomicBool::new(true)),
            buffered,
            frames: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn received(&self) -> Vec<Value> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }
}

impl DownstreamClient for MemoryClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn buffered_amount(&self) -> usize {
        self.buffered
    }

    fn send(&self, frame: &str) -> Result<()> {
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

struct Rig {
    bridge: RelayBridge,
    transport: RecordingTransport,
    scheduler: RecordingScheduler,
    clock: ManualClock,
}

fn rig(max_attempts: u32) -> Rig {
    let transport = RecordingTransport::default();
    let scheduler = RecordingScheduler::default();
    let clock = ManualClock::default();

    let policy = ReconnectPolicy::new(
        max_attempts,
        Duration::from_millis(5_000),
        1.5,
        Duration::from_millis(60_000),
    )
    .unwrap();
    let config = BridgeConfig::new("ws://reality-engine:8090".to_string()).unwrap();

    let bridge = RelayBridge::new(
        config,
        policy,
        BridgePorts {
            transport: Box::new(transport.clone()),
            scheduler: Box::new(scheduler.clone()),
            clock: Arc::new(clock.clone()) as Arc<dyn Clock>,
            store: Box::new(InMemoryAggregateStore::new()),
            metrics: Arc::new(NoopMetrics),
        },
    );

    Rig {
        bridge,
        transport,
        scheduler,
        clock,
    }
}

fn close(rig: &mut Rig) {
    rig.bridge.handle(BridgeInput::UpstreamClosed {
        reason: "socket error".to_string(),
    });
}

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

#[test]
fn test_reconnect_policy_delay_schedule() {
    let policy = ReconnectPolicy::default();

    let delays: Vec<Duration> = (1..=5)
        .map(|attempt| policy.delay_for_attempt(attempt).unwrap())
        .collect();

    assert_eq!(
        delays,
        vec![
            Duration::from_millis(5_000),
            Duration::from_millis(7_500),
            Duration::from_millis(11_250),
            Duration::from_millis(16_875),
            Duration::from_micros(25_312_500),
        ]
    );
    assert_eq!(policy.delay_for_attempt(20), Some(Duration::from_millis(60_000)));
    assert_eq!(policy.delay_for_attempt(21), None);
}

#[test]
fn test_backoff_never_decreases_and_is_capped() {
    let mut rig = rig(20);
    rig.bridge.handle(BridgeInput::Connect);
    close(&mut rig);
    for _ in 0..19 {
        rig.bridge.handle(BridgeInput::ReconnectDue);
        close(&mut rig);
    }

    let delays = rig.scheduler.delays.lock().unwrap().clone();
    assert_eq!(delays.len(), 20);
    assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(delays.iter().all(|delay| *delay <= Duration::from_millis(60_000)));
    assert_eq!(delays.last(), Some(&Duration::from_millis(60_000)));
}

// ---------------------------------------------------------------------------
// Bridge state machine
// ---------------------------------------------------------------------------

#[test]
fn test_exhaustion_emits_single_permanent_disconnect() {
    let mut rig = rig(3);
    let mut notices = rig.bridge.subscribe();

    rig.bridge.handle(BridgeInput::Connect);
    close(&mut rig);
    for _ in 0..3 {
        rig.bridge.handle(BridgeInput::ReconnectDue);
        close(&mut rig);
    }
    // Extra closes and timers after giving up change nothing.
    close(&mut rig);
    rig.bridge.handle(BridgeInput::ReconnectDue);

    let permanent: Vec<BridgeNotice> = std::iter::from_fn(|| notices.try_recv().ok())
        .filter(|notice| matches!(notice, BridgeNotice::PermanentDisconnect { .. }))
        .collect();

    assert_eq!(permanent, vec![BridgeNotice::PermanentDisconnect { attempts: 3 }]);
    assert_eq!(rig.bridge.state(), ConnectionState::PermanentlyDisconnected);
    assert_eq!(rig.scheduler.delays.lock().unwrap().len(), 3);
    assert_eq!(rig.transport.opens.load(Ordering::SeqCst), 4);
}

#[test]
fn test_heartbeat_silence_forces_close() {
    let mut rig = rig(5);
    rig.bridge.handle(BridgeInput::Connect);
    rig.bridge.handle(BridgeInput::UpstreamOpened);

    for _ in 0..2 {
        rig.bridge.handle(BridgeInput::HeartbeatDue);
        rig.clock.advance(Duration::from_secs(30));
    }
    assert_eq!(rig.transport.closes.load(Ordering::SeqCst), 0);

    rig.bridge.handle(BridgeInput::HeartbeatDue);
    assert_eq!(rig.transport.closes.load(Ordering::SeqCst), 1);
    assert_eq!(rig.transport.sent.lock().unwrap().len(), 2);
}

#[test]
fn test_shutdown_leaves_no_timers() {
    let mut rig = rig(5);
    rig.bridge.handle(BridgeInput::Connect);
    rig.bridge.handle(BridgeInput::UpstreamOpened);
    assert_eq!(rig.bridge.active_timers(), 1);

    rig.bridge.shutdown();
    rig.bridge.shutdown();

    assert_eq!(rig.bridge.active_timers(), 0);
    assert!(rig.bridge.state().is_terminal());
    assert_eq!(rig.transport.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_new_client_receives_status_while_disconnected() {
    let mut rig = rig(5);
    let client = MemoryClient::new(0);

    rig.bridge.add_client(Box::new(client.clone()));

    let received = client.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["type"], "reality_status");
    assert_eq!(received[0]["data"]["bridgeConnected"], false);
    assert!(received[0]["timestamp"].is_i64());
}

#[test]
fn test_malformed_upstream_frame_changes_nothing() {
    let mut rig = rig(5);
    rig.bridge.handle(BridgeInput::Connect);
    rig.bridge.handle(BridgeInput::UpstreamOpened);
    let before = rig.bridge.status();
    let transitions = rig.bridge.lifecycle().transition_count();

    rig.bridge.handle(BridgeInput::UpstreamFrame("not json at all".to_string()));
    rig.bridge.handle(BridgeInput::UpstreamFrame(r#"{"data":{}}"#.to_string()));

    assert_eq!(rig.bridge.status(), before);
    assert_eq!(rig.bridge.lifecycle().transition_count(), transitions);
}

#[test]
fn test_send_to_upstream_when_disconnected() {
    let mut rig = rig(5);
    let result = rig.bridge.send_to_upstream(&json!({"type": "metrics_update", "data": {}}));
    assert!(matches!(result, Err(RelayError::NotConnected)));
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

#[test]
fn test_fan_out_drops_only_backpressured_sinks() {
    let threshold = 1024 * 1024;
    let mut registry = DownstreamRegistry::new();
    let clients: Vec<MemoryClient> = (0..10)
        .map(|n| MemoryClient::new(if n % 3 == 0 { threshold + 1 } else { threshold }))
        .collect();
    for client in &clients {
        registry.add(Box::new(client.clone()));
    }

    let report = registry.fan_out(r#"{"type":"metrics_update","data":{}}"#, threshold);

    // n = 0, 3, 6, 9 are over the threshold
    assert_eq!(report.delivered, 6);
    assert_eq!(report.dropped_backpressure, 4);
    assert_eq!(registry.len(), 10);
}

// ---------------------------------------------------------------------------
// Over real sockets
// ---------------------------------------------------------------------------

async fn next_json<S>(stream: &mut S) -> Value
where
    S: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read failed");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_bridge_relays_upstream_events_to_clients() {
    // Fake upstream producer
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let upstream_task = tokio::spawn(async move {
        let (stream, _) = upstream.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        go_rx.await.unwrap();
        let event = json!({
            "type": "reality_generated",
            "data": {"id": "r-42", "summary": "fog over the bay", "realityLevel": 0.8, "timestamp": 1}
        });
        ws.send(Message::Text(event.to_string().into())).await.unwrap();
        next_json(&mut ws).await
    });

    let config = BridgeConfig::new(format!("ws://{}", upstream_addr)).unwrap();
    let (relay, bridge_task) = BridgeRuntime::start(
        config,
        ReconnectPolicy::default(),
        Box::new(InMemoryAggregateStore::new()),
        Arc::new(NoopMetrics),
    );
    let mut notices = relay.subscribe();
    relay.connect().unwrap();
    let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice, BridgeNotice::Connected);

    // Downstream side
    let listener = DownstreamListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let listen_addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let listener_task = tokio::spawn(listener.run(relay.clone(), async move {
        let _ = stop_rx.await;
    }));

    let (mut client, _) = connect_async(format!("ws://{}", listen_addr)).await.unwrap();
    let greeting = next_json(&mut client).await;
    assert_eq!(greeting["type"], "reality_status");
    assert_eq!(greeting["data"]["bridgeConnected"], true);

    go_tx.send(()).unwrap();
    let relayed = next_json(&mut client).await;
    assert_eq!(relayed["type"], "reality_generated");
    assert_eq!(relayed["data"]["id"], "r-42");
    assert_eq!(relay.status().connected_clients, 1);
    assert!(relay.status().connected);

    relay
        .send_to_upstream(json!({"type": "metrics_update", "data": {"fromRelay": true}}))
        .await
        .unwrap();
    let upstream_got = tokio::time::timeout(Duration::from_secs(5), upstream_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(upstream_got["data"]["fromRelay"], true);

    relay.shutdown().unwrap();
    bridge_task.await.unwrap();
    let _ = stop_tx.send(());
    listener_task.await.unwrap();

    // The client sees the relay hang up.
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);
}

#[tokio::test]
async fn test_broadcaster_serves_sinks_and_answers_heartbeats() {
    let (broadcaster, broadcast_task) = BroadcastRuntime::start(
        BroadcastConfig::default(),
        Arc::new(ManualClock::default()),
        Arc::new(NoopMetrics),
    );

    let listener = DownstreamListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let listen_addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let listener_task = tokio::spawn(listener.run(broadcaster.clone(), async move {
        let _ = stop_rx.await;
    }));

    let (mut sink, _) = connect_async(format!("ws://{}", listen_addr)).await.unwrap();

    // A heartbeat round trip proves the sink is attached.
    sink.send(Message::Text(
        RelayEvent::heartbeat(7).encode().unwrap().into(),
    ))
    .await
    .unwrap();
    let reply = next_json(&mut sink).await;
    assert_eq!(reply["type"], "heartbeat_response");

    broadcaster
        .publish(RelayEvent::ImaginationStatusUpdate {
            data: json!({"active": true, "cpuUtilization": 0.3}),
            timestamp: Some(json!(1)),
        })
        .unwrap();
    let event = next_json(&mut sink).await;
    assert_eq!(event["type"], "imagination_status_update");
    assert_eq!(event["data"]["active"], true);

    broadcaster.shutdown().unwrap();
    broadcast_task.await.unwrap();
    let _ = stop_tx.send(());
    listener_task.await.unwrap();

    let metrics = broadcaster.service_metrics();
    assert_eq!(metrics.total_events, 1);
    assert_eq!(metrics.dropped_frames, 0);
    assert_eq!(metrics.current_fps, 10);
}
