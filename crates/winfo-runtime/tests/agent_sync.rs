//! End-to-end agent behavior over the in-memory network.
//!
//! All tests run on a paused clock: timers fire exactly on their deadlines
//! and the runtime only advances time once every task is idle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use winfo_core::{AgentId, EventKind, MetricField, PeerId, WINDOW_METRICS, WindowMessage};
use winfo_runtime::{
    AgentConfig, AgentHandle, LeadershipCoordinator, LocalAgent, LocalWindow, MemoryNetwork,
    PeerTransport, SimulatedWindow, TransportEvent, WindowEvent,
};

const CHANNEL: &str = "window-metrics@public";

struct Harness {
    net: MemoryNetwork,
    coordinator: Arc<LeadershipCoordinator>,
}

impl Harness {
    fn new() -> Self {
        Self {
            net: MemoryNetwork::new(),
            coordinator: Arc::new(LeadershipCoordinator::new()),
        }
    }

    fn window(&self) -> (Arc<SimulatedWindow>, Arc<LocalWindow>) {
        let sensor = Arc::new(SimulatedWindow::default());
        let local = Arc::new(LocalWindow::new(sensor.clone()));
        (sensor, local)
    }

    fn agent(&self, local: &Arc<LocalWindow>) -> AgentHandle {
        let (transport, events) = self.net.transport();
        let handle = LocalAgent::spawn(
            AgentConfig::default(),
            local.clone(),
            self.coordinator.clone(),
            Box::new(transport),
            events,
        );
        handle.start();
        handle
    }
}

/// Let every task run until idle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn drain(rx: &mut broadcast::Receiver<WindowEvent>) -> Vec<WindowEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn is_leader(agent: &AgentHandle) -> bool {
    agent.status().borrow().leader
}

#[tokio::test(start_paused = true)]
async fn leadership_passes_to_remaining_agent() {
    let h = Harness::new();
    let (_sensor, local) = h.window();

    let a = h.agent(&local);
    settle().await;
    let b = h.agent(&local);
    settle().await;

    let window = local.id().cloned().unwrap();
    let slot = h.coordinator.slot(&window).await.unwrap();
    assert_eq!(slot.leader, *a.id());
    assert_eq!(slot.monitor_count(), 2);
    assert!(is_leader(&a));
    assert!(!is_leader(&b));

    let (_other_sensor, other) = h.window();
    let observer = h.agent(&other);
    settle().await;
    assert_eq!(
        observer.collection().get(&window).await.unwrap().monitor_count,
        2
    );
    let mut events = observer.collection().subscribe();

    a.shutdown().await;
    settle().await;

    assert!(is_leader(&b));
    let slot = h.coordinator.slot(&window).await.unwrap();
    assert_eq!(slot.leader, *b.id());
    assert_eq!(slot.monitor_count(), 1);

    // The new leader announces itself with a full snapshot.
    let updates: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| e.window_id == window)
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].kind, EventKind::Update);
    let changed = updates[0].changed.as_ref().unwrap();
    for field in MetricField::ALL {
        if field != MetricField::Current {
            assert!(changed.contains(field), "snapshot missing {field}");
        }
    }
    let record = observer.collection().get(&window).await.unwrap();
    assert_eq!(record.monitor_count, 1);
    assert_eq!(record.metrics.current, None);
}

#[tokio::test(start_paused = true)]
async fn only_one_agent_leads_a_window() {
    let h = Harness::new();
    let (_sensor, local) = h.window();
    let agents: Vec<_> = (0..3).map(|_| h.agent(&local)).collect();
    settle().await;
    assert_eq!(agents.iter().filter(|a| is_leader(a)).count(), 1);

    let mut agents = agents;
    let leader = agents.iter().position(is_leader).unwrap();
    agents.remove(leader).shutdown().await;
    settle().await;
    assert_eq!(agents.iter().filter(|a| is_leader(a)).count(), 1);

    let window = local.id().cloned().unwrap();
    assert_eq!(
        h.coordinator.slot(&window).await.unwrap().monitor_count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn resize_burst_is_broadcast_once_after_settling() {
    let h = Harness::new();
    let (sensor, local) = h.window();
    let _leader = h.agent(&local);
    let (_other_sensor, other) = h.window();
    let observer = h.agent(&other);
    settle().await;

    let window = local.id().cloned().unwrap();
    let mut events = observer.collection().subscribe();

    for width in [810.0, 820.0, 830.0, 840.0] {
        sensor.resize(width, 600.0);
        tokio::time::sleep(Duration::from_millis(6)).await;
    }
    sensor.resize(850.0, 600.0);

    tokio::time::sleep(Duration::from_millis(49)).await;
    assert!(drain(&mut events).is_empty());

    tokio::time::sleep(Duration::from_millis(2)).await;
    let got = drain(&mut events);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].kind, EventKind::Update);
    assert_eq!(got[0].window_id, window);
    let changed = got[0].changed.as_ref().unwrap();
    assert_eq!(changed.width, Some(850.0));
    assert_eq!(changed.bwidth, Some(850.0));
    assert_eq!(changed.len(), 2);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn focused_leader_polls_position() {
    let h = Harness::new();
    let (sensor, local) = h.window();
    let _leader = h.agent(&local);
    let (_other_sensor, other) = h.window();
    let observer = h.agent(&other);
    settle().await;
    let window = local.id().cloned().unwrap();

    sensor.focus();
    settle().await;
    sensor.move_to(42.0, 7.0);
    tokio::time::sleep(Duration::from_millis(110)).await;
    let record = observer.collection().get(&window).await.unwrap();
    assert_eq!(record.metrics.x, Some(42.0));
    assert_eq!(record.metrics.focus, Some(true));

    // Blurred windows are not polled; the focus change still goes out.
    sensor.blur();
    settle().await;
    sensor.move_to(99.0, 7.0);
    tokio::time::sleep(Duration::from_millis(500)).await;
    let record = observer.collection().get(&window).await.unwrap();
    assert_eq!(record.metrics.x, Some(42.0));
    assert_eq!(record.metrics.focus, Some(false));
}

#[tokio::test(start_paused = true)]
async fn new_peer_first_receives_full_snapshot() {
    let h = Harness::new();
    let (sensor, local) = h.window();
    let _leader = h.agent(&local);
    settle().await;
    sensor.scroll_to(0.0, 300.0);
    settle().await;

    let (probe, mut rx) = h.net.transport();
    probe.open(CHANNEL).unwrap();
    settle().await;

    let mut first = None;
    while let Ok(event) = rx.try_recv() {
        if let TransportEvent::Message {
            message_type,
            payload,
            ..
        } = event
        {
            assert_eq!(message_type, WINDOW_METRICS);
            first = Some(payload);
            break;
        }
    }
    let message = WindowMessage::parse(first.as_ref()).unwrap();
    assert_eq!(&message.id, local.id().unwrap());
    assert_eq!(message.cnt, 1);
    for field in MetricField::ALL {
        assert!(message.metrics.contains(field), "missing {field}");
    }
    assert_eq!(message.metrics.current, Some(true));
    assert_eq!(message.metrics.scrolly, Some(300.0));
}

#[tokio::test(start_paused = true)]
async fn malformed_messages_are_ignored() {
    let h = Harness::new();
    let (_sensor, local) = h.window();
    let agent = h.agent(&local);
    settle().await;

    let (probe, _rx) = h.net.transport();
    probe.open(CHANNEL).unwrap();
    for bad in [
        serde_json::json!({ "id": 5, "cnt": 1, "metrics": {} }),
        serde_json::json!({ "id": "w9", "cnt": 1.5, "metrics": {} }),
        serde_json::json!({ "id": "w9", "cnt": 1, "metrics": { "x": "left" } }),
        serde_json::json!("nonsense"),
    ] {
        probe.send(WINDOW_METRICS, None, bad).unwrap();
    }
    probe
        .send("something-else", None, serde_json::json!({}))
        .unwrap();
    settle().await;
    assert_eq!(agent.collection().len().await, 1);

    probe
        .send(
            WINDOW_METRICS,
            None,
            serde_json::json!({ "id": "w9", "cnt": 1, "metrics": { "x": 3 } }),
        )
        .unwrap();
    settle().await;
    assert_eq!(agent.collection().len().await, 2);

    // The probe leaving takes its window with it.
    drop(probe);
    settle().await;
    assert_eq!(agent.collection().len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_clears_and_rebuilds() {
    let h = Harness::new();
    let (_sa, wa) = h.window();
    let (_sb, wb) = h.window();
    let a = h.agent(&wa);
    let b = h.agent(&wb);
    settle().await;
    assert_eq!(a.collection().len().await, 2);
    assert_eq!(b.collection().len().await, 2);

    let old_peer: PeerId = a.status().borrow().peer.clone().unwrap();
    let window = a.status().borrow().window_id.clone().unwrap();
    let mut a_events = a.collection().subscribe();

    assert!(h.net.sever(&old_peer));
    settle().await;

    let removed = drain(&mut a_events);
    assert_eq!(removed.len(), 2);
    assert!(removed.iter().all(|e| e.kind == EventKind::Remove));
    assert!(a.collection().is_empty().await);
    assert!(!a.status().borrow().connected);
    assert!(b.collection().get(&window).await.is_none());
    assert!(h.coordinator.slot(&window).await.is_none());

    // Default backoff starts at 250ms.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = a.status().borrow().clone();
    assert!(status.connected);
    assert!(status.leader);
    assert_ne!(status.peer, Some(old_peer));
    assert_eq!(status.window_id, Some(window.clone()));
    assert_eq!(a.collection().len().await, 2);
    assert_eq!(
        b.collection().get(&window).await.unwrap().monitor_count,
        1
    );
}

#[tokio::test(start_paused = true)]
async fn stop_empties_collection_until_restart() {
    let h = Harness::new();
    let (_sa, wa) = h.window();
    let (_sb, wb) = h.window();
    let a = h.agent(&wa);
    let b = h.agent(&wb);
    settle().await;
    let window = wa.id().cloned().unwrap();

    a.stop();
    settle().await;
    assert!(a.collection().is_empty().await);
    assert!(!a.status().borrow().connected);
    assert!(b.collection().get(&window).await.is_none());

    // No auto-reconnect after an explicit stop.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(a.collection().is_empty().await);
    assert_eq!(h.net.members(CHANNEL).len(), 1);

    a.start();
    settle().await;
    let ids: Vec<_> = a
        .collection()
        .windows()
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&window));
    assert_eq!(a.collection().current().await.unwrap().id, window);
    assert!(b.collection().get(&window).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn nested_context_is_unsupported() {
    let h = Harness::new();
    let (sensor, local) = h.window();
    sensor.set_nested(true);
    let agent = h.agent(&local);
    settle().await;

    assert!(agent.collection().is_unsupported().await);
    assert!(agent.collection().is_empty().await);
    assert!(!agent.status().borrow().connected);
    assert!(h.net.members(CHANNEL).is_empty());
    assert_eq!(sensor.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn follower_count_changes_reach_peers() {
    let h = Harness::new();
    let (_sa, wa) = h.window();
    let (_sb, wb) = h.window();
    let _leader = h.agent(&wa);
    let observer = h.agent(&wb);
    settle().await;
    let window = wa.id().cloned().unwrap();
    assert_eq!(
        observer.collection().get(&window).await.unwrap().monitor_count,
        1
    );

    let follower = h.agent(&wa);
    settle().await;
    assert_eq!(
        observer.collection().get(&window).await.unwrap().monitor_count,
        2
    );

    follower.shutdown().await;
    settle().await;
    assert_eq!(
        observer.collection().get(&window).await.unwrap().monitor_count,
        1
    );
}

#[tokio::test(start_paused = true)]
async fn departed_leader_is_replaced_by_follower() {
    let h = Harness::new();
    let (_sensor, local) = h.window();
    let window = local.id_or_mint(|| "shared-window".to_owned());

    // A leader of record that never releases its slot.
    let (remote, _remote_events) = h.net.transport();
    remote.open(CHANNEL).unwrap();
    let remote_peer = remote.local_peer().unwrap();
    let remote_agent = AgentId::new("remote");
    assert!(
        h.coordinator
            .acquire_or_join(&window, &remote_agent)
            .await
            .is_leader
    );
    assert!(
        h.coordinator
            .set_leader_peer(&window, &remote_agent, remote_peer.clone())
            .await
    );

    let follower = h.agent(&local);
    settle().await;
    assert!(!is_leader(&follower));
    assert_eq!(
        h.coordinator.slot(&window).await.unwrap().monitor_count(),
        2
    );

    assert!(h.net.sever(&remote_peer));
    settle().await;

    assert!(is_leader(&follower));
    let slot = h.coordinator.slot(&window).await.unwrap();
    assert_eq!(slot.leader, *follower.id());
    assert_eq!(slot.monitor_count(), 1);
    assert_eq!(slot.leader_peer, follower.status().borrow().peer.clone());

    let current = follower.collection().current().await.unwrap();
    assert_eq!(current.id, window);
    assert_eq!(current.monitor_count, 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_leaves_network() {
    let h = Harness::new();
    let (_sa, wa) = h.window();
    let (_sb, wb) = h.window();
    let a = h.agent(&wa);
    let b = h.agent(&wb);
    settle().await;
    assert_eq!(h.net.members(CHANNEL).len(), 2);
    assert_eq!(b.collection().len().await, 2);
    let window = wa.id().cloned().unwrap();
    let b_peer = b.status().borrow().peer.clone().unwrap();

    drop(a);
    settle().await;

    assert_eq!(h.net.members(CHANNEL), vec![b_peer]);
    assert!(b.collection().get(&window).await.is_none());
    assert_eq!(b.collection().len().await, 1);
    assert!(h.coordinator.slot(&window).await.is_none());
}
