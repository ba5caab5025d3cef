//! Local agent: one participant in a window.
//!
//! Each agent owns a transport connection, a view of the network
//! ([`WindowCollection`]) and, while it leads its window, the sampler.
//! Everything runs on one task: a single `select!` loop over commands,
//! transport events, sensor events and timers. Handlers run to completion,
//! so state changes inside the loop never interleave.
//!
//! Lifecycle:
//! - `start`: open the transport. On `Connect`, claim or join the window's
//!   slot. The first agent leads: it starts sampling and broadcasts a full
//!   snapshot.
//! - `Join` of a new peer: the leader sends it a targeted full snapshot.
//! - `Drop`: the peer's window count is decremented. If the peer was the
//!   leader of record for our own window, leadership is re-evaluated.
//! - `Disconnect`: sampling stops, the slot is released, the whole
//!   collection is cleared and, unless stopped, a reconnect is scheduled.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use winfo_core::{
    AgentId, Metrics, MetricsSampler, PeerId, ReconnectBackoff, SamplerEffect, SensorEvent,
    WINDOW_METRICS, WindowId, WindowMessage,
};

use crate::collection::WindowCollection;
use crate::config::AgentConfig;
use crate::coordinator::{AgentCommand, LeadershipCoordinator};
use crate::schedule::{ScheduledTask, Ticker};
use crate::sensor::LocalWindow;
use crate::transport::{PeerTransport, TransportEvent};

/// Observable agent state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentStatus {
    pub connected: bool,
    pub leader: bool,
    pub peer: Option<PeerId>,
    pub window_id: Option<WindowId>,
}

// ─── Handle ──────────────────────────────────────────────────────────

/// Control surface of a spawned agent.
///
/// Dropping the handle ends the agent the same way [`shutdown`] does,
/// without waiting for it.
///
/// [`shutdown`]: AgentHandle::shutdown
#[derive(Debug)]
pub struct AgentHandle {
    id: AgentId,
    commands: mpsc::UnboundedSender<AgentCommand>,
    collection: WindowCollection,
    status: watch::Receiver<AgentStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AgentHandle {
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Enable auto-reconnect and join the network.
    pub fn start(&self) {
        self.send(AgentCommand::Start);
    }

    /// Leave the network and disable auto-reconnect. The collection is
    /// emptied right away.
    pub fn stop(&self) {
        self.send(AgentCommand::Stop);
    }

    /// Stop, hand leadership over, and end the agent's task.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await {
            warn!(agent = %self.id, "agent: task ended abnormally: {e}");
        }
    }

    pub fn collection(&self) -> &WindowCollection {
        &self.collection
    }

    pub fn status(&self) -> watch::Receiver<AgentStatus> {
        self.status.clone()
    }

    fn send(&self, command: AgentCommand) {
        if self.commands.send(command).is_err() {
            debug!(agent = %self.id, ?command, "agent: task gone, command dropped");
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            debug!(agent = %self.id, "agent: handle dropped, cancelling");
        }
        self.cancel.cancel();
    }
}

// ─── Agent ───────────────────────────────────────────────────────────

pub struct LocalAgent {
    id: AgentId,
    config: AgentConfig,
    window: Arc<LocalWindow>,
    coordinator: Arc<LeadershipCoordinator>,
    transport: Box<dyn PeerTransport>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<AgentCommand>,
    collection: WindowCollection,
    status: watch::Sender<AgentStatus>,
    cancel: CancellationToken,

    sampler: MetricsSampler,
    backoff: ReconnectBackoff,
    poll: Ticker,
    resize_settle: ScheduledTask,
    reconnect: ScheduledTask,
    sensor_events: Option<mpsc::UnboundedReceiver<SensorEvent>>,

    peer: Option<PeerId>,
    window_id: Option<WindowId>,
    /// Member of the window's slot.
    joined: bool,
    leader: bool,
    monitor_count: u32,
    /// Explicitly stopped: no auto-reconnect.
    stopped: bool,
}

impl LocalAgent {
    /// Spawn an idle agent on the current runtime. Nothing happens on the
    /// network until [`AgentHandle::start`].
    pub fn spawn(
        config: AgentConfig,
        window: Arc<LocalWindow>,
        coordinator: Arc<LeadershipCoordinator>,
        transport: Box<dyn PeerTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> AgentHandle {
        let id = AgentId::new(uuid::Uuid::new_v4().to_string());
        let (mailbox, commands) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(AgentStatus::default());
        let collection = WindowCollection::new();
        let cancel = CancellationToken::new();
        let backoff = ReconnectBackoff::new(config.reconnect.clone());

        let agent = LocalAgent {
            id: id.clone(),
            config,
            window,
            coordinator,
            transport,
            events,
            commands,
            collection: collection.clone(),
            status,
            cancel: cancel.clone(),
            sampler: MetricsSampler::new(),
            backoff,
            poll: Ticker::new(),
            resize_settle: ScheduledTask::new(),
            reconnect: ScheduledTask::new(),
            sensor_events: None,
            peer: None,
            window_id: None,
            joined: false,
            leader: false,
            monitor_count: 0,
            stopped: true,
        };
        let task = tokio::spawn(agent.run(mailbox.downgrade()));

        AgentHandle {
            id,
            commands: mailbox,
            collection,
            status: status_rx,
            cancel,
            task: Some(task),
        }
    }

    async fn run(mut self, mailbox: mpsc::WeakUnboundedSender<AgentCommand>) {
        self.coordinator.register(self.id.clone(), mailbox).await;
        debug!(agent = %self.id, "agent: event loop started");

        loop {
            // Transport events go first so a departed leader's `Drop` is
            // seen before the promotion it caused.
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(agent = %self.id, "agent: cancellation requested");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle_transport(event).await,
                    None => {
                        info!(agent = %self.id, "agent: transport gone, shutting down");
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!(agent = %self.id, "agent: handle gone, shutting down");
                        break;
                    }
                },
                event = next_sensor_event(&mut self.sensor_events) => match event {
                    Some(event) => self.handle_sensor(event).await,
                    None => self.sensor_events = None,
                },
                _ = self.resize_settle.fired() => {
                    let effects = self.sampler.on_resize_settled(self.window.sensor());
                    self.apply_effects(effects).await;
                }
                _ = self.poll.tick() => {
                    let effects = self.sampler.on_poll_tick(self.window.sensor());
                    self.apply_effects(effects).await;
                }
                _ = self.reconnect.fired() => self.open(),
            }
        }

        self.stop().await;
        self.coordinator.unregister(&self.id).await;
        debug!(agent = %self.id, "agent: event loop ended");
    }

    // ─── Commands ────────────────────────────────────────────────────

    async fn handle_command(&mut self, command: AgentCommand) {
        match command {
            AgentCommand::Start => self.start().await,
            AgentCommand::Stop => self.stop().await,
            AgentCommand::Promote => self.on_promote().await,
            AgentCommand::MonitorCountChanged(count) => self.on_monitor_count(count).await,
        }
    }

    async fn start(&mut self) {
        if !self.window.sensor().is_top_level() {
            warn!(agent = %self.id, "agent: nested context, window metrics unsupported");
            self.collection.set_unsupported(true).await;
            return;
        }
        self.stopped = false;
        self.backoff.reset();
        self.open();
    }

    async fn stop(&mut self) {
        self.stopped = true;
        self.reconnect.cancel();
        // Leave the network before giving up the slot, so peers see our
        // drop before the successor's snapshot.
        self.transport.close();
        self.teardown().await;
    }

    fn open(&mut self) {
        if self.stopped || self.peer.is_some() {
            return;
        }
        if let Err(e) = self.transport.open(&self.config.channel) {
            let delay = self.backoff.next_delay_ms();
            warn!(agent = %self.id, delay_ms = delay, "agent: open failed: {e}");
            self.reconnect.arm(Duration::from_millis(delay));
        }
    }

    async fn on_promote(&mut self) {
        if self.leader {
            return;
        }
        if self.peer.is_none() || !self.joined {
            // Promoted while offline: pass it on.
            if let Some(window) = self.window.id().cloned() {
                self.coordinator.release(&window, &self.id).await;
            }
            return;
        }
        self.become_leader().await;
    }

    async fn on_monitor_count(&mut self, count: u32) {
        if !self.leader {
            debug!(agent = %self.id, count, "agent: count change ignored, not leader");
            return;
        }
        let Some(window) = self.window_id.clone() else {
            return;
        };
        if count == self.monitor_count {
            return;
        }
        self.monitor_count = count;
        self.publish(&window, &Metrics::new()).await;
    }

    // ─── Transport ───────────────────────────────────────────────────

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connect { peer } => self.on_connect(peer).await,
            TransportEvent::Disconnect => self.on_disconnect().await,
            // Anything else queued from a previous connection is stale.
            _ if self.peer.is_none() => {
                debug!(agent = %self.id, "agent: event while offline, ignored");
            }
            TransportEvent::Join { peer, existed } => self.on_join(peer, existed),
            TransportEvent::Drop { peer } => self.on_drop(peer).await,
            TransportEvent::Message {
                from,
                message_type,
                payload,
            } => self.on_message(from, &message_type, payload).await,
        }
    }

    async fn on_connect(&mut self, peer: PeerId) {
        if self.stopped {
            debug!(agent = %self.id, peer = %peer, "agent: connect after stop, ignored");
            return;
        }
        info!(agent = %self.id, peer = %peer, "agent: connected");
        self.reconnect.cancel();
        self.backoff.reset();

        let transport = &self.transport;
        let window = self.window.id_or_mint(|| transport.generate_id());
        self.collection.set_local_window(window.clone()).await;
        self.peer = Some(peer);
        self.window_id = Some(window.clone());

        let acquisition = self.coordinator.acquire_or_join(&window, &self.id).await;
        self.joined = true;
        self.monitor_count = acquisition.monitor_count;
        if acquisition.is_leader {
            self.become_leader().await;
        } else {
            debug!(
                agent = %self.id,
                window_id = %window,
                monitor_count = acquisition.monitor_count,
                "agent: joined as follower"
            );
        }
        self.publish_status();
    }

    async fn on_disconnect(&mut self) {
        if self.peer.is_none() {
            return;
        }
        info!(agent = %self.id, "agent: disconnected");
        self.teardown().await;
        if !self.stopped {
            let delay = self.backoff.next_delay_ms();
            debug!(agent = %self.id, delay_ms = delay, "agent: reconnect scheduled");
            self.reconnect.arm(Duration::from_millis(delay));
        }
    }

    fn on_join(&mut self, peer: PeerId, existed: bool) {
        if existed || !self.leader {
            return;
        }
        let Some(window) = self.window_id.clone() else {
            return;
        };
        let snapshot =
            WindowMessage::new(window, self.monitor_count, self.sampler.snapshot().clone());
        debug!(agent = %self.id, peer = %peer, "agent: sending snapshot to new peer");
        if let Err(e) = self
            .transport
            .send(WINDOW_METRICS, Some(&peer), snapshot.to_payload())
        {
            debug!(agent = %self.id, peer = %peer, "agent: snapshot send failed: {e}");
        }
    }

    async fn on_drop(&mut self, peer: PeerId) {
        let outcome = self.collection.drop_peer(&peer, self.leader).await;
        debug!(agent = %self.id, peer = %peer, ?outcome, "agent: peer dropped");

        if self.joined && !self.leader {
            if let Some(window) = self.window_id.clone() {
                self.coordinator.reclaim(&window, &peer).await;
            }
        }
    }

    async fn on_message(&mut self, from: PeerId, message_type: &str, payload: Value) {
        if message_type != WINDOW_METRICS {
            debug!(agent = %self.id, message_type, "agent: unknown message type ignored");
            return;
        }
        if let Err(e) = self.collection.apply_message(&from, &payload).await {
            debug!(agent = %self.id, peer = %from, "agent: dropped malformed message: {e}");
        }
    }

    // ─── Leadership ──────────────────────────────────────────────────

    async fn become_leader(&mut self) {
        let (Some(window), Some(peer)) = (self.window_id.clone(), self.peer.clone()) else {
            return;
        };
        if !self
            .coordinator
            .set_leader_peer(&window, &self.id, peer.clone())
            .await
        {
            debug!(agent = %self.id, "agent: promotion is stale, slot has another leader");
            return;
        }
        if let Some(slot) = self.coordinator.slot(&window).await {
            self.monitor_count = slot.monitor_count();
        }
        info!(
            agent = %self.id,
            window_id = %window,
            peer = %peer,
            monitor_count = self.monitor_count,
            "agent: leading window"
        );
        self.leader = true;
        self.sensor_events = Some(self.window.sensor().subscribe());
        let effects = self.sampler.start(self.window.sensor());
        self.apply_effects(effects).await;
        self.publish_status();
    }

    /// Undo everything a connection set up. Safe to call repeatedly.
    async fn teardown(&mut self) {
        if self.leader {
            let effects = self.sampler.stop();
            self.apply_effects(effects).await;
            self.sensor_events = None;
            self.leader = false;
        }
        self.poll.stop();
        self.resize_settle.cancel();

        if self.joined {
            if let Some(window) = self.window_id.clone() {
                let release = self.coordinator.release(&window, &self.id).await;
                debug!(agent = %self.id, ?release, "agent: slot released");
            }
            self.joined = false;
        }

        let removed = self.collection.clear().await;
        if removed > 0 {
            debug!(agent = %self.id, removed, "agent: collection cleared");
        }
        self.peer = None;
        self.monitor_count = 0;
        self.publish_status();
    }

    // ─── Sampling ────────────────────────────────────────────────────

    async fn handle_sensor(&mut self, event: SensorEvent) {
        let sensor = self.window.sensor();
        let effects = match event {
            SensorEvent::Focus => self.sampler.on_focus(sensor),
            SensorEvent::Blur => self.sampler.on_blur(),
            SensorEvent::Scroll => self.sampler.on_scroll(sensor),
            SensorEvent::Resize => self.sampler.on_resize(),
        };
        self.apply_effects(effects).await;
    }

    async fn apply_effects(&mut self, effects: Vec<SamplerEffect>) {
        for effect in effects {
            match effect {
                SamplerEffect::StartPolling => self.poll.start(self.config.poll_interval()),
                SamplerEffect::StopPolling => self.poll.stop(),
                SamplerEffect::ArmResizeSettle => {
                    self.resize_settle.arm(self.config.resize_settle())
                }
                SamplerEffect::CancelResizeSettle => self.resize_settle.cancel(),
                SamplerEffect::Broadcast(changed) => {
                    if let Some(window) = self.window_id.clone() {
                        self.publish(&window, &changed).await;
                    }
                }
            }
        }
    }

    /// Broadcast a change of our window and mirror it locally.
    async fn publish(&mut self, window: &WindowId, changed: &Metrics) {
        let message = WindowMessage::new(window.clone(), self.monitor_count, changed.clone());
        if let Err(e) = self.transport.send(WINDOW_METRICS, None, message.to_payload()) {
            debug!(agent = %self.id, "agent: broadcast failed: {e}");
        }
        self.collection
            .apply_local(window, self.monitor_count, changed)
            .await;
    }

    fn publish_status(&self) {
        let status = AgentStatus {
            connected: self.peer.is_some(),
            leader: self.leader,
            peer: self.peer.clone(),
            window_id: self.window_id.clone(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

async fn next_sensor_event(
    rx: &mut Option<mpsc::UnboundedReceiver<SensorEvent>>,
) -> Option<SensorEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
