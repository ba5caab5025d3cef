//! Public observable collection of window records.
//!
//! Readers get an ordered view plus a broadcast stream of add/update/remove
//! events. Only the owning agent writes; every write goes through the
//! registry and publishes what it returns.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use winfo_core::{
    DropOutcome, Metrics, PeerId, RegistryEvent, RemoteRegistry, WindowId, WindowRecord, WireError,
};

pub type WindowEvent = RegistryEvent;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct CollectionState {
    registry: RemoteRegistry,
    unsupported: bool,
}

/// Cheap to clone; clones observe the same collection.
#[derive(Debug, Clone)]
pub struct WindowCollection {
    state: Arc<RwLock<CollectionState>>,
    events: broadcast::Sender<WindowEvent>,
}

impl Default for WindowCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowCollection {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(CollectionState::default())),
            events,
        }
    }

    /// Window records in insertion order.
    pub async fn windows(&self) -> Vec<WindowRecord> {
        self.state.read().await.registry.windows().to_vec()
    }

    /// Record of the local window, once it has been announced.
    pub async fn current(&self) -> Option<WindowRecord> {
        self.state.read().await.registry.current().cloned()
    }

    pub async fn get(&self, id: &WindowId) -> Option<WindowRecord> {
        self.state.read().await.registry.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.registry.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.registry.is_empty()
    }

    /// True when this context cannot take part (nested window).
    pub async fn is_unsupported(&self) -> bool {
        self.state.read().await.unsupported
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WindowEvent> {
        self.events.subscribe()
    }

    // ─── Writes (owning agent only) ──────────────────────────────────

    pub(crate) async fn set_local_window(&self, window: WindowId) {
        self.state.write().await.registry.set_local_window(window);
    }

    pub(crate) async fn set_unsupported(&self, unsupported: bool) {
        self.state.write().await.unsupported = unsupported;
    }

    pub(crate) async fn apply_message(
        &self,
        sender: &PeerId,
        payload: &Value,
    ) -> Result<(), WireError> {
        let event = self
            .state
            .write()
            .await
            .registry
            .apply_message(sender, Some(payload), Utc::now())?;
        self.publish(event);
        Ok(())
    }

    pub(crate) async fn apply_local(&self, window: &WindowId, monitor_count: u32, changed: &Metrics) {
        let event = self
            .state
            .write()
            .await
            .registry
            .apply_local(window, monitor_count, changed, Utc::now());
        self.publish(event);
    }

    /// Forget a departed peer. With `local_authority` set, a peer that had
    /// reported the local window is forgotten without touching its count:
    /// the local leader announces that count itself.
    pub(crate) async fn drop_peer(&self, peer: &PeerId, local_authority: bool) -> DropOutcome {
        let mut state = self.state.write().await;
        let reported_local = state
            .registry
            .peer_window(peer)
            .is_some_and(|w| Some(w) == state.registry.local_window());
        if local_authority && reported_local {
            state.registry.forget_peer(peer);
            return DropOutcome::Unknown;
        }
        let outcome = state.registry.drop_peer(peer);
        drop(state);
        if let DropOutcome::Removed { event, .. } = &outcome {
            self.publish(Some(event.clone()));
        }
        outcome
    }

    pub(crate) async fn clear(&self) -> usize {
        let removed = self.state.write().await.registry.clear();
        let count = removed.len();
        for event in removed {
            self.publish(Some(event));
        }
        count
    }

    fn publish(&self, event: Option<WindowEvent>) {
        if let Some(event) = event {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}
