//! Remote registry: reconciles snapshots and deltas into window records.
//!
//! Single-threaded and deterministic. No IO, no clock access: callers pass
//! `now` in. Every mutation returns the [`RegistryEvent`] to publish, or
//! `None` when observers should not be told anything.
//!
//! Consistency model: per-field last-write-wins in arrival order. There is
//! no version vector, so a delta that arrives late can overwrite a newer
//! value, and a `remove` can overtake an `update` sent earlier by another
//! peer. Both are accepted limitations of the protocol.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WireError;
use crate::types::{Metrics, PeerId, WindowId};
use crate::wire::WindowMessage;

// ─── Records & events ────────────────────────────────────────────────

/// Reconciled, network-visible state of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub id: WindowId,
    /// Live peers associated with this window, as last reported. Never 0:
    /// a record whose count reaches 0 is removed.
    pub monitor_count: u32,
    pub metrics: Metrics,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Add,
    Update,
    Remove,
}

/// Change notification for observers of the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEvent {
    pub kind: EventKind,
    pub window_id: WindowId,
    /// Full metrics of the record after (or, for `remove`, at) the change.
    pub metrics: Metrics,
    /// Fields carried by the triggering message. `None` for add/remove.
    pub changed: Option<Metrics>,
}

/// Outcome of a peer leaving the network.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// The peer never reported a window, or its window is already gone.
    Unknown,
    /// Count decremented, record kept.
    Decremented { window_id: WindowId, monitor_count: u32 },
    /// Count reached zero; the record is gone.
    Removed { window_id: WindowId, event: RegistryEvent },
}

impl DropOutcome {
    pub fn window_id(&self) -> Option<&WindowId> {
        match self {
            Self::Unknown => None,
            Self::Decremented { window_id, .. }
            | Self::Removed { window_id, .. } => Some(window_id),
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────

/// Ordered collection of window records plus the peer → window index.
#[derive(Debug, Default)]
pub struct RemoteRegistry {
    /// The window this process belongs to; its record carries `current`.
    local_window: Option<WindowId>,
    /// Records in insertion order. Updates never reorder.
    records: Vec<WindowRecord>,
    /// Weak back-reference used to clean up on drop. Entries pointing at a
    /// removed record are pruned with it.
    peers: HashMap<PeerId, WindowId>,
}

impl RemoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_window(local_window: WindowId) -> Self {
        Self {
            local_window: Some(local_window),
            ..Self::default()
        }
    }

    pub fn set_local_window(&mut self, window: WindowId) {
        self.local_window = Some(window);
    }

    pub fn local_window(&self) -> Option<&WindowId> {
        self.local_window.as_ref()
    }

    /// Validate and apply an inbound `window-metrics` payload from `sender`.
    pub fn apply_message(
        &mut self,
        sender: &PeerId,
        payload: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<Option<RegistryEvent>, WireError> {
        let msg = WindowMessage::parse(payload)?;
        Ok(self.apply(Some(sender), msg, now))
    }

    /// Apply a change produced by this process's own sampler.
    pub fn apply_local(
        &mut self,
        window: &WindowId,
        monitor_count: u32,
        changed: &Metrics,
        now: DateTime<Utc>,
    ) -> Option<RegistryEvent> {
        let unchanged = self
            .get(window)
            .is_some_and(|r| r.monitor_count == monitor_count && changed.is_empty());
        if unchanged {
            return None;
        }
        let msg = WindowMessage::new(window.clone(), monitor_count, changed.clone());
        self.apply(None, msg, now)
    }

    fn apply(
        &mut self,
        sender: Option<&PeerId>,
        msg: WindowMessage,
        now: DateTime<Utc>,
    ) -> Option<RegistryEvent> {
        let WindowMessage { id, cnt, mut metrics } = msg;

        // `current` describes the sender, not us.
        metrics.current = None;
        let is_local = self.local_window.as_ref() == Some(&id);

        if let Some(peer) = sender {
            self.peers.insert(peer.clone(), id.clone());
        }

        let Some(idx) = self.index_of(&id) else {
            if cnt == 0 {
                return None;
            }
            let mut seeded = metrics.clone();
            if is_local {
                seeded.current = Some(true);
            }
            let record = WindowRecord {
                id: id.clone(),
                monitor_count: cnt,
                metrics: seeded,
                updated_at: now,
            };
            let event = RegistryEvent {
                kind: EventKind::Add,
                window_id: id,
                metrics: record.metrics.clone(),
                changed: None,
            };
            self.records.push(record);
            return Some(event);
        };

        if cnt == 0 {
            return Some(self.remove_at(idx));
        }

        let record = &mut self.records[idx];
        record.metrics.merge(&metrics);
        record.monitor_count = cnt;
        record.updated_at = now;
        Some(RegistryEvent {
            kind: EventKind::Update,
            window_id: id,
            metrics: record.metrics.clone(),
            changed: Some(metrics),
        })
    }

    /// Forget `peer` and decrement the count of the window it reported.
    pub fn drop_peer(&mut self, peer: &PeerId) -> DropOutcome {
        let Some(window_id) = self.peers.remove(peer) else {
            return DropOutcome::Unknown;
        };
        let Some(idx) = self.index_of(&window_id) else {
            return DropOutcome::Unknown;
        };

        let record = &mut self.records[idx];
        record.monitor_count = record.monitor_count.saturating_sub(1);
        if record.monitor_count > 0 {
            return DropOutcome::Decremented {
                monitor_count: record.monitor_count,
                window_id,
            };
        }

        let event = self.remove_at(idx);
        DropOutcome::Removed { window_id, event }
    }

    /// Forget `peer` without touching any count.
    ///
    /// For the local leader's own window: the leader announces the count
    /// itself, so a drop of the previous leader must not be subtracted a
    /// second time.
    pub fn forget_peer(&mut self, peer: &PeerId) -> Option<WindowId> {
        self.peers.remove(peer)
    }

    /// Drop every record and peer association. Returns one `remove` event
    /// per record, in collection order.
    pub fn clear(&mut self) -> Vec<RegistryEvent> {
        self.peers.clear();
        self.records
            .drain(..)
            .map(|r| RegistryEvent {
                kind: EventKind::Remove,
                window_id: r.id,
                metrics: r.metrics,
                changed: None,
            })
            .collect()
    }

    pub fn windows(&self) -> &[WindowRecord] {
        &self.records
    }

    pub fn get(&self, id: &WindowId) -> Option<&WindowRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// The record of the window this process belongs to, once known.
    pub fn current(&self) -> Option<&WindowRecord> {
        let local = self.local_window.as_ref()?;
        self.get(local)
    }

    /// Window last reported by `peer`.
    pub fn peer_window(&self, peer: &PeerId) -> Option<&WindowId> {
        self.peers.get(peer)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn index_of(&self, id: &WindowId) -> Option<usize> {
        self.records.iter().position(|r| &r.id == id)
    }

    fn remove_at(&mut self, idx: usize) -> RegistryEvent {
        let record = self.records.remove(idx);
        self.peers.retain(|_, w| w != &record.id);
        RegistryEvent {
            kind: EventKind::Remove,
            window_id: record.id,
            metrics: record.metrics,
            changed: None,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
