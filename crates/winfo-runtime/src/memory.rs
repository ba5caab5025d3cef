//! In-process transport hub.
//!
//! Every [`MemoryTransport`] handed out by a [`MemoryNetwork`] is one
//! endpoint. Events are delivered over unbounded channels in send order, so
//! each receiver sees a FIFO stream. Used by the simulator and the tests;
//! [`MemoryNetwork::sever`] injects a connectivity loss.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use winfo_core::PeerId;

use crate::error::TransportError;
use crate::transport::{PeerTransport, TransportEvent};

#[derive(Debug)]
struct Session {
    peer: PeerId,
    channel: String,
}

#[derive(Debug)]
struct Endpoint {
    tx: mpsc::UnboundedSender<TransportEvent>,
    session: Option<Session>,
}

impl Endpoint {
    fn deliver(&self, event: TransportEvent) {
        // A closed receiver means the owner is gone; nothing to tell.
        let _ = self.tx.send(event);
    }

    fn on_channel(&self, channel: &str) -> bool {
        self.session.as_ref().is_some_and(|s| s.channel == channel)
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    next_endpoint: u64,
    next_peer: u64,
    /// Ordered by creation so fan-out is deterministic.
    endpoints: BTreeMap<u64, Endpoint>,
}

impl NetworkState {
    fn leave(&mut self, key: u64) {
        let Some(session) = self
            .endpoints
            .get_mut(&key)
            .and_then(|e| e.session.take())
        else {
            return;
        };
        debug!(peer = %session.peer, channel = %session.channel, "memory: peer left");
        if let Some(endpoint) = self.endpoints.get(&key) {
            endpoint.deliver(TransportEvent::Disconnect);
        }
        for endpoint in self.endpoints.values() {
            if endpoint.on_channel(&session.channel) {
                endpoint.deliver(TransportEvent::Drop {
                    peer: session.peer.clone(),
                });
            }
        }
    }

    fn key_of(&self, peer: &PeerId) -> Option<u64> {
        self.endpoints
            .iter()
            .find(|(_, e)| e.session.as_ref().is_some_and(|s| &s.peer == peer))
            .map(|(k, _)| *k)
    }
}

/// Shared hub; clones refer to the same network.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new, unconnected endpoint and the receiver for its events.
    pub fn transport(&self) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let key = state.next_endpoint;
        state.next_endpoint += 1;
        state.endpoints.insert(key, Endpoint { tx, session: None });
        let transport = MemoryTransport {
            network: self.clone(),
            key,
        };
        (transport, rx)
    }

    /// Simulate a connectivity loss for `peer`: it sees `Disconnect`, the
    /// rest of its channel sees `Drop`. Returns false for unknown peers.
    pub fn sever(&self, peer: &PeerId) -> bool {
        let mut state = self.lock();
        match state.key_of(peer) {
            Some(key) => {
                state.leave(key);
                true
            }
            None => false,
        }
    }

    /// Peers currently on `channel`, in connection order.
    pub fn members(&self, channel: &str) -> Vec<PeerId> {
        let state = self.lock();
        let mut members: Vec<(u64, PeerId)> = state
            .endpoints
            .values()
            .filter_map(|e| e.session.as_ref())
            .filter(|s| s.channel == channel)
            .map(|s| (peer_seq(&s.peer), s.peer.clone()))
            .collect();
        members.sort_by_key(|(seq, _)| *seq);
        members.into_iter().map(|(_, p)| p).collect()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn peer_seq(peer: &PeerId) -> u64 {
    peer.as_str()
        .strip_prefix("peer-")
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

/// One endpoint on a [`MemoryNetwork`]. Dropping it leaves the channel.
#[derive(Debug)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    key: u64,
}

impl PeerTransport for MemoryTransport {
    fn open(&self, channel: &str) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let connected = state
            .endpoints
            .get(&self.key)
            .ok_or(TransportError::ChannelClosed)?
            .session
            .is_some();
        if connected {
            return Ok(());
        }

        let peer = PeerId::new(format!("peer-{}", state.next_peer));
        state.next_peer += 1;

        let existing: Vec<PeerId> = state
            .endpoints
            .values()
            .filter_map(|e| e.session.as_ref())
            .filter(|s| s.channel == channel)
            .map(|s| s.peer.clone())
            .collect();

        let Some(endpoint) = state.endpoints.get_mut(&self.key) else {
            return Err(TransportError::ChannelClosed);
        };
        endpoint.session = Some(Session {
            peer: peer.clone(),
            channel: channel.to_string(),
        });
        endpoint.deliver(TransportEvent::Connect { peer: peer.clone() });
        for other in &existing {
            endpoint.deliver(TransportEvent::Join {
                peer: other.clone(),
                existed: true,
            });
        }

        for (key, other) in &state.endpoints {
            if *key != self.key && other.on_channel(channel) {
                other.deliver(TransportEvent::Join {
                    peer: peer.clone(),
                    existed: false,
                });
            }
        }
        debug!(peer = %peer, channel, existing = existing.len(), "memory: peer joined");
        Ok(())
    }

    fn close(&self) {
        self.network.lock().leave(self.key);
    }

    fn send(
        &self,
        message_type: &str,
        target: Option<&PeerId>,
        payload: Value,
    ) -> Result<(), TransportError> {
        let state = self.network.lock();
        let session = state
            .endpoints
            .get(&self.key)
            .and_then(|e| e.session.as_ref())
            .ok_or(TransportError::NotConnected)?;

        let message = |from: &PeerId| TransportEvent::Message {
            from: from.clone(),
            message_type: message_type.to_string(),
            payload: payload.clone(),
        };

        match target {
            Some(target) => {
                let endpoint = state
                    .endpoints
                    .values()
                    .find(|e| {
                        e.session
                            .as_ref()
                            .is_some_and(|s| &s.peer == target && s.channel == session.channel)
                    })
                    .ok_or_else(|| TransportError::UnknownPeer(target.clone()))?;
                endpoint.deliver(message(&session.peer));
            }
            None => {
                for (key, endpoint) in &state.endpoints {
                    if *key != self.key && endpoint.on_channel(&session.channel) {
                        endpoint.deliver(message(&session.peer));
                    }
                }
            }
        }
        Ok(())
    }

    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn local_peer(&self) -> Option<PeerId> {
        self.network
            .lock()
            .endpoints
            .get(&self.key)
            .and_then(|e| e.session.as_ref())
            .map(|s| s.peer.clone())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        let mut state = self.network.lock();
        state.leave(self.key);
        state.endpoints.remove(&self.key);
    }
}
