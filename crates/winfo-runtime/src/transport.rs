//! Peer transport contract.
//!
//! A transport joins one named channel and reports lifecycle and message
//! events on the receiver handed out alongside it. Peer ids are assigned by
//! the transport and are fresh for every connection.

use serde_json::Value;
use winfo_core::PeerId;

use crate::error::TransportError;

/// Event delivered by a [`PeerTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The local endpoint joined the channel as `peer`.
    Connect { peer: PeerId },
    /// The local endpoint left the channel (explicitly or not).
    Disconnect,
    /// A remote peer is on the channel. `existed` is true when it was
    /// already present at the time the local endpoint connected.
    Join { peer: PeerId, existed: bool },
    /// A remote peer left the channel.
    Drop { peer: PeerId },
    Message {
        from: PeerId,
        message_type: String,
        payload: Value,
    },
}

pub trait PeerTransport: Send + Sync {
    /// Join `channel`. Completion is reported as [`TransportEvent::Connect`].
    fn open(&self, channel: &str) -> Result<(), TransportError>;

    /// Leave the channel. No-op when not connected.
    fn close(&self);

    /// Send to `target`, or to every other peer on the channel when `None`.
    fn send(
        &self,
        message_type: &str,
        target: Option<&PeerId>,
        payload: Value,
    ) -> Result<(), TransportError>;

    /// Network-wide unique identifier.
    fn generate_id(&self) -> String;

    /// Peer id of the current connection, if connected.
    fn local_peer(&self) -> Option<PeerId>;
}
