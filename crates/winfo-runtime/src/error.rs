//! Error types for the runtime crate.

use thiserror::Error;
use winfo_core::PeerId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),

    #[error("transport channel closed")]
    ChannelClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
