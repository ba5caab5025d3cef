//! Error types for inbound message validation.

use thiserror::Error;

/// Why an inbound `window-metrics` payload was rejected.
///
/// Rejections are never reported back to the sender; callers log them and
/// move on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("payload missing")]
    MissingPayload,

    #[error("payload is not an object")]
    NotAnObject,

    #[error("cnt is not a non-negative integer")]
    InvalidCount,

    #[error("id is not a non-empty string")]
    InvalidId,

    #[error("metrics missing or not an object")]
    InvalidMetrics,

    #[error("metric field {field} has the wrong type")]
    InvalidField { field: &'static str },
}
