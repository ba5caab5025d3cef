//! Reconnect backoff after a transport disconnect.
//!
//! Pure state machine: it only computes delays. The runtime arms the timer
//! and reopens the transport.

use serde::{Deserialize, Serialize};

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt in milliseconds (default 250).
    pub initial_backoff_ms: u64,
    /// Growth factor per consecutive attempt (default 2.0).
    pub multiplier: f64,
    /// Upper bound on any single delay in milliseconds (default 10000).
    pub max_backoff_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 250,
            multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

/// Tracks consecutive reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt. Each call counts as one attempt.
    pub fn next_delay_ms(&mut self) -> u64 {
        let exp = i32::try_from(self.attempt).unwrap_or(i32::MAX);
        let raw = (self.policy.initial_backoff_ms as f64) * self.policy.multiplier.powi(exp);
        self.attempt = self.attempt.saturating_add(1);
        if !raw.is_finite() {
            return self.policy.max_backoff_ms;
        }
        (raw as u64).min(self.policy.max_backoff_ms)
    }

    /// Connection established; the next failure starts from scratch.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
