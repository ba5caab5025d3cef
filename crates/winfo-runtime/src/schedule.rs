//! Cancellable timers for the agent's select loop.
//!
//! Both types expose a future that stays pending while nothing is
//! scheduled, so they can sit in a `tokio::select!` branch unconditionally.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// One-shot deadline with trailing-edge semantics: re-arming pushes the
/// deadline out, so a burst of `arm` calls fires once after the last one.
#[derive(Debug, Default)]
pub struct ScheduledTask {
    deadline: Option<Instant>,
}

impl ScheduledTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `after` from now, replacing any pending deadline.
    pub fn arm(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves once the deadline passes, then disarms.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// deadline in place.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending().await,
        }
    }
}

/// Interval timer that can be started and stopped.
#[derive(Debug, Default)]
pub struct Ticker {
    interval: Option<Interval>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start ticking every `period`; the first tick is one period out.
    pub fn start(&mut self, period: Duration) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}
