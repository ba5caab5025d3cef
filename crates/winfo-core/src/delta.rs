//! Delta encoding between metric snapshots.
//!
//! [`diff`] is the pure comparison; [`DeltaEncoder`] keeps the last
//! broadcast snapshot so callers can feed it fresh samples and only get
//! back what actually changed. An empty delta means "do nothing": no
//! broadcast, no observer notification.

use crate::types::Metrics;

/// Result of comparing a partial sample against a previous snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    /// Fields of the sample that are new or differ from `previous`.
    pub changed: Metrics,
    /// `previous` with `changed` applied.
    pub updated: Metrics,
}

impl Delta {
    /// No field changed; callers must treat this as a no-op.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Compare every field present in `current` against `previous`.
///
/// A field lands in `changed` iff it is absent from `previous` or its value
/// differs. Fields absent from `current` are never reported. Values are
/// scalars, so plain inequality is enough.
pub fn diff(previous: &Metrics, current: &Metrics) -> Delta {
    let mut changed = Metrics::new();
    for (field, value) in current.fields() {
        if previous.get(field) != Some(value) {
            changed.set(field, value);
        }
    }

    let mut updated = previous.clone();
    updated.merge(&changed);

    Delta { changed, updated }
}

// ---------------------------------------------------------------------------
// DeltaEncoder
// ---------------------------------------------------------------------------

/// Tracks the last broadcast snapshot and turns samples into deltas.
#[derive(Debug, Clone, Default)]
pub struct DeltaEncoder {
    last: Metrics,
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `sample` against the last snapshot and absorb the result.
    ///
    /// Returns `None` when nothing changed.
    pub fn encode(&mut self, sample: &Metrics) -> Option<Metrics> {
        let delta = diff(&self.last, sample);
        if delta.is_empty() {
            return None;
        }
        self.last = delta.updated;
        Some(delta.changed)
    }

    /// Every field broadcast so far, merged.
    pub fn snapshot(&self) -> &Metrics {
        &self.last
    }

    /// Forget the previous snapshot so the next sample is reported in full.
    pub fn reset(&mut self) {
        self.last = Metrics::new();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
