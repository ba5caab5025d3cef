//! Metrics sampler state machine.
//!
//! Runs only on a window's leader. Each handler reads what it needs from a
//! [`WindowSensor`], feeds the [`DeltaEncoder`], and returns the effects the
//! runtime must apply: timer changes and broadcasts. The sampler owns no
//! timers itself.
//!
//! Position has no change notification, so it is polled while the window
//! is focused. Everything else is sampled when the sensor reports it.

use crate::delta::DeltaEncoder;
use crate::types::{Metrics, WindowSensor};

/// Work requested by the sampler.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerEffect {
    /// Begin interval position polling.
    StartPolling,
    StopPolling,
    /// (Re-)arm the trailing resize timer, replacing any pending one.
    ArmResizeSettle,
    CancelResizeSettle,
    /// Broadcast these changed fields.
    Broadcast(Metrics),
}

#[derive(Debug, Default)]
pub struct MetricsSampler {
    encoder: DeltaEncoder,
    focused: bool,
    resize_pending: bool,
    running: bool,
}

impl MetricsSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leadership acquired or handed over: sample everything fresh and
    /// broadcast a full snapshot. Cached state from a previous term is
    /// discarded.
    pub fn start<S: WindowSensor + ?Sized>(&mut self, sensor: &S) -> Vec<SamplerEffect> {
        self.encoder.reset();
        self.resize_pending = false;
        self.running = true;
        self.focused = sensor.read_focus();

        let mut effects = Vec::with_capacity(2);
        let full = full_sample(sensor, self.focused).with_current(true);
        if let Some(changed) = self.encoder.encode(&full) {
            effects.push(SamplerEffect::Broadcast(changed));
        }
        if self.focused {
            effects.push(SamplerEffect::StartPolling);
        }
        effects
    }

    /// Leadership lost or transport gone. Returns the timer cancellations.
    pub fn stop(&mut self) -> Vec<SamplerEffect> {
        self.running = false;
        self.focused = false;
        self.resize_pending = false;
        vec![SamplerEffect::StopPolling, SamplerEffect::CancelResizeSettle]
    }

    pub fn on_focus<S: WindowSensor + ?Sized>(&mut self, sensor: &S) -> Vec<SamplerEffect> {
        if !self.running {
            return Vec::new();
        }
        self.focused = true;
        let sample = Metrics::from(sensor.read_position()).with_focus(true);
        let mut effects = vec![SamplerEffect::StartPolling];
        effects.extend(self.emit(&sample));
        effects
    }

    /// Polling stops, but the focus change itself is still broadcast.
    pub fn on_blur(&mut self) -> Vec<SamplerEffect> {
        if !self.running {
            return Vec::new();
        }
        self.focused = false;
        let mut effects = vec![SamplerEffect::StopPolling];
        effects.extend(self.emit(&Metrics::new().with_focus(false)));
        effects
    }

    /// Scroll offsets only, emitted immediately.
    pub fn on_scroll<S: WindowSensor + ?Sized>(&mut self, sensor: &S) -> Vec<SamplerEffect> {
        if !self.running {
            return Vec::new();
        }
        self.emit(&Metrics::from(sensor.read_scroll()))
    }

    /// Resizes come in bursts; only the settled result is sampled.
    pub fn on_resize(&mut self) -> Vec<SamplerEffect> {
        if !self.running {
            return Vec::new();
        }
        self.resize_pending = true;
        vec![SamplerEffect::ArmResizeSettle]
    }

    /// Trailing resize timer fired with no further resize in between.
    ///
    /// Resizing can move any corner, so position is re-read with the
    /// dimensions and the net change goes out as one delta.
    pub fn on_resize_settled<S: WindowSensor + ?Sized>(
        &mut self,
        sensor: &S,
    ) -> Vec<SamplerEffect> {
        if !self.running || !self.resize_pending {
            return Vec::new();
        }
        self.resize_pending = false;
        let mut sample = Metrics::from(sensor.read_dimensions());
        sample.merge(&Metrics::from(sensor.read_position()));
        self.emit(&sample)
    }

    pub fn on_poll_tick<S: WindowSensor + ?Sized>(&mut self, sensor: &S) -> Vec<SamplerEffect> {
        if !self.running || !self.focused {
            return Vec::new();
        }
        self.emit(&Metrics::from(sensor.read_position()))
    }

    /// Everything broadcast this term; sent whole to newly joined peers.
    pub fn snapshot(&self) -> &Metrics {
        self.encoder.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    fn emit(&mut self, sample: &Metrics) -> Vec<SamplerEffect> {
        self.encoder
            .encode(sample)
            .map(SamplerEffect::Broadcast)
            .into_iter()
            .collect()
    }
}

fn full_sample<S: WindowSensor + ?Sized>(sensor: &S, focused: bool) -> Metrics {
    let mut m = Metrics::from(sensor.read_position());
    m.merge(&Metrics::from(sensor.read_dimensions()));
    m.merge(&Metrics::from(sensor.read_scroll()));
    m.with_focus(focused)
}

// ─── Tests ───────────────────────────────────────────────────────────
