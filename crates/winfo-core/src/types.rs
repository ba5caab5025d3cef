use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Identifiers ──────────────────────────────────────────────────

/// Network-wide identifier of a window. Minted once per window and shared
/// by every co-located agent of that window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(String);

impl WindowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WindowId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Transport-assigned identifier of a network participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Process-local identifier of one running agent. Never sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ─── Sensor readings ──────────────────────────────────────────────

/// Screen position of a window. `x`/`y` are resolved, `bx`/`by` raw.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub bx: f64,
    pub by: f64,
}

/// Viewport (`width`/`height`) and outer window (`bwidth`/`bheight`) size.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    pub bwidth: f64,
    pub bheight: f64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffsets {
    pub scrollx: f64,
    pub scrolly: f64,
}

/// Change notification emitted by a window sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorEvent {
    Focus,
    Blur,
    Scroll,
    Resize,
}

/// Synchronous read side of the local environment sensor.
///
/// Subscription to [`SensorEvent`]s is owned by the runtime; the core only
/// needs point-in-time reads.
pub trait WindowSensor: Send + Sync {
    fn read_focus(&self) -> bool;
    fn read_position(&self) -> Position;
    fn read_dimensions(&self) -> Dimensions;
    fn read_scroll(&self) -> ScrollOffsets;

    /// False when running in a nested context that cannot be told apart
    /// from its host window.
    fn is_top_level(&self) -> bool {
        true
    }
}

// ─── Metrics ──────────────────────────────────────────────────────

/// Named metric fields, spelled as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricField {
    X,
    Y,
    Bx,
    By,
    Width,
    Height,
    Bwidth,
    Bheight,
    ScrollX,
    ScrollY,
    Focus,
    Current,
}

impl MetricField {
    pub const ALL: [Self; 12] = [
        Self::X,
        Self::Y,
        Self::Bx,
        Self::By,
        Self::Width,
        Self::Height,
        Self::Bwidth,
        Self::Bheight,
        Self::ScrollX,
        Self::ScrollY,
        Self::Focus,
        Self::Current,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Bx => "bx",
            Self::By => "by",
            Self::Width => "width",
            Self::Height => "height",
            Self::Bwidth => "bwidth",
            Self::Bheight => "bheight",
            Self::ScrollX => "scrollx",
            Self::ScrollY => "scrolly",
            Self::Focus => "focus",
            Self::Current => "current",
        }
    }

    /// Flag fields hold booleans; every other field is numeric.
    pub fn is_flag(self) -> bool {
        matches!(self, Self::Focus | Self::Current)
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Flag(bool),
}

/// A full or partial set of window metrics.
///
/// Absent fields are `None` and are skipped when serialized, so the same
/// type carries snapshots, deltas, and reconciled records. Unknown keys are
/// ignored on deserialization.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bwidth: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bheight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrollx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrolly: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<bool>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: MetricField) -> Option<MetricValue> {
        match field {
            MetricField::Focus => self.focus.map(MetricValue::Flag),
            MetricField::Current => self.current.map(MetricValue::Flag),
            numeric => self.number(numeric).map(MetricValue::Number),
        }
    }

    /// Set a field. Returns `false` (and leaves the field untouched) when
    /// the value kind does not match the field.
    pub fn set(&mut self, field: MetricField, value: MetricValue) -> bool {
        match value {
            MetricValue::Number(n) => match self.number_slot(field) {
                Some(slot) => {
                    *slot = Some(n);
                    true
                }
                None => false,
            },
            MetricValue::Flag(b) => match self.flag_slot(field) {
                Some(slot) => {
                    *slot = Some(b);
                    true
                }
                None => false,
            },
        }
    }

    pub fn remove(&mut self, field: MetricField) {
        if let Some(slot) = self.number_slot(field) {
            *slot = None;
        } else if let Some(slot) = self.flag_slot(field) {
            *slot = None;
        }
    }

    pub fn contains(&self, field: MetricField) -> bool {
        self.get(field).is_some()
    }

    /// Present fields in wire order.
    pub fn fields(&self) -> impl Iterator<Item = (MetricField, MetricValue)> + '_ {
        MetricField::ALL
            .into_iter()
            .filter_map(move |f| self.get(f).map(|v| (f, v)))
    }

    pub fn len(&self) -> usize {
        self.fields().count()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().next().is_none()
    }

    /// Overwrite fields present in `other` (last write wins per field).
    pub fn merge(&mut self, other: &Metrics) {
        for (field, value) in other.fields() {
            self.set(field, value);
        }
    }

    pub fn with_focus(mut self, focus: bool) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn with_current(mut self, current: bool) -> Self {
        self.current = Some(current);
        self
    }

    fn number(&self, field: MetricField) -> Option<f64> {
        match field {
            MetricField::X => self.x,
            MetricField::Y => self.y,
            MetricField::Bx => self.bx,
            MetricField::By => self.by,
            MetricField::Width => self.width,
            MetricField::Height => self.height,
            MetricField::Bwidth => self.bwidth,
            MetricField::Bheight => self.bheight,
            MetricField::ScrollX => self.scrollx,
            MetricField::ScrollY => self.scrolly,
            MetricField::Focus | MetricField::Current => None,
        }
    }

    fn number_slot(&mut self, field: MetricField) -> Option<&mut Option<f64>> {
        match field {
            MetricField::X => Some(&mut self.x),
            MetricField::Y => Some(&mut self.y),
            MetricField::Bx => Some(&mut self.bx),
            MetricField::By => Some(&mut self.by),
            MetricField::Width => Some(&mut self.width),
            MetricField::Height => Some(&mut self.height),
            MetricField::Bwidth => Some(&mut self.bwidth),
            MetricField::Bheight => Some(&mut self.bheight),
            MetricField::ScrollX => Some(&mut self.scrollx),
            MetricField::ScrollY => Some(&mut self.scrolly),
            MetricField::Focus | MetricField::Current => None,
        }
    }

    fn flag_slot(&mut self, field: MetricField) -> Option<&mut Option<bool>> {
        match field {
            MetricField::Focus => Some(&mut self.focus),
            MetricField::Current => Some(&mut self.current),
            _ => None,
        }
    }
}

impl From<Position> for Metrics {
    fn from(p: Position) -> Self {
        Self {
            x: Some(p.x),
            y: Some(p.y),
            bx: Some(p.bx),
            by: Some(p.by),
            ..Self::default()
        }
    }
}

impl From<Dimensions> for Metrics {
    fn from(d: Dimensions) -> Self {
        Self {
            width: Some(d.width),
            height: Some(d.height),
            bwidth: Some(d.bwidth),
            bheight: Some(d.bheight),
            ..Self::default()
        }
    }
}

impl From<ScrollOffsets> for Metrics {
    fn from(s: ScrollOffsets) -> Self {
        Self {
            scrollx: Some(s.scrollx),
            scrolly: Some(s.scrolly),
            ..Self::default()
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
