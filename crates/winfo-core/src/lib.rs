//! winfo-core: window-metrics synchronization core.
//! Wire schema, delta encoding, leadership slots, the remote registry and
//! the sampler state machine. No IO, no async, no clock access.

pub mod backoff;
pub mod delta;
pub mod error;
pub mod registry;
pub mod sampler;
pub mod slot;
pub mod types;
pub mod wire;

pub use backoff::{ReconnectBackoff, ReconnectPolicy};
pub use delta::{Delta, DeltaEncoder, diff};
pub use error::WireError;
pub use registry::{DropOutcome, EventKind, RegistryEvent, RemoteRegistry, WindowRecord};
pub use sampler::{MetricsSampler, SamplerEffect};
pub use slot::{Acquisition, Release, SharedSlot, SlotTable};
pub use types::{
    AgentId, Dimensions, MetricField, MetricValue, Metrics, PeerId, Position, ScrollOffsets,
    SensorEvent, WindowId, WindowSensor,
};
pub use wire::{WINDOW_METRICS, WindowMessage};
