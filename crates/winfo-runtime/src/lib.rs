//! winfo-runtime: async runtime for window-metrics synchronization.
//! Transport and sensor contracts, the in-memory network, timers, the
//! leadership coordinator and the local agent loop.

pub mod agent;
pub mod collection;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod schedule;
pub mod sensor;
pub mod simulate;
pub mod transport;

pub use agent::{AgentHandle, AgentStatus, LocalAgent};
pub use collection::{WindowCollection, WindowEvent};
pub use config::AgentConfig;
pub use coordinator::{AgentCommand, LeadershipCoordinator};
pub use error::{ConfigError, TransportError};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use schedule::{ScheduledTask, Ticker};
pub use sensor::{LocalWindow, SensorSource, SimulatedWindow};
pub use transport::{PeerTransport, TransportEvent};
