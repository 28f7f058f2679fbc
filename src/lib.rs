pub mod config;
pub mod engine;
pub mod ips;
pub mod mpr;
pub mod net;
pub mod node;
pub mod topology;
pub mod types;
mod unicast;
pub mod viz;

pub use config::{Config, ConfigError, Side, Timers, Workload};
pub use engine::{Action, Engine};
pub use ips::Ips;
pub use net::{
    discover_interfaces, BroadcastTransport, CodecError, CustomKey, LinkInterface, Message,
    NeighborEntry, TransportError,
};
pub use node::{Node, StartupError};
pub use topology::{NodeInfo, TopologyDb, TopologySnapshot};
pub use viz::{Visualizer, VizError, VizStyle};
