//! Wire formats and the broadcast transport.

pub mod broadcast;
pub mod message;

pub use broadcast::{discover_interfaces, BroadcastTransport, LinkInterface, TransportError};
pub use message::{CodecError, CustomKey, Message, NeighborEntry};
