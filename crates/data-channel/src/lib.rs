//! Peer transport seam for shata transfers.
//!
//! The sessions talk to the outside world only through the traits in
//! [`transport`]: a sender registers under a peer id derived from a
//! pairing code, a receiver connects to it, and both then exchange
//! [`WireMessage`](shata_protocol::WireMessage)s over a [`DataChannel`].
//!
//! [`memory`] provides an in-process implementation with real
//! pending-byte accounting, used by the CLI and the integration tests.

pub mod code;
pub mod error;
pub mod memory;
pub mod transport;

pub use code::{generate_code, normalize_code, peer_id};
pub use error::ChannelError;
pub use memory::{MemoryChannel, MemoryListener, MemoryNetwork};
pub use transport::{ChannelEvent, Connection, DataChannel, PeerListener, PeerTransport};

/// Capacity of the per-connection event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 64;
