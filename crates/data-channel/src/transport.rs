//! Transport traits consumed by the sessions.

use tokio::sync::mpsc;

use shata_protocol::WireMessage;

use crate::error::ChannelError;

/// Events delivered by an established connection, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel is ready to carry messages.
    Open,
    /// A message from the peer.
    Data(WireMessage),
    /// The transport reported a failure. The channel may still close afterwards.
    Error(String),
    /// The channel is closed; no further events follow.
    Close,
}

/// Outbound half of a reliable, ordered, message-oriented channel.
pub trait DataChannel: Send + Sync {
    /// Enqueues `msg` for delivery. Fails if the channel is closed.
    fn send(&self, msg: &WireMessage) -> Result<(), ChannelError>;

    /// Bytes queued for sending but not yet flushed to the peer.
    fn pending_bytes(&self) -> usize;

    /// Whether the channel can still carry messages.
    fn is_open(&self) -> bool;

    /// Closes the channel. Idempotent.
    fn close(&self);
}

/// A channel plus the stream of events it produces.
pub struct Connection<C> {
    pub channel: C,
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// Registered endpoint waiting for a peer to connect.
pub trait PeerListener: Send {
    type Channel: DataChannel + 'static;

    /// Waits for the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Connection<Self::Channel>, ChannelError>> + Send;
}

/// Signaling and peer-connection establishment.
pub trait PeerTransport: Send + Sync {
    type Channel: DataChannel + 'static;
    type Listener: PeerListener<Channel = Self::Channel>;

    /// Registers this endpoint under `peer_id`.
    ///
    /// Returns [`ChannelError::IdentifierInUse`] when another endpoint
    /// already holds the id.
    fn register(
        &self,
        peer_id: &str,
    ) -> impl Future<Output = Result<Self::Listener, ChannelError>> + Send;

    /// Connects to the endpoint registered under `peer_id`.
    ///
    /// Returns [`ChannelError::PeerUnavailable`] when nobody holds the id.
    /// The returned connection emits [`ChannelEvent::Open`] once usable;
    /// callers enforce their own open timeout.
    fn connect(
        &self,
        peer_id: &str,
    ) -> impl Future<Output = Result<Connection<Self::Channel>, ChannelError>> + Send;
}
