//! In-process peer transport.
//!
//! Each direction of a [`MemoryChannel`] pair is an unbounded outbound
//! queue drained by a pump task into the peer's bounded event queue.
//! A frame counts towards [`pending_bytes`](DataChannel::pending_bytes)
//! from the moment it is enqueued until the pump hands it to the peer,
//! so a peer that stops reading makes the sender's pending bytes grow
//! exactly like a congested data channel would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use shata_protocol::{WireMessage, codec};

use crate::EVENT_QUEUE_CAPACITY;
use crate::error::ChannelError;
use crate::transport::{ChannelEvent, Connection, DataChannel, PeerListener, PeerTransport};

type Peers = HashMap<String, mpsc::Sender<Connection<MemoryChannel>>>;
type Registry = Arc<Mutex<Peers>>;

/// In-process transport: a registry of peer ids shared by every clone.
#[derive(Clone)]
pub struct MemoryNetwork {
    registry: Registry,
    event_capacity: usize,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::with_event_capacity(EVENT_QUEUE_CAPACITY)
    }

    /// Creates a network whose connections buffer at most `capacity`
    /// undelivered events per endpoint.
    pub fn with_event_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            event_capacity: capacity.max(1),
        }
    }

    /// Returns `true` if an endpoint is registered under `peer_id`.
    pub fn is_registered(&self, peer_id: &str) -> bool {
        self.registry
            .lock()
            .map(|r| r.contains_key(peer_id))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Peers>, ChannelError> {
        self.registry
            .lock()
            .map_err(|_| ChannelError::Transport("registry poisoned".into()))
    }
}

impl PeerTransport for MemoryNetwork {
    type Channel = MemoryChannel;
    type Listener = MemoryListener;

    async fn register(&self, peer_id: &str) -> Result<MemoryListener, ChannelError> {
        let mut registry = self.lock()?;
        if registry.contains_key(peer_id) {
            return Err(ChannelError::IdentifierInUse(peer_id.to_string()));
        }
        let (tx, rx) = mpsc::channel(1);
        registry.insert(peer_id.to_string(), tx);
        debug!(peer_id, "memory transport: registered");
        Ok(MemoryListener {
            peer_id: peer_id.to_string(),
            incoming: rx,
            registry: Arc::clone(&self.registry),
        })
    }

    async fn connect(&self, peer_id: &str) -> Result<Connection<MemoryChannel>, ChannelError> {
        let incoming = self
            .lock()?
            .get(peer_id)
            .cloned()
            .ok_or_else(|| ChannelError::PeerUnavailable(peer_id.to_string()))?;

        let (local, remote) = connection_pair(peer_id, self.event_capacity);
        incoming
            .send(remote)
            .await
            .map_err(|_| ChannelError::PeerUnavailable(peer_id.to_string()))?;

        debug!(peer_id, "memory transport: connected");
        Ok(local)
    }
}

/// Registered endpoint. Dropping it frees the peer id.
pub struct MemoryListener {
    peer_id: String,
    incoming: mpsc::Receiver<Connection<MemoryChannel>>,
    registry: Registry,
}

impl PeerListener for MemoryListener {
    type Channel = MemoryChannel;

    async fn accept(&mut self) -> Result<Connection<MemoryChannel>, ChannelError> {
        self.incoming.recv().await.ok_or(ChannelError::Closed)
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.remove(&self.peer_id);
        }
        trace!(peer_id = %self.peer_id, "memory transport: unregistered");
    }
}

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// One endpoint of an in-process data channel.
pub struct MemoryChannel {
    label: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Arc<AtomicUsize>,
    open: Arc<AtomicBool>,
}

impl MemoryChannel {
    /// Human-readable channel label (the peer id it was created for).
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl DataChannel for MemoryChannel {
    fn send(&self, msg: &WireMessage) -> Result<(), ChannelError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        let frame = codec::encode(msg)?;
        let len = frame.len();
        self.pending.fetch_add(len, Ordering::AcqRel);
        if self.outbound.send(Outbound::Frame(frame)).is_err() {
            self.pending.fetch_sub(len, Ordering::AcqRel);
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    fn pending_bytes(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            // Delivered after anything already queued.
            let _ = self.outbound.send(Outbound::Close);
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builds two connected endpoints. Both start with an `Open` event queued.
fn connection_pair(
    label: &str,
    capacity: usize,
) -> (Connection<MemoryChannel>, Connection<MemoryChannel>) {
    let open = Arc::new(AtomicBool::new(true));
    let (a_events_tx, a_events_rx) = mpsc::channel(capacity);
    let (b_events_tx, b_events_rx) = mpsc::channel(capacity);

    let a = endpoint(label, &open, b_events_tx.clone());
    let b = endpoint(label, &open, a_events_tx.clone());

    // Fresh queues with capacity >= 1 always have room.
    let _ = a_events_tx.try_send(ChannelEvent::Open);
    let _ = b_events_tx.try_send(ChannelEvent::Open);

    (
        Connection {
            channel: a,
            events: a_events_rx,
        },
        Connection {
            channel: b,
            events: b_events_rx,
        },
    )
}

fn endpoint(
    label: &str,
    open: &Arc<AtomicBool>,
    peer_events: mpsc::Sender<ChannelEvent>,
) -> MemoryChannel {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    tokio::spawn(pump(
        label.to_string(),
        rx,
        peer_events,
        Arc::clone(&pending),
        Arc::clone(open),
    ));
    MemoryChannel {
        label: label.to_string(),
        outbound: tx,
        pending,
        open: Arc::clone(open),
    }
}

/// Moves frames from one endpoint's outbound queue to the other's events.
async fn pump(
    label: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    peer_events: mpsc::Sender<ChannelEvent>,
    pending: Arc<AtomicUsize>,
    open: Arc<AtomicBool>,
) {
    while let Some(item) = outbound.recv().await {
        let frame = match item {
            Outbound::Frame(frame) => frame,
            Outbound::Close => break,
        };
        let len = frame.len();
        let event = match codec::decode(&frame) {
            Ok(msg) => ChannelEvent::Data(msg),
            Err(e) => ChannelEvent::Error(format!("undecodable frame: {e}")),
        };
        let delivered = peer_events.send(event).await.is_ok();
        pending.fetch_sub(len, Ordering::AcqRel);
        if !delivered {
            // Peer stopped listening.
            break;
        }
    }

    open.store(false, Ordering::Release);
    let _ = peer_events.send(ChannelEvent::Close).await;
    trace!(channel = %label, "memory transport: pump finished");
}
