use tokio::time::Instant;

use shata_protocol::FileMetadata;

use crate::TransferError;
use crate::progress::TransferProgress;

/// A segment of file data read by the sender.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Zero-based ordinal of this chunk within the file.
    pub index: u64,
    /// Byte offset of the first byte of `data` within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
}

/// Which end of the transfer a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Lifecycle state of a transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing in progress.
    Idle,
    /// Registering a pairing code (sender) or dialing one (receiver).
    Connecting,
    /// Sender is registered and waiting for the receiver to connect.
    WaitingForPeer,
    /// Receiver's channel is open; the file description has not arrived yet.
    AwaitingMetadata,
    /// Sender is streaming chunks.
    Transferring,
    /// Receiver is collecting chunks.
    Receiving,
    /// The transfer finished.
    Complete,
    /// The transfer failed; only `reset` leaves this state.
    Error,
}

impl SessionState {
    /// Returns `true` for `Complete` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Error)
    }
}

/// Per-role transfer state, owned by exactly one session.
#[derive(Debug)]
pub struct TransferSession {
    role: Role,
    state: SessionState,
    metadata: Option<FileMetadata>,
    bytes_transferred: u64,
    started_at: Option<Instant>,
}

impl TransferSession {
    /// Creates an idle session.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: SessionState::Idle,
            metadata: None,
            bytes_transferred: 0,
            started_at: None,
        }
    }

    /// Stores the file description and starts the clock.
    ///
    /// Metadata is set at most once per session.
    pub fn begin(&mut self, metadata: FileMetadata) -> Result<(), TransferError> {
        if let Some(existing) = &self.metadata {
            return Err(TransferError::Protocol(format!(
                "metadata already received for {:?}",
                existing.name
            )));
        }
        self.metadata = Some(metadata);
        self.bytes_transferred = 0;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Records the cumulative number of bytes moved so far.
    pub fn set_bytes_transferred(&mut self, total: u64) {
        self.bytes_transferred = total;
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Returns progress, or `None` before metadata is known.
    pub fn progress(&self) -> Option<TransferProgress> {
        let metadata = self.metadata.as_ref()?;
        let elapsed = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        Some(TransferProgress::compute(self.bytes_transferred, metadata.size, elapsed))
    }

    /// Discards everything and returns to `Idle`.
    pub fn reset(&mut self) {
        *self = Self::new(self.role);
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.metadata.as_ref()
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }
}
