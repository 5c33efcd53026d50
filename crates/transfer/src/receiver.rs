//! Receiver side: index-addressed reassembly driven one message at a time.

use tracing::{debug, info, trace, warn};

use shata_protocol::constants::CHUNK_SIZE;
use shata_protocol::{ChunkMessage, FileMetadata, WireMessage};

use crate::TransferError;
use crate::chunked::{ChunkAssembler, ReceivedFile, chunk_count};
use crate::progress::TransferProgress;
use crate::types::{SessionState, TransferSession};

/// What a single inbound message changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverUpdate {
    /// Metadata arrived; the session is now `Receiving`.
    Started(FileMetadata),
    /// A chunk was stored.
    Progress(TransferProgress),
    /// `complete` arrived; the session is now `Complete`.
    Finished(ReceivedFile),
}

/// Consumes wire messages in arrival order and rebuilds the file.
#[derive(Debug, Default)]
pub struct ReceiverEngine {
    assembler: ChunkAssembler,
    expected_chunks: u64,
    strict_size_check: bool,
}

impl ReceiverEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// With `strict`, a `complete` whose assembled size differs from the
    /// announced size fails instead of finishing with a short file.
    pub fn with_strict_size_check(mut self, strict: bool) -> Self {
        self.strict_size_check = strict;
        self
    }

    /// Applies one inbound message. Any error leaves the session in `Error`.
    pub fn on_message(
        &mut self,
        session: &mut TransferSession,
        msg: WireMessage,
    ) -> Result<ReceiverUpdate, TransferError> {
        let result = match msg {
            _ if session.state().is_terminal() => Err(TransferError::Protocol(format!(
                "{} received after the session ended",
                msg.kind()
            ))),
            WireMessage::Metadata(metadata) => self.on_metadata(session, metadata),
            WireMessage::Chunk(chunk) => self.on_chunk(session, chunk),
            WireMessage::Complete => self.on_complete(session),
        };
        if let Err(e) = &result {
            warn!(error = %e, "receive failed");
            session.set_state(SessionState::Error);
        }
        result
    }

    /// Handles the channel closing. A close after the session ended is a
    /// normal shutdown; anything earlier fails the session.
    pub fn on_close(&mut self, session: &mut TransferSession) -> Result<(), TransferError> {
        match session.state() {
            SessionState::Complete | SessionState::Error => Ok(()),
            _ => {
                let received = session.bytes_transferred();
                let expected = session.metadata().map(|m| m.size);
                warn!(received, ?expected, "channel closed before completion");
                session.set_state(SessionState::Error);
                Err(TransferError::ConnectionLost { received, expected })
            }
        }
    }

    fn on_metadata(
        &mut self,
        session: &mut TransferSession,
        metadata: FileMetadata,
    ) -> Result<ReceiverUpdate, TransferError> {
        session.begin(metadata.clone())?;
        self.assembler = ChunkAssembler::new();
        self.expected_chunks = chunk_count(metadata.size, CHUNK_SIZE);
        session.set_state(SessionState::Receiving);
        info!(
            name = %metadata.name,
            size = metadata.size,
            mime = %metadata.mime_type,
            chunks = self.expected_chunks,
            "receiving file"
        );
        Ok(ReceiverUpdate::Started(metadata))
    }

    fn on_chunk(
        &mut self,
        session: &mut TransferSession,
        chunk: ChunkMessage,
    ) -> Result<ReceiverUpdate, TransferError> {
        if session.metadata().is_none() {
            return Err(TransferError::Protocol(format!(
                "chunk {} before metadata",
                chunk.index
            )));
        }
        if chunk.payload.len() > CHUNK_SIZE {
            return Err(TransferError::Protocol(format!(
                "chunk {} carries {} bytes, limit is {CHUNK_SIZE}",
                chunk.index,
                chunk.payload.len()
            )));
        }
        if chunk.index >= self.expected_chunks {
            return Err(TransferError::Protocol(format!(
                "chunk index {} out of range, file has {} chunks",
                chunk.index, self.expected_chunks
            )));
        }

        let len = chunk.payload.len();
        if let Some(stored) = self.assembler.payload_len(chunk.index)
            && stored != len
        {
            return Err(TransferError::Protocol(format!(
                "chunk {} resent with {len} bytes, first copy had {stored}",
                chunk.index
            )));
        }
        if let Some(previous) = self.assembler.insert(chunk.index, chunk.payload) {
            warn!(index = chunk.index, previous, len, "duplicate chunk replaced");
        }
        session.set_bytes_transferred(self.assembler.total_bytes());
        trace!(index = chunk.index, len, total = self.assembler.total_bytes(), "chunk stored");

        session
            .progress()
            .map(ReceiverUpdate::Progress)
            .ok_or_else(|| TransferError::Protocol("progress without metadata".into()))
    }

    fn on_complete(
        &mut self,
        session: &mut TransferSession,
    ) -> Result<ReceiverUpdate, TransferError> {
        let Some(metadata) = session.metadata().cloned() else {
            return Err(TransferError::Protocol("complete before metadata".into()));
        };

        let assembler = std::mem::take(&mut self.assembler);
        let missing_chunks = assembler.missing_count(self.expected_chunks);
        let data = assembler.assemble();
        let actual = data.len() as u64;

        if actual != metadata.size || missing_chunks > 0 {
            warn!(
                expected = metadata.size,
                actual,
                missing_chunks,
                "assembled file does not match metadata"
            );
            if self.strict_size_check {
                return Err(TransferError::SizeMismatch {
                    expected: metadata.size,
                    actual,
                });
            }
        }

        session.set_state(SessionState::Complete);
        debug!(name = %metadata.name, bytes = actual, "file assembled");
        Ok(ReceiverUpdate::Finished(ReceivedFile {
            metadata,
            data,
            missing_chunks,
        }))
    }
}
