//! Sender side: metadata, ordered chunks under a buffer gate, then completion.

use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use shata_data_channel::{ChannelError, DataChannel};
use shata_protocol::WireMessage;
use shata_protocol::constants::{BUFFER_HIGH_WATER_MARK, BUFFER_POLL_INTERVAL, CHUNK_SIZE};

use crate::TransferError;
use crate::chunked::{ChunkReader, FileSource};
use crate::progress::TransferProgress;
use crate::types::{SessionState, TransferSession};

/// Tuning for [`SenderEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// The engine waits while the channel has more than this many bytes queued.
    pub high_water_mark: usize,
    /// How often the buffer is re-checked while waiting.
    pub poll_interval: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            high_water_mark: BUFFER_HIGH_WATER_MARK,
            poll_interval: BUFFER_POLL_INTERVAL,
        }
    }
}

/// Streams one file over a [`DataChannel`].
///
/// Exactly one read/send pair is in flight at a time. Before each chunk the
/// engine polls the channel's pending bytes until they drop to the high-water
/// mark; the wait ends early if the channel closes or the token is cancelled.
pub struct SenderEngine {
    options: SendOptions,
    cancel: CancellationToken,
    progress_tx: Option<mpsc::Sender<TransferProgress>>,
}

impl SenderEngine {
    pub fn new(options: SendOptions, cancel: CancellationToken) -> Self {
        Self {
            options,
            cancel,
            progress_tx: None,
        }
    }

    /// Publishes a progress snapshot after every chunk. Snapshots are dropped
    /// when the receiver lags behind.
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Sends `source` over `channel`, accounting on `session`.
    ///
    /// On success the session ends in `Complete` and the number of payload
    /// bytes sent is returned. Any failure leaves the session in `Error`.
    pub async fn send<C, R>(
        &self,
        channel: &C,
        session: &mut TransferSession,
        source: FileSource<R>,
    ) -> Result<u64, TransferError>
    where
        C: DataChannel + ?Sized,
        R: AsyncRead + Unpin,
    {
        match self.run(channel, session, source).await {
            Ok(sent) => {
                session.set_state(SessionState::Complete);
                Ok(sent)
            }
            Err(e) => {
                warn!(error = %e, sent = session.bytes_transferred(), "send aborted");
                session.set_state(SessionState::Error);
                Err(e)
            }
        }
    }

    async fn run<C, R>(
        &self,
        channel: &C,
        session: &mut TransferSession,
        source: FileSource<R>,
    ) -> Result<u64, TransferError>
    where
        C: DataChannel + ?Sized,
        R: AsyncRead + Unpin,
    {
        self.check_cancelled()?;

        let FileSource { metadata, reader } = source;
        let size = metadata.size;
        let name = metadata.name.clone();

        if let Some(existing) = session.metadata() {
            return Err(TransferError::Protocol(format!(
                "session already carries metadata for {:?}",
                existing.name
            )));
        }
        channel.send(&WireMessage::Metadata(metadata.clone()))?;
        session.begin(metadata)?;
        session.set_state(SessionState::Transferring);
        info!(name = %name, size, "transfer started");

        let mut reader = ChunkReader::new(reader, size, CHUNK_SIZE);
        let mut sent: u64 = 0;

        while let Some(chunk) = reader.next_chunk().await? {
            self.check_cancelled()?;
            self.wait_for_buffer(channel).await?;

            let len = chunk.data.len();
            channel.send(&WireMessage::chunk(chunk.index, chunk.data))?;
            sent += len as u64;
            session.set_bytes_transferred(sent);
            trace!(index = chunk.index, len, sent, "chunk sent");

            self.emit_progress(session);
        }

        self.check_cancelled()?;
        channel.send(&WireMessage::Complete)?;
        info!(name = %name, bytes = sent, "transfer complete");
        Ok(sent)
    }

    /// Polls until the channel's pending bytes are at or below the
    /// high-water mark.
    async fn wait_for_buffer<C>(&self, channel: &C) -> Result<(), TransferError>
    where
        C: DataChannel + ?Sized,
    {
        let mut logged = false;
        loop {
            self.check_cancelled()?;
            if !channel.is_open() {
                return Err(ChannelError::Closed.into());
            }

            let pending = channel.pending_bytes();
            if pending <= self.options.high_water_mark {
                return Ok(());
            }
            if !logged {
                debug!(pending, limit = self.options.high_water_mark, "waiting for buffer to drain");
                logged = true;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.options.poll_interval) => {}
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn emit_progress(&self, session: &TransferSession) {
        if let Some(tx) = &self.progress_tx
            && let Some(progress) = session.progress()
        {
            let _ = tx.try_send(progress);
        }
    }
}
