//! Chunked single-file transfer over a paired data channel.
//!
//! [`SenderEngine`] splits a file into fixed-size chunks and feeds them to a
//! [`DataChannel`](shata_data_channel::DataChannel), pausing while the
//! channel's outbound buffer is above the high-water mark.
//! [`ReceiverEngine`] consumes the resulting messages and reassembles the
//! file by chunk index. Both account progress on a [`TransferSession`].

mod chunked;
mod progress;
mod receiver;
mod sender;
mod types;
mod validation;

pub use chunked::{ChunkAssembler, ChunkReader, FileSource, ReceivedFile, chunk_count, chunk_ranges};
pub use progress::{TransferProgress, format_size};
pub use receiver::{ReceiverEngine, ReceiverUpdate};
pub use sender::{SendOptions, SenderEngine};
pub use types::{Chunk, Role, SessionState, TransferSession};
pub use validation::validate_file_name;

use shata_data_channel::ChannelError;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("size mismatch: expected {expected} bytes, assembled {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("source ended after {read} of {expected} bytes")]
    SourceTruncated { expected: u64, read: u64 },

    #[error("connection closed unexpectedly after {received} bytes")]
    ConnectionLost { received: u64, expected: Option<u64> },

    #[error("cancelled")]
    Cancelled,

    #[error("invalid file name: {0}")]
    InvalidFileName(String),
}
