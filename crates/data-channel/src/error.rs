//! Error types for the data channel.

use shata_protocol::CodecError;

/// Errors reported by a peer transport or one of its channels.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("identifier already in use: {0}")]
    IdentifierInUse(String),

    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    #[error("channel closed")]
    Closed,

    #[error("invalid pairing code: {0}")]
    InvalidCode(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("transport error: {0}")]
    Transport(String),
}
