//! Session error type and its presentation-facing classification.

use std::time::Duration;

use shata_data_channel::ChannelError;
use shata_transfer::{SessionState, TransferError};

/// Coarse classification shown alongside a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The pairing code was taken. Recovered internally by regenerating.
    RegistrationConflict,
    PeerUnavailable,
    ConnectionTimeout,
    ConnectionLostMidTransfer,
    GenericTransportError,
    InvalidCode,
    /// Bad peer messages, local I/O or a size check failure.
    TransferFailed,
    Cancelled,
}

/// Errors surfaced by [`SenderSession`](crate::SenderSession) and
/// [`ReceiverSession`](crate::ReceiverSession).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("pairing code already in use: {0}")]
    RegistrationConflict(String),

    #[error("no free pairing code after {0} attempts")]
    RegistrationExhausted(u32),

    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    #[error("connection did not open within {0:?}")]
    ConnectionTimeout(Duration),

    #[error("connection lost after {received} bytes")]
    ConnectionLost { received: u64, expected: Option<u64> },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid code: {0}")]
    InvalidCode(String),

    #[error(transparent)]
    Transfer(TransferError),

    #[error("cancelled")]
    Cancelled,

    #[error("operation not allowed in state {0:?}")]
    InvalidState(SessionState),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::RegistrationConflict(_) => ErrorKind::RegistrationConflict,
            SessionError::PeerUnavailable(_) => ErrorKind::PeerUnavailable,
            SessionError::ConnectionTimeout(_) => ErrorKind::ConnectionTimeout,
            SessionError::ConnectionLost { .. } => ErrorKind::ConnectionLostMidTransfer,
            SessionError::InvalidCode(_) => ErrorKind::InvalidCode,
            SessionError::Transfer(_) => ErrorKind::TransferFailed,
            SessionError::Cancelled => ErrorKind::Cancelled,
            SessionError::RegistrationExhausted(_)
            | SessionError::Transport(_)
            | SessionError::InvalidState(_)
            | SessionError::Config(_) => ErrorKind::GenericTransportError,
        }
    }

    /// `RegistrationConflict` is the only kind a session recovers from.
    pub fn is_terminal(&self) -> bool {
        self.kind() != ErrorKind::RegistrationConflict
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::PeerUnavailable => "Invalid code or sender not available.".into(),
            ErrorKind::ConnectionTimeout => {
                "Connection timeout. Check the code and try again.".into()
            }
            ErrorKind::ConnectionLostMidTransfer => "Connection closed unexpectedly.".into(),
            ErrorKind::InvalidCode => "Please enter a 6-character code.".into(),
            ErrorKind::TransferFailed => format!("Transfer failed: {self}"),
            ErrorKind::Cancelled => "Transfer cancelled.".into(),
            ErrorKind::RegistrationConflict | ErrorKind::GenericTransportError => {
                "Connection error. Please try again.".into()
            }
        }
    }
}

impl From<ChannelError> for SessionError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::IdentifierInUse(id) => SessionError::RegistrationConflict(id),
            ChannelError::PeerUnavailable(id) => SessionError::PeerUnavailable(id),
            ChannelError::InvalidCode(reason) => SessionError::InvalidCode(reason),
            ChannelError::Closed => SessionError::Transport("channel closed".into()),
            ChannelError::Codec(e) => SessionError::Transport(e.to_string()),
            ChannelError::Transport(reason) => SessionError::Transport(reason),
        }
    }
}

impl From<TransferError> for SessionError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::ConnectionLost { received, expected } => {
                SessionError::ConnectionLost { received, expected }
            }
            TransferError::Cancelled => SessionError::Cancelled,
            TransferError::Channel(e) => e.into(),
            other => SessionError::Transfer(other),
        }
    }
}
