//! Sender and receiver session state machines.
//!
//! A session owns one [`TransferSession`](shata_transfer::TransferSession),
//! drives the pairing handshake over a
//! [`PeerTransport`](shata_data_channel::PeerTransport), runs the matching
//! transfer engine and reports every step as a [`SessionEvent`].

pub mod config;
pub mod error;
mod handshake;
pub mod receiver;
pub mod sender;
pub mod types;

pub use config::SessionConfig;
pub use error::{ErrorKind, SessionError};
pub use receiver::ReceiverSession;
pub use sender::SenderSession;
pub use types::{SESSION_EVENT_CAPACITY, SessionEvent, SessionEvents};
