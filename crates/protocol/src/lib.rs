//! Wire protocol shared by the shata sender and receiver.
//!
//! A transfer is exactly three kinds of message on an ordered, reliable
//! data channel: one `metadata`, zero or more `chunk`s in index order,
//! then one `complete`. There is no version field; both ends must be
//! upgraded together.

pub mod codec;
pub mod constants;
pub mod messages;

pub use codec::{CodecError, decode, encode};
pub use messages::{ChunkMessage, FileMetadata, WireMessage};
