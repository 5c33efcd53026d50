//! Protocol constants.

use std::time::Duration;

/// Maximum payload carried by a single `chunk` message (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Pending outbound bytes above which the sender stops issuing chunks (1 MiB).
pub const BUFFER_HIGH_WATER_MARK: usize = 1024 * 1024;

/// How often the sender re-checks the channel's pending bytes while paused.
pub const BUFFER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long a receiver waits for the data channel to open.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Number of symbols in a pairing code.
pub const CODE_LENGTH: usize = 6;

/// Pairing code alphabet: upper-case letters and digits without `0/O` and `1/I`.
///
/// Lower-case `l` never appears because codes are upper-cased on entry.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Prefix of the transport identifier the sender registers under.
pub const PEER_ID_PREFIX: &str = "shata-";
