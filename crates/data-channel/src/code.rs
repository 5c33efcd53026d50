//! Pairing code generation and entry normalization.
//!
//! Codes are a rendezvous token typed by a human, not a secret: 6 symbols
//! from a 32-symbol alphabet gives about 30 bits, and `thread_rng` is good
//! enough for that. Collisions are resolved by the sender session, which
//! regenerates on `IdentifierInUse`.

use rand::Rng;

use shata_protocol::constants::{CODE_ALPHABET, CODE_LENGTH, PEER_ID_PREFIX};

use crate::error::ChannelError;

/// Generates a uniformly random pairing code.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Normalizes a code as typed by the user: trims and upper-cases it, then
/// checks length and alphabet.
pub fn normalize_code(input: &str) -> Result<String, ChannelError> {
    let code = input.trim().to_uppercase();
    if code.chars().count() != CODE_LENGTH {
        return Err(ChannelError::InvalidCode(format!(
            "please enter a {CODE_LENGTH}-character code"
        )));
    }
    if let Some(bad) = code.bytes().find(|b| !CODE_ALPHABET.contains(b)) {
        return Err(ChannelError::InvalidCode(format!(
            "unexpected character {:?}",
            char::from(bad)
        )));
    }
    Ok(code)
}

/// Transport identifier the sender registers under for `code`.
pub fn peer_id(code: &str) -> String {
    format!("{PEER_ID_PREFIX}{}", code.to_lowercase())
}
