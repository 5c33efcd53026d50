//! JSON framing for [`WireMessage`].
//!
//! One message per data-channel frame. Decoding is structural: it checks
//! that the frame is a well-formed message and that a chunk payload fits
//! in one segment, nothing about ordering.

use crate::constants::CHUNK_SIZE;
use crate::messages::WireMessage;

/// Errors produced while encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("chunk {index} payload is {len} bytes (max {max})")]
    PayloadTooLarge { index: u64, len: usize, max: usize },
}

/// Encodes a message into a single frame.
pub fn encode(msg: &WireMessage) -> Result<Vec<u8>, CodecError> {
    check_payload(msg)?;
    Ok(serde_json::to_vec(msg)?)
}

/// Decodes a single frame.
pub fn decode(frame: &[u8]) -> Result<WireMessage, CodecError> {
    let msg: WireMessage = serde_json::from_slice(frame)?;
    check_payload(&msg)?;
    Ok(msg)
}

fn check_payload(msg: &WireMessage) -> Result<(), CodecError> {
    if let WireMessage::Chunk(chunk) = msg
        && chunk.payload.len() > CHUNK_SIZE
    {
        return Err(CodecError::PayloadTooLarge {
            index: chunk.index,
            len: chunk.payload.len(),
            max: CHUNK_SIZE,
        });
    }
    Ok(())
}
