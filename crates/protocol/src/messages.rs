//! Messages exchanged over a data channel during one transfer.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Describes the file being transferred. Sent once, before any chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
}

/// One segment of file data.
///
/// The `payload` field is base64-encoded in JSON and travels under the
/// `data` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMessage {
    pub index: u64,
    #[serde(rename = "data", with = "base64_bytes")]
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Every message exchanged over the data channel, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    Metadata(FileMetadata),
    Chunk(ChunkMessage),
    Complete,
}

impl WireMessage {
    /// Shorthand for a chunk message.
    pub fn chunk(index: u64, payload: Vec<u8>) -> Self {
        WireMessage::Chunk(ChunkMessage { index, payload })
    }

    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Metadata(_) => "metadata",
            WireMessage::Chunk(_) => "chunk",
            WireMessage::Complete => "complete",
        }
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
