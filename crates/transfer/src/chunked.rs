use std::collections::BTreeMap;
use std::io::Cursor;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt};

use shata_protocol::FileMetadata;

use crate::TransferError;
use crate::types::Chunk;

// ---------------------------------------------------------------------------
// Segmentation
// ---------------------------------------------------------------------------

/// Number of chunks a file of `size` bytes splits into.
pub fn chunk_count(size: u64, chunk_size: usize) -> u64 {
    size.div_ceil(chunk_size as u64)
}

/// Byte ranges of each chunk, in index order. Tiles `[0, size)` exactly.
pub fn chunk_ranges(size: u64, chunk_size: usize) -> impl Iterator<Item = Range<u64>> {
    let step = chunk_size as u64;
    (0..chunk_count(size, chunk_size)).map(move |i| {
        let start = i * step;
        start..(start + step).min(size)
    })
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// A readable file of known size together with its description.
pub struct FileSource<R> {
    pub metadata: FileMetadata,
    pub reader: R,
}

impl<R: AsyncRead + Unpin> FileSource<R> {
    pub fn new(metadata: FileMetadata, reader: R) -> Self {
        Self { metadata, reader }
    }
}

impl FileSource<tokio::fs::File> {
    /// Opens a file on disk. The name is the path's final component.
    pub async fn open(path: &Path, mime_type: &str) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))?;
        Ok(Self {
            metadata: FileMetadata {
                name,
                size,
                mime_type: mime_type.to_string(),
            },
            reader: file,
        })
    }
}

impl FileSource<Cursor<Vec<u8>>> {
    /// Wraps an in-memory buffer.
    pub fn from_bytes(name: &str, mime_type: &str, data: Vec<u8>) -> Self {
        Self {
            metadata: FileMetadata {
                name: name.to_string(),
                size: data.len() as u64,
                mime_type: mime_type.to_string(),
            },
            reader: Cursor::new(data),
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a source of known size in fixed-size, consecutively indexed chunks.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    offset: u64,
    size: u64,
    next_index: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wraps `reader`, which must yield at least `size` bytes.
    ///
    /// A `chunk_size` of 0 is treated as 1.
    pub fn new(reader: R, size: u64, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            offset: 0,
            size,
            next_index: 0,
        }
    }

    /// Reads the next chunk. Returns `None` once `size` bytes were read.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        if let Err(e) = self.reader.read_exact(&mut buf).await {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => TransferError::SourceTruncated {
                    expected: self.size,
                    read: self.offset,
                },
                _ => e.into(),
            });
        }

        let chunk = Chunk {
            index: self.next_index,
            offset: self.offset,
            data: buf,
        };
        self.offset += read_size as u64;
        self.next_index += 1;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.size - self.offset
    }
}

// ---------------------------------------------------------------------------
// ChunkAssembler
// ---------------------------------------------------------------------------

/// Index-addressed chunk store. The last payload written for an index wins.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    chunks: BTreeMap<u64, Vec<u8>>,
    total_bytes: u64,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `payload` at `index`. Returns the length of the payload it
    /// replaced, if any.
    pub fn insert(&mut self, index: u64, payload: Vec<u8>) -> Option<usize> {
        self.total_bytes += payload.len() as u64;
        let previous = self.chunks.insert(index, payload).map(|old| old.len());
        if let Some(old_len) = previous {
            self.total_bytes -= old_len as u64;
        }
        previous
    }

    /// Length of the payload stored at `index`, if any.
    pub fn payload_len(&self, index: u64) -> Option<usize> {
        self.chunks.get(&index).map(Vec::len)
    }

    /// Sum of the lengths of all stored payloads.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of distinct indices stored.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Indices in `0..expected` that were never stored.
    pub fn missing_count(&self, expected: u64) -> u64 {
        let present = self.chunks.range(..expected).count() as u64;
        expected - present
    }

    /// Concatenates the stored payloads in index order. Gaps are skipped.
    pub fn assemble(self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.total_bytes as usize);
        for payload in self.chunks.into_values() {
            data.extend_from_slice(&payload);
        }
        data
    }
}

// ---------------------------------------------------------------------------
// ReceivedFile
// ---------------------------------------------------------------------------

/// The reassembled file handed to whoever saves it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFile {
    pub metadata: FileMetadata,
    pub data: Vec<u8>,
    /// Chunks the metadata implied but that never arrived.
    pub missing_chunks: u64,
}

impl ReceivedFile {
    /// Returns `true` if the assembled length equals the announced size.
    pub fn size_matches(&self) -> bool {
        self.data.len() as u64 == self.metadata.size
    }

    pub fn mime_type(&self) -> &str {
        &self.metadata.mime_type
    }

    /// Writes the file into `dir` under its announced name.
    ///
    /// The name comes from the peer, so it must be a bare file name.
    pub async fn save_to(&self, dir: &Path) -> Result<PathBuf, TransferError> {
        crate::validate_file_name(&self.metadata.name)?;
        let path = dir.join(&self.metadata.name);
        tokio::fs::write(&path, &self.data).await?;
        Ok(path)
    }
}
