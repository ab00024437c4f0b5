//! # Snapshot Format
//!
//! Binary serialization for Fable packs.
//!
//! Format: Header (5 bytes) + postcard-serialized `PackDocument`.
//! - 4 bytes: Magic ("FABL")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is parsed, so a
//! corrupted or hostile file is rejected without allocating for it.

use crate::formats::document::PackDocument;
use crate::graph::Pack;
use crate::{FableError, primitives};

/// Minimum valid file size (header only).
const MIN_FILE_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The snapshot header precedes all pack data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SnapshotHeader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), FableError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(FableError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(FableError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FableError> {
        let Some(header) = bytes.get(..MIN_FILE_SIZE) else {
            return Err(FableError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }

    /// True when `bytes` start with the snapshot magic.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> bool {
        bytes.starts_with(primitives::MAGIC_BYTES)
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a pack to bytes (header + payload).
pub fn pack_to_bytes(pack: &Pack) -> Result<Vec<u8>, FableError> {
    let header = SnapshotHeader::new();
    let document = PackDocument::from_pack(pack);

    let payload = postcard::to_stdvec(&document)
        .map_err(|e| FableError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(MIN_FILE_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a pack from bytes.
///
/// Checks, in order: minimum size, maximum size, header magic and version.
/// Only then is the payload parsed and replayed into a `Pack`.
pub fn pack_from_bytes(bytes: &[u8]) -> Result<Pack, FableError> {
    if bytes.len() < MIN_FILE_SIZE {
        return Err(FableError::DeserializationError(
            "Data too short: minimum 5 bytes required".to_string(),
        ));
    }
    if bytes.len() > primitives::MAX_SNAPSHOT_SIZE {
        return Err(FableError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            primitives::MAX_SNAPSHOT_SIZE
        )));
    }

    let header = SnapshotHeader::from_bytes(bytes)?;
    header.validate()?;

    let document: PackDocument = postcard::from_bytes(&bytes[MIN_FILE_SIZE..]).map_err(|e| {
        FableError::DeserializationError(format!("Failed to deserialize pack data: {}", e))
    })?;
    document.into_pack()
}

// =============================================================================
// TESTS
// =============================================================================
