//! # Asset Store
//!
//! Content-addressable storage for the image and audio payloads of a pack.
//!
//! - `AssetData` is an asset as the author attached it (MIME type + bytes).
//! - `ContentHash` is the BLAKE3 hex digest of the bytes.
//! - `AssetStore` keeps one payload per archive file name, so identical
//!   payloads collapse into a single `<hash>.<ext>` entry.
//!
//! The store is keyed by `BTreeMap` so archive entries come out sorted.

use crate::FableError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// MEDIA TYPES
// =============================================================================

/// Media types an archive can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MediaType {
    Bmp,
    Png,
    Jpeg,
    Wav,
    Mp3,
    Ogg,
}

impl MediaType {
    /// Resolve a MIME type, accepting the common aliases.
    pub fn from_mime(mime: &str) -> Result<Self, FableError> {
        let normalized = mime.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "image/bmp" | "image/x-ms-bmp" | "image/x-bmp" => Ok(Self::Bmp),
            "image/png" => Ok(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Ok(Self::Jpeg),
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Ok(Self::Wav),
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg-3" => Ok(Self::Mp3),
            "audio/ogg" | "audio/vorbis" | "application/ogg" => Ok(Self::Ogg),
            _ => Err(FableError::UnsupportedMediaType(mime.to_string())),
        }
    }

    /// Resolve an archive file extension.
    pub fn from_extension(extension: &str) -> Result<Self, FableError> {
        match extension.to_ascii_lowercase().as_str() {
            "bmp" => Ok(Self::Bmp),
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "wav" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            "ogg" | "oga" => Ok(Self::Ogg),
            _ => Err(FableError::UnsupportedMediaType(format!(
                "extension '{}'",
                extension
            ))),
        }
    }

    /// Canonical MIME type.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Bmp => "image/bmp",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Ogg => "audio/ogg",
        }
    }

    /// Extension used in archive file names.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Bmp => "bmp",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
        }
    }

    #[must_use]
    pub const fn is_image(self) -> bool {
        matches!(self, Self::Bmp | Self::Png | Self::Jpeg)
    }

    #[must_use]
    pub const fn is_audio(self) -> bool {
        !self.is_image()
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

// =============================================================================
// CONTENT HASH
// =============================================================================

/// BLAKE3 hex digest of an asset payload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a payload.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().as_str().to_owned())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Archive file name for a payload of this hash and media type.
    #[must_use]
    pub fn file_name(&self, media_type: MediaType) -> String {
        format!("{}.{}", self.0, media_type.extension())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ASSET DATA
// =============================================================================

/// An asset attached to a node: declared MIME type plus raw bytes.
///
/// Human-readable formats encode it as a `data:<mime>;base64,<payload>`
/// URL; binary formats encode the `(mime, bytes)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetData {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl AssetData {
    pub fn new(mime: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Build an asset with the canonical MIME type of `media_type`.
    pub fn of_type(media_type: MediaType, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(media_type.mime(), bytes)
    }

    /// Resolve the declared MIME type.
    pub fn media_type(&self) -> Result<MediaType, FableError> {
        MediaType::from_mime(&self.mime)
    }

    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(&self.bytes)
    }

    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// Parse a base64 `data:` URL.
    pub fn from_data_url(url: &str) -> Result<Self, FableError> {
        let rest = url.strip_prefix("data:").ok_or_else(|| {
            FableError::DeserializationError("asset is not a data: URL".to_string())
        })?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| {
            FableError::DeserializationError("data: URL has no payload".to_string())
        })?;
        let mime = header.strip_suffix(";base64").ok_or_else(|| {
            FableError::DeserializationError("data: URL is not base64 encoded".to_string())
        })?;
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| FableError::DeserializationError(format!("invalid base64: {}", e)))?;
        Ok(Self::new(mime, bytes))
    }
}

impl Serialize for AssetData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_data_url())
        } else {
            (self.mime.as_str(), self.bytes.as_slice()).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AssetData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let url = String::deserialize(deserializer)?;
            Self::from_data_url(&url).map_err(D::Error::custom)
        } else {
            let (mime, bytes) = <(String, Vec<u8>)>::deserialize(deserializer)?;
            Ok(Self { mime, bytes })
        }
    }
}

// =============================================================================
// ASSET STORE
// =============================================================================

/// One payload held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub hash: ContentHash,
    pub media_type: MediaType,
    pub bytes: Vec<u8>,
}

/// Deduplicating store of asset payloads, keyed by archive file name.
///
/// One payload is stored per content hash. When identical bytes arrive
/// under a second MIME type, the first declared type names the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetStore {
    entries: BTreeMap<String, StoredAsset>,
    names: BTreeMap<ContentHash, String>,
}

impl AssetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash an asset into the store and return its archive file name.
    ///
    /// Fails with `UnsupportedMediaType` if the MIME type cannot be carried.
    pub fn insert(&mut self, asset: &AssetData) -> Result<String, FableError> {
        let media_type = asset.media_type()?;
        let hash = asset.content_hash();
        if let Some(name) = self.names.get(&hash) {
            return Ok(name.clone());
        }
        let name = hash.file_name(media_type);
        self.names.insert(hash.clone(), name.clone());
        self.entries.insert(
            name.clone(),
            StoredAsset {
                hash,
                media_type,
                bytes: asset.bytes.clone(),
            },
        );
        Ok(name)
    }

    /// Store a payload under a name read from an archive.
    ///
    /// The media type is taken from the file extension.
    pub fn insert_named(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), FableError> {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        let media_type = MediaType::from_extension(extension)?;
        let hash = ContentHash::of(&bytes);
        self.names
            .entry(hash.clone())
            .or_insert_with(|| name.to_string());
        self.entries.insert(
            name.to_string(),
            StoredAsset {
                hash,
                media_type,
                bytes,
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StoredAsset> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Turn a stored payload back into an attachable asset.
    pub fn rehydrate(&self, name: &str) -> Result<AssetData, FableError> {
        self.entries
            .get(name)
            .map(|stored| AssetData::of_type(stored.media_type, stored.bytes.clone()))
            .ok_or_else(|| FableError::MalformedArchive(format!("missing asset file '{}'", name)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in file-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredAsset)> {
        self.entries.iter().map(|(name, asset)| (name.as_str(), asset))
    }

    /// Total payload size in bytes.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.entries.values().map(|asset| asset.bytes.len()).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================
