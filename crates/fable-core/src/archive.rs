//! # Portable Archive
//!
//! The flat record format a playback device executes, and its zip container.
//!
//! Layout:
//! - `story.json`: the `StoryManifest` (pack metadata + stage and action records)
//! - `assets/<hash>.<ext>`: deduplicated payloads
//! - `thumbnail.png`: optional
//!
//! ## Determinism
//!
//! Entries are written uncompressed with a fixed timestamp, in a fixed order
//! (`story.json`, sorted assets, thumbnail). The same `CompiledPack` always
//! produces the same bytes.
//!
//! ## Security
//!
//! Reading validates the archive size before opening the zip directory, and
//! each entry size before reading it.

use crate::asset::AssetStore;
use crate::primitives::{
    ARCHIVE_FORMAT, ASSETS_DIR, MANIFEST_FILE, MAX_ARCHIVE_SIZE, MAX_ASSET_SIZE, MAX_MANIFEST_SIZE,
    MAX_RECORD_COUNT, THUMBNAIL_FILE,
};
use crate::{Controls, FableError, Position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{Cursor, Read, Seek, Write};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

// =============================================================================
// RECORDS
// =============================================================================

/// Where a stage leaves to: an action record and one of its options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub action_node: String,
    /// `-1` picks an option at random.
    pub option_index: i32,
}

/// A content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub uuid: String,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub ok_transition: Option<Transition>,
    #[serde(default)]
    pub home_transition: Option<Transition>,
    #[serde(default)]
    pub control_settings: Controls,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub square_one: bool,
}

/// A branch record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub id: String,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Option<Position>,
    /// Stage uuid per option; `None` for a dangling option.
    #[serde(default)]
    pub options: Vec<Option<String>>,
}

/// Contents of `story.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryManifest {
    pub format: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub night_mode_available: bool,
    #[serde(default)]
    pub stage_nodes: Vec<StageRecord>,
    #[serde(default)]
    pub action_nodes: Vec<ActionRecord>,
}

impl StoryManifest {
    /// Check the format tag and record count.
    pub fn validate_header(&self) -> Result<(), FableError> {
        if self.format != ARCHIVE_FORMAT {
            return Err(FableError::MalformedArchive(format!(
                "unknown format tag '{}' (expected '{}')",
                self.format, ARCHIVE_FORMAT
            )));
        }
        let records = self.stage_nodes.len() + self.action_nodes.len();
        if records > MAX_RECORD_COUNT {
            return Err(FableError::MalformedArchive(format!(
                "{} records exceeds maximum allowed {}",
                records, MAX_RECORD_COUNT
            )));
        }
        Ok(())
    }

    /// The `squareOne` record, or the first stage record if none is flagged.
    #[must_use]
    pub fn entry_stage(&self) -> Option<&StageRecord> {
        self.stage_nodes
            .iter()
            .find(|stage| stage.square_one)
            .or_else(|| self.stage_nodes.first())
    }

    #[must_use]
    pub fn stage(&self, uuid: &str) -> Option<&StageRecord> {
        self.stage_nodes.iter().find(|stage| stage.uuid == uuid)
    }

    #[must_use]
    pub fn action(&self, id: &str) -> Option<&ActionRecord> {
        self.action_nodes.iter().find(|action| action.id == id)
    }

    /// Asset file names referenced by stage records, sorted and distinct.
    #[must_use]
    pub fn asset_references(&self) -> BTreeSet<&str> {
        self.stage_nodes
            .iter()
            .flat_map(|stage| [stage.image.as_deref(), stage.audio.as_deref()])
            .flatten()
            .collect()
    }
}

// =============================================================================
// COMPILED PACK
// =============================================================================

/// Manifest plus payloads: everything an archive holds.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPack {
    pub manifest: StoryManifest,
    pub assets: AssetStore,
    pub thumbnail: Option<Vec<u8>>,
}

impl CompiledPack {
    /// Write the zip container.
    pub fn to_archive_bytes(&self) -> Result<Vec<u8>, FableError> {
        let manifest = serde_json::to_vec_pretty(&self.manifest)
            .map_err(|e| FableError::SerializationError(e.to_string()))?;

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(DateTime::default());
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        write_entry(&mut writer, MANIFEST_FILE, &manifest, options)?;
        for (name, asset) in self.assets.iter() {
            let path = format!("{}/{}", ASSETS_DIR, name);
            write_entry(&mut writer, &path, &asset.bytes, options)?;
        }
        if let Some(thumbnail) = &self.thumbnail {
            write_entry(&mut writer, THUMBNAIL_FILE, thumbnail, options)?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| FableError::SerializationError(format!("zip finish: {}", e)))?;
        Ok(cursor.into_inner())
    }

    /// Read a zip container.
    ///
    /// Fails if the manifest is missing or unreadable, the format tag is
    /// unknown, or a referenced asset file is absent.
    pub fn from_archive_bytes(bytes: &[u8]) -> Result<Self, FableError> {
        if bytes.len() > MAX_ARCHIVE_SIZE {
            return Err(FableError::MalformedArchive(format!(
                "archive size {} bytes exceeds maximum allowed {} bytes",
                bytes.len(),
                MAX_ARCHIVE_SIZE
            )));
        }
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| FableError::MalformedArchive(format!("not a zip archive: {}", e)))?;

        let manifest_bytes = read_entry(&mut archive, MANIFEST_FILE, MAX_MANIFEST_SIZE)?
            .ok_or_else(|| FableError::MalformedArchive(format!("missing {}", MANIFEST_FILE)))?;
        let manifest: StoryManifest = serde_json::from_slice(&manifest_bytes).map_err(|e| {
            FableError::MalformedArchive(format!("unreadable {}: {}", MANIFEST_FILE, e))
        })?;
        manifest.validate_header()?;

        let mut assets = AssetStore::new();
        for name in manifest.asset_references() {
            let path = format!("{}/{}", ASSETS_DIR, name);
            let payload = read_entry(&mut archive, &path, MAX_ASSET_SIZE)?.ok_or_else(|| {
                FableError::MalformedArchive(format!("missing asset file '{}'", path))
            })?;
            assets.insert_named(name, payload)?;
        }
        let thumbnail = read_entry(&mut archive, THUMBNAIL_FILE, MAX_ASSET_SIZE)?;

        Ok(Self {
            manifest,
            assets,
            thumbnail,
        })
    }
}

fn write_entry<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    name: &str,
    payload: &[u8],
    options: SimpleFileOptions,
) -> Result<(), FableError> {
    writer
        .start_file(name, options)
        .map_err(|e| FableError::SerializationError(format!("zip entry '{}': {}", name, e)))?;
    writer
        .write_all(payload)
        .map_err(|e| FableError::IoError(format!("zip entry '{}': {}", name, e)))
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<Option<Vec<u8>>, FableError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(FableError::MalformedArchive(format!(
                "entry '{}': {}",
                name, e
            )));
        }
    };
    if file.size() > limit {
        return Err(FableError::MalformedArchive(format!(
            "entry '{}' is {} bytes, maximum allowed {}",
            name,
            file.size(),
            limit
        )));
    }
    let mut payload = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut payload)
        .map_err(|e| FableError::MalformedArchive(format!("entry '{}': {}", name, e)))?;
    Ok(Some(payload))
}

// =============================================================================
// TESTS
// =============================================================================
