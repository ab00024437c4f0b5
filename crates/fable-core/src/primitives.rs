//! # Pack Primitives
//!
//! Fixed constants of the Fable core: archive layout, binary snapshot
//! header, synthetic record roles and input validation limits.
//!
//! These values are compiled into the binary and never change at runtime.
//! Changing any of them changes the bytes a compile produces.

// =============================================================================
// ARCHIVE LAYOUT
// =============================================================================

/// Format tag written into every manifest.
pub const ARCHIVE_FORMAT: &str = "v1";

/// Name of the manifest entry at the archive root.
pub const MANIFEST_FILE: &str = "story.json";

/// Directory holding deduplicated asset payloads.
pub const ASSETS_DIR: &str = "assets";

/// Optional pack thumbnail at the archive root.
pub const THUMBNAIL_FILE: &str = "thumbnail.png";

/// `optionIndex` value meaning "pick an option at random".
pub const RANDOM_OPTION_INDEX: i32 = -1;

// =============================================================================
// BINARY SNAPSHOT
// =============================================================================

/// Magic bytes for the Fable binary snapshot header.
///
/// - File Header = Magic Bytes ("FABL") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"FABL";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const FORMAT_VERSION: u8 = 1;

/// Format tag of the JSON pack document.
pub const DOCUMENT_FORMAT: &str = "fable-pack/1";

// =============================================================================
// SYNTHETIC ROLES
// =============================================================================

/// Role names used both as record type tags and as UUIDv5 names when a
/// composite node is expanded into primitive records.
pub mod roles {
    pub const STAGE: &str = "stage";
    pub const COVER: &str = "cover";
    pub const STORY: &str = "story";
    pub const ACTION: &str = "action";
    pub const MENU_QUESTION_STAGE: &str = "menu.questionstage";
    pub const MENU_QUESTION_ACTION: &str = "menu.questionaction";
    pub const MENU_OPTION_STAGE: &str = "menu.optionstage";
    pub const MENU_OPTIONS_ACTION: &str = "menu.optionsaction";
    pub const STORY_ACTION: &str = "story.storyaction";
}

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum accepted archive size (1 GiB).
///
/// Checked before the zip directory is read.
pub const MAX_ARCHIVE_SIZE: usize = 1024 * 1024 * 1024;

/// Maximum accepted size of `story.json` (16 MiB).
pub const MAX_MANIFEST_SIZE: u64 = 16 * 1024 * 1024;

/// Maximum accepted size of a single asset entry (256 MiB).
pub const MAX_ASSET_SIZE: u64 = 256 * 1024 * 1024;

/// Maximum number of stage plus action records in a manifest.
pub const MAX_RECORD_COUNT: usize = 100_000;

/// Maximum number of options on an action or menu.
pub const MAX_OPTIONS: usize = 1024;

/// Maximum accepted snapshot size (1 GiB), checked before parsing.
pub const MAX_SNAPSHOT_SIZE: usize = 1024 * 1024 * 1024;
