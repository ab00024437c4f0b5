//! # fable-core
//!
//! The deterministic authoring core for Fable story packs.
//!
//! A story pack is a graph of content nodes (stages, covers, stories and
//! menus) joined through action branches. This crate owns that graph and
//! everything that reads or writes it:
//! - `graph`: the node and link arena with its legality rules
//! - `compiler` / `decompiler`: graph to zip archive and back
//! - `traversal`: a player that walks the graph like the device does
//! - `validation`: composition checks per node
//! - `formats`: JSON document and binary snapshot
//!
//! ## Constraints
//!
//! - Pure and synchronous: no async, no network, no file I/O
//! - Deterministic: `BTreeMap` everywhere, same input gives same bytes
//! - Fallible operations return `Result<_, FableError>`

// =============================================================================
// MODULES
// =============================================================================

pub mod archive;
pub mod asset;
pub mod compiler;
pub mod decompiler;
pub mod formats;
pub mod graph;
pub mod layout;
pub mod node;
pub mod primitives;
pub mod route;
pub mod traversal;
pub mod types;
pub mod validation;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Control, Controls, Direction, FableError, LinkId, LinkViolation, NodeId, Port, PortKind,
    PortRef, PortSlot, Position,
};

// =============================================================================
// RE-EXPORTS: Graph Model
// =============================================================================

pub use asset::{AssetData, AssetStore, ContentHash, MediaType};
pub use graph::{Link, Pack, PackInfo};
pub use node::{
    ActionNode, Media, MenuNode, Node, NodeKind, NodeVariant, StageNode, StoryFlags, StoryNode,
};
pub use route::{Branch, Route, Selector};

// =============================================================================
// RE-EXPORTS: Compile / Decompile
// =============================================================================

pub use archive::{ActionRecord, CompiledPack, StageRecord, StoryManifest, Transition};
pub use compiler::{Compiler, compile, compile_to_bytes};
pub use decompiler::{decompile, decompile_with_layout};
pub use layout::{LayoutConfig, apply_layout, compute_layout};

// =============================================================================
// RE-EXPORTS: Playback and Checks
// =============================================================================

pub use traversal::{BranchContext, DeadEnd, Playback, Player, Scene, Step};
pub use validation::{Issue, IssueKind, Severity, ValidationReport, validate};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::document::{pack_from_json, pack_to_json};
pub use formats::{PackDocument, SnapshotHeader, pack_from_bytes, pack_to_bytes};
