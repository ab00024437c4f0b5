//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the story pack engine:
//! - Graph identifiers (`NodeId`, `LinkId`)
//! - Port addressing (`PortSlot`, `PortRef`, `PortKind`, `Direction`)
//! - Stage input settings (`Control`, `Controls`)
//! - Editor coordinates (`Position`)
//! - Error types (`FableError`, `LinkViolation`)
//!
//! ## Determinism Guarantees
//!
//! Identifiers implement `Ord` so that every collection keyed by them can be
//! a `BTreeMap`/`BTreeSet` with a stable iteration order.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// GRAPH IDENTIFIERS
// =============================================================================

/// Graph-local identifier of a node.
///
/// Only meaningful inside one `Pack`. External identity (the one archives
/// reference) is the node's business uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Graph-local identifier of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

// =============================================================================
// PORTS
// =============================================================================

/// Which side of the bipartite graph a port belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortKind {
    /// Plays media and waits for input.
    Content,
    /// Routes to the next content.
    Branch,
}

impl PortKind {
    /// The kind a link from this port must land on.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Content => Self::Branch,
            Self::Branch => Self::Content,
        }
    }
}

/// Direction of a port relative to its owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// A connection point on a node, addressed by role rather than by pointer.
///
/// Indexed slots renumber when an option is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortSlot {
    /// Inbound port of stages, stories and menus.
    From,
    /// Outbound "ok" port of the stage family.
    Ok,
    /// Outbound "home" port of the stage family.
    Home,
    /// Outbound port of a menu option.
    Option(usize),
    /// Inbound port of an action option.
    OptionIn(usize),
    /// Outbound port of an action option.
    OptionOut(usize),
    /// Shared inbound port of an action that picks an option at random.
    Random,
}

impl PortSlot {
    /// Option index carried by the slot, if any.
    #[must_use]
    pub const fn option_index(self) -> Option<usize> {
        match self {
            Self::Option(i) | Self::OptionIn(i) | Self::OptionOut(i) => Some(i),
            Self::From | Self::Ok | Self::Home | Self::Random => None,
        }
    }

    /// Same slot role with a different option index.
    #[must_use]
    pub const fn with_index(self, index: usize) -> Self {
        match self {
            Self::Option(_) => Self::Option(index),
            Self::OptionIn(_) => Self::OptionIn(index),
            Self::OptionOut(_) => Self::OptionOut(index),
            other => other,
        }
    }
}

impl fmt::Display for PortSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::From => write!(f, "from"),
            Self::Ok => write!(f, "ok"),
            Self::Home => write!(f, "home"),
            Self::Option(i) => write!(f, "option[{}]", i),
            Self::OptionIn(i) => write!(f, "optionIn[{}]", i),
            Self::OptionOut(i) => write!(f, "optionOut[{}]", i),
            Self::Random => write!(f, "random"),
        }
    }
}

/// A port addressed as `(node, slot)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub slot: PortSlot,
}

impl PortRef {
    #[must_use]
    pub const fn new(node: NodeId, slot: PortSlot) -> Self {
        Self { node, slot }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.slot)
    }
}

/// Full description of an existing port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub slot: PortSlot,
    pub kind: PortKind,
    pub direction: Direction,
}

// =============================================================================
// CONTROLS
// =============================================================================

/// A physical input of the playback device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Control {
    Wheel,
    Ok,
    Home,
    Pause,
    Autoplay,
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Wheel => "wheel",
            Self::Ok => "ok",
            Self::Home => "home",
            Self::Pause => "pause",
            Self::Autoplay => "autoplay",
        };
        f.write_str(name)
    }
}

/// Which inputs are active while a stage plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Controls {
    pub wheel: bool,
    pub ok: bool,
    pub home: bool,
    pub pause: bool,
    pub autoplay: bool,
}

impl Controls {
    /// Settings of a freshly created stage.
    pub const STAGE_DEFAULT: Self = Self {
        wheel: false,
        ok: true,
        home: true,
        pause: false,
        autoplay: false,
    };

    /// Settings of a synthesized menu option stage.
    pub const MENU_OPTION: Self = Self {
        wheel: true,
        ok: true,
        home: true,
        pause: false,
        autoplay: false,
    };

    #[must_use]
    pub const fn get(&self, control: Control) -> bool {
        match control {
            Control::Wheel => self.wheel,
            Control::Ok => self.ok,
            Control::Home => self.home,
            Control::Pause => self.pause,
            Control::Autoplay => self.autoplay,
        }
    }

    pub fn set(&mut self, control: Control, enabled: bool) {
        match control {
            Control::Wheel => self.wheel = enabled,
            Control::Ok => self.ok = enabled,
            Control::Home => self.home = enabled,
            Control::Pause => self.pause = enabled,
            Control::Autoplay => self.autoplay = enabled,
        }
    }

    /// Builder-style variant of `set`.
    #[must_use]
    pub fn with(mut self, control: Control, enabled: bool) -> Self {
        self.set(control, enabled);
        self
    }

    /// The stage leaves through its "ok" port (explicit ok or end of autoplay).
    #[must_use]
    pub const fn leaves_on_ok(&self) -> bool {
        self.ok || self.autoplay
    }
}

// =============================================================================
// POSITION
// =============================================================================

/// Editor coordinates of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Why a link between two ports was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkViolation {
    /// Both ports are content-side or both are branch-side.
    #[error("ports have the same kind")]
    SameKind,

    /// Both ports are inbound or both are outbound.
    #[error("ports have the same direction")]
    SameDirection,

    /// Both ports belong to the same node.
    #[error("a node cannot link to itself")]
    SelfLoop,

    /// The outbound port already carries a link.
    #[error("outbound port already has a link")]
    FanOut,
}

/// Errors that can occur in the Fable core.
///
/// - No silent failures
/// - Use `Result<T, FableError>` for fallible operations
/// - The core never panics; all errors are recoverable
#[derive(Debug, Error)]
pub enum FableError {
    /// The requested node was not found in the pack.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// The requested link was not found in the pack.
    #[error("Link not found: {0}")]
    LinkNotFound(LinkId),

    /// The node exists but does not currently expose this port.
    #[error("Port not found: {0}")]
    PortNotFound(PortRef),

    /// The two ports cannot be linked.
    #[error("Illegal link {from} -> {to}: {reason}")]
    IllegalLink {
        from: PortRef,
        to: PortRef,
        reason: LinkViolation,
    },

    /// Another node is already the entry node.
    #[error("Entry conflict: {existing} is already the entry node, cannot designate {requested}")]
    EntryConflict { existing: NodeId, requested: NodeId },

    /// Another node already carries this business uuid.
    #[error("Duplicate node uuid: {0}")]
    DuplicateUuid(uuid::Uuid),

    /// Only plain stages and covers can be the entry node.
    #[error("Node {0} cannot be the entry node")]
    NotEntryCapable(NodeId),

    /// A cover is always the entry node.
    #[error("Cover node {0} is always the entry node")]
    CoverIsEntry(NodeId),

    /// The operation does not apply to this node variant.
    #[error("Operation '{operation}' is not supported on node {node}")]
    UnsupportedOperation {
        node: NodeId,
        operation: &'static str,
    },

    /// The control is forced on for this node variant.
    #[error("Control '{control}' is forced on node {node}")]
    ForcedControl { node: NodeId, control: Control },

    /// An option index is out of range.
    #[error("Option {index} out of range on node {node}")]
    OptionOutOfRange { node: NodeId, index: i64 },

    /// The pack has no entry node.
    #[error("Pack has no entry node")]
    MissingEntry,

    /// An asset declares a media type the archive cannot carry.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The archive is missing data or references unknown records.
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    /// Validation found errors and the caller asked for a strict check.
    #[error("Validation failed with {0} error(s)")]
    ValidationFailed(usize),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_get_and_set() {
        let mut controls = Controls::default();
        assert!(!controls.get(Control::Pause));

        controls.set(Control::Pause, true);
        assert!(controls.get(Control::Pause));
        assert!(controls.pause);
    }

    #[test]
    fn leaves_on_ok_covers_autoplay() {
        let autoplay = Controls::default().with(Control::Autoplay, true);
        assert!(autoplay.leaves_on_ok());
        assert!(!Controls::default().leaves_on_ok());
    }

    #[test]
    fn slot_reindexing_keeps_role() {
        assert_eq!(PortSlot::OptionIn(4).with_index(1), PortSlot::OptionIn(1));
        assert_eq!(PortSlot::Random.with_index(3), PortSlot::Random);
        assert_eq!(PortSlot::Option(2).option_index(), Some(2));
        assert_eq!(PortSlot::Home.option_index(), None);
    }

    #[test]
    fn port_display_is_readable() {
        let port = PortRef::new(NodeId(3), PortSlot::OptionOut(1));
        assert_eq!(port.to_string(), "n3:optionOut[1]");
    }

    #[test]
    fn controls_serialize_camel_case() {
        let json = serde_json::to_string(&Controls::STAGE_DEFAULT).expect("serialize");
        assert_eq!(
            json,
            r#"{"wheel":false,"ok":true,"home":true,"pause":false,"autoplay":false}"#
        );
    }
}
