//! # Pack Formats
//!
//! Save formats for the authoring graph. Archives are in `archive`; these
//! are the editable forms.
//!
//! - `document`: JSON pack document, assets embedded as data URLs.
//! - `persistence`: binary snapshot, a header plus a postcard payload of
//!   the same document.
//!
//! Both are pure transformations. File I/O stays in the app layer.

pub mod document;
pub mod persistence;

pub use document::{LinkDocument, NodeDocument, PackDocument};
pub use persistence::{SnapshotHeader, pack_from_bytes, pack_to_bytes};
