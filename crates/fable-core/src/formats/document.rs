//! # Pack Document
//!
//! Serializable form of a `Pack`. Node ids are renumbered densely in node
//! order, so a document written from a loaded document is identical to it.
//!
//! Loading replays `Pack` operations. A document describing an illegal
//! graph (fan-out, entry conflict, unknown port) fails with the same typed
//! error the graph API would return.

use crate::graph::{Pack, PackInfo};
use crate::node::NodeKind;
use crate::{FableError, NodeId, PortRef, Position, primitives};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    pub id: NodeId,
    pub uuid: Uuid,
    pub position: Option<Position>,
    pub entry: bool,
    pub kind: NodeKind,
}

/// A link as drawn: `source` is where the drag started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDocument {
    pub source: PortRef,
    pub target: PortRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackDocument {
    pub format: String,
    pub info: PackInfo,
    pub nodes: Vec<NodeDocument>,
    pub links: Vec<LinkDocument>,
}

impl PackDocument {
    #[must_use]
    pub fn from_pack(pack: &Pack) -> Self {
        let index: BTreeMap<NodeId, NodeId> = pack
            .nodes()
            .enumerate()
            .map(|(i, node)| (node.id, NodeId(i as u64)))
            .collect();
        let id_of = |id: NodeId| index.get(&id).copied().unwrap_or(id);
        let renumber = |port: PortRef| PortRef::new(id_of(port.node), port.slot);

        let nodes = pack
            .nodes()
            .map(|node| NodeDocument {
                id: id_of(node.id),
                uuid: node.uuid,
                position: node.position,
                entry: pack.is_entry(node.id),
                kind: node.kind.clone(),
            })
            .collect();
        let links = pack
            .links()
            .map(|link| LinkDocument {
                source: renumber(link.source),
                target: renumber(link.target),
            })
            .collect();

        Self {
            format: primitives::DOCUMENT_FORMAT.to_string(),
            info: pack.info.clone(),
            nodes,
            links,
        }
    }

    /// Rebuild the pack by replaying node, entry and link operations.
    pub fn into_pack(self) -> Result<Pack, FableError> {
        if self.format != primitives::DOCUMENT_FORMAT {
            return Err(FableError::DeserializationError(format!(
                "Unsupported document format '{}' (expected '{}')",
                self.format,
                primitives::DOCUMENT_FORMAT
            )));
        }

        let mut pack = Pack::new(self.info);
        let mut ids = BTreeMap::new();
        let mut entries = Vec::new();
        for node in self.nodes {
            let id = pack.add_node_with_uuid(node.uuid, node.kind, node.position)?;
            if ids.insert(node.id, id).is_some() {
                return Err(FableError::DeserializationError(format!(
                    "Duplicate node id {} in document",
                    node.id
                )));
            }
            if node.entry {
                entries.push(id);
            }
        }
        // Entry first: it removes the entry's "from" port.
        for id in entries {
            if !pack.is_entry(id) {
                pack.set_entry(id)?;
            }
        }

        let resolve = |port: PortRef| {
            ids.get(&port.node)
                .map(|id| PortRef::new(*id, port.slot))
                .ok_or(FableError::NodeNotFound(port.node))
        };
        for link in self.links {
            pack.connect(resolve(link.source)?, resolve(link.target)?)?;
        }

        debug!(
            nodes = pack.node_count(),
            links = pack.link_count(),
            "pack document loaded"
        );
        Ok(pack)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, FableError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        json.map_err(|e| FableError::SerializationError(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, FableError> {
        serde_json::from_str(json).map_err(|e| {
            FableError::DeserializationError(format!("Invalid pack document: {}", e))
        })
    }
}

/// Serialize a pack as a JSON document.
pub fn pack_to_json(pack: &Pack, pretty: bool) -> Result<String, FableError> {
    PackDocument::from_pack(pack).to_json(pretty)
}

/// Load a pack from a JSON document.
pub fn pack_from_json(json: &str) -> Result<Pack, FableError> {
    PackDocument::from_json(json)?.into_pack()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetData;
    use crate::{LinkViolation, PortSlot};

    fn port(node: NodeId, slot: PortSlot) -> PortRef {
        PortRef::new(node, slot)
    }

    fn sample() -> Pack {
        let mut pack = Pack::new(PackInfo {
            title: "Forest".to_string(),
            ..PackInfo::default()
        });
        let start = pack
            .add_node(NodeKind::stage("start"), Some(Position::new(0.0, 0.0)))
            .expect("start");
        let scratch = pack.add_node(NodeKind::stage("scratch"), None).expect("x");
        let menu = pack
            .add_node(NodeKind::menu("pick", &["red", "blue"]), None)
            .expect("menu");
        let action = pack.add_node(NodeKind::action("a", 1), None).expect("a");
        let end = pack.add_node(NodeKind::stage("end"), None).expect("end");
        pack.remove_node(scratch).expect("remove");

        pack.set_entry(start).expect("entry");
        pack.media_mut(start).expect("media").image =
            Some(AssetData::new("image/png", vec![137, 80, 78, 71]));
        pack.connect(port(start, PortSlot::Ok), port(menu, PortSlot::From))
            .expect("start -> menu");
        // Drawn from the inbound side.
        pack.connect(port(action, PortSlot::OptionIn(0)), port(menu, PortSlot::Option(1)))
            .expect("blue -> a");
        pack.connect(port(action, PortSlot::OptionOut(0)), port(end, PortSlot::From))
            .expect("a -> end");
        pack
    }

    #[test]
    fn json_round_trip_keeps_the_graph() {
        let pack = sample();
        let json = pack_to_json(&pack, true).expect("to json");
        assert!(json.contains("data:image/png;base64,"));

        let loaded = pack_from_json(&json).expect("from json");
        assert_eq!(loaded.node_count(), 4);
        assert_eq!(loaded.link_count(), 3);
        assert_eq!(loaded.info.title, "Forest");
        assert_eq!(
            loaded.entry_node().map(|node| node.name().to_string()),
            Some("start".to_string())
        );
        assert_eq!(
            PackDocument::from_pack(&loaded),
            PackDocument::from_pack(&pack)
        );
        assert!(loaded.links().any(|link| link.inversed));
    }

    #[test]
    fn ids_are_renumbered_densely() {
        let document = PackDocument::from_pack(&sample());
        let ids: Vec<u64> = document.nodes.iter().map(|node| node.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(document.links.iter().all(|link| link.source.node.0 < 4));
    }

    #[test]
    fn illegal_document_is_rejected() {
        let mut document = PackDocument::from_pack(&sample());
        let menu = document.nodes[1].id;
        let action = document.nodes[2].id;
        document.links.push(LinkDocument {
            source: port(menu, PortSlot::Option(1)),
            target: port(action, PortSlot::OptionIn(0)),
        });
        let err = document.into_pack().expect_err("fan-out");
        assert!(matches!(
            err,
            FableError::IllegalLink {
                reason: LinkViolation::FanOut,
                ..
            }
        ));
    }

    #[test]
    fn unknown_node_reference_is_rejected() {
        let mut document = PackDocument::from_pack(&sample());
        document.links.push(LinkDocument {
            source: port(NodeId(99), PortSlot::Ok),
            target: port(document.nodes[1].id, PortSlot::From),
        });
        assert!(matches!(
            document.into_pack(),
            Err(FableError::NodeNotFound(NodeId(99)))
        ));
    }

    #[test]
    fn two_entries_conflict() {
        let mut document = PackDocument::from_pack(&sample());
        document.nodes[3].entry = true;
        assert!(matches!(
            document.into_pack(),
            Err(FableError::EntryConflict { .. })
        ));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let mut document = PackDocument::from_pack(&sample());
        document.format = "something-else".to_string();
        assert!(matches!(
            document.into_pack(),
            Err(FableError::DeserializationError(_))
        ));
        assert!(pack_from_json("{not json").is_err());
    }
}
