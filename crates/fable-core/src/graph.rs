//! # Pack Graph
//!
//! The authoring graph: an arena of nodes and links keyed by stable ids.
//!
//! Every mutation goes through `Pack` so the legality rules hold after each
//! call returns:
//! - a link joins one outbound and one inbound port of opposite kinds on two
//!   different nodes;
//! - an outbound port carries at most one link (fan-in is unbounded);
//! - at most one node is the entry node;
//! - no link references a port its node no longer exposes.
//!
//! All collections are `BTreeMap` so iteration order is deterministic.

use crate::asset::AssetData;
use crate::node::{Media, Node, NodeKind, StoryFlags};
use crate::{
    Control, Direction, FableError, LinkId, LinkViolation, NodeId, Port, PortKind, PortRef,
    Position,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

// =============================================================================
// PACK METADATA
// =============================================================================

/// Pack-level metadata written into the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackInfo {
    pub title: String,
    pub version: u32,
    pub description: String,
    pub night_mode_available: bool,
    pub thumbnail: Option<AssetData>,
}

impl Default for PackInfo {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            version: 1,
            description: String::new(),
            night_mode_available: false,
            thumbnail: None,
        }
    }
}

// =============================================================================
// LINK
// =============================================================================

/// A directed edge between an outbound and an inbound port.
///
/// `source`/`target` are the endpoints as the author drew them. When the
/// drag started on the inbound side, `inversed` is set and the nominal
/// source is the inbound port. Use `forward` for the semantic direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub source: PortRef,
    pub target: PortRef,
    pub inversed: bool,
}

impl Link {
    /// `(outbound, inbound)` regardless of how the link was drawn.
    #[must_use]
    pub const fn forward(&self) -> (PortRef, PortRef) {
        if self.inversed {
            (self.target, self.source)
        } else {
            (self.source, self.target)
        }
    }

    #[must_use]
    pub const fn outbound(&self) -> PortRef {
        self.forward().0
    }

    #[must_use]
    pub const fn inbound(&self) -> PortRef {
        self.forward().1
    }

    #[must_use]
    pub fn touches(&self, node: NodeId) -> bool {
        self.source.node == node || self.target.node == node
    }
}

// =============================================================================
// PACK
// =============================================================================

/// The authoring graph of one story pack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pack {
    pub info: PackInfo,
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeMap<LinkId, Link>,
    entry: Option<NodeId>,
    next_node_id: u64,
    next_link_id: u64,
}

impl Pack {
    /// Create an empty pack.
    #[must_use]
    pub fn new(info: PackInfo) -> Self {
        Self {
            info,
            ..Self::default()
        }
    }

    // -------------------------------------------------------------------------
    // NODES
    // -------------------------------------------------------------------------

    /// Place a node with a fresh uuid.
    ///
    /// A cover becomes the entry node; it is rejected if an entry exists.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        position: Option<Position>,
    ) -> Result<NodeId, FableError> {
        self.add_node_with_uuid(Uuid::new_v4(), kind, position)
    }

    /// Place a node with a known uuid (used by loaders).
    pub fn add_node_with_uuid(
        &mut self,
        uuid: Uuid,
        mut kind: NodeKind,
        position: Option<Position>,
    ) -> Result<NodeId, FableError> {
        let id = NodeId(self.next_node_id);
        kind.validate(id)?;
        if self.node_by_uuid(uuid).is_some() {
            return Err(FableError::DuplicateUuid(uuid));
        }
        let is_cover = matches!(kind, NodeKind::Cover(_));
        if is_cover {
            if let Some(existing) = self.entry {
                return Err(FableError::EntryConflict {
                    existing,
                    requested: id,
                });
            }
        }
        kind.normalize();

        debug!(node = %id, variant = %kind.variant(), "node added");
        self.nodes.insert(
            id,
            Node {
                id,
                uuid,
                position,
                kind,
            },
        );
        self.next_node_id = self.next_node_id.saturating_add(1);
        if is_cover {
            self.entry = Some(id);
        }
        Ok(id)
    }

    /// Remove a node and every link attached to it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, FableError> {
        let node = self.nodes.remove(&id).ok_or(FableError::NodeNotFound(id))?;
        self.links.retain(|_, link| !link.touches(id));
        if self.entry == Some(id) {
            self.entry = None;
        }
        debug!(node = %id, "node removed");
        Ok(node)
    }

    /// Duplicate a node: fresh local id, fresh uuid, no links.
    pub fn clone_node(&mut self, id: NodeId) -> Result<NodeId, FableError> {
        let source = self.node_ref(id)?;
        let kind = source.kind.clone();
        let position = source.position;
        self.add_node(kind, position)
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Nodes in id (insertion) order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    #[must_use]
    pub fn node_by_uuid(&self, uuid: Uuid) -> Option<&Node> {
        self.nodes.values().find(|node| node.uuid == uuid)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node_ref(&self, id: NodeId) -> Result<&Node, FableError> {
        self.nodes.get(&id).ok_or(FableError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, FableError> {
        self.nodes.get_mut(&id).ok_or(FableError::NodeNotFound(id))
    }

    // -------------------------------------------------------------------------
    // CONTENT EDITS
    // -------------------------------------------------------------------------

    pub fn set_position(
        &mut self,
        id: NodeId,
        position: Option<Position>,
    ) -> Result<(), FableError> {
        self.node_mut(id)?.position = position;
        Ok(())
    }

    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), FableError> {
        let name = name.into();
        match &mut self.node_mut(id)?.kind {
            NodeKind::Stage(stage) | NodeKind::Cover(stage) => stage.media.name = name,
            NodeKind::Story(story) => story.media.name = name,
            NodeKind::Menu(menu) => menu.name = name,
            NodeKind::Action(action) => action.name = name,
        }
        Ok(())
    }

    /// Media block of a stage, cover or story.
    pub fn media_mut(&mut self, id: NodeId) -> Result<&mut Media, FableError> {
        self.node_mut(id)?
            .kind
            .media_mut()
            .ok_or(FableError::UnsupportedOperation {
                node: id,
                operation: "media_mut",
            })
    }

    /// Question block of a menu.
    pub fn menu_question_mut(&mut self, id: NodeId) -> Result<&mut Media, FableError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Menu(menu) => Ok(&mut menu.question),
            _ => Err(FableError::UnsupportedOperation {
                node: id,
                operation: "menu_question_mut",
            }),
        }
    }

    /// Content block of one menu option.
    pub fn menu_option_mut(&mut self, id: NodeId, index: usize) -> Result<&mut Media, FableError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Menu(menu) => {
                menu.options
                    .get_mut(index)
                    .ok_or(FableError::OptionOutOfRange {
                        node: id,
                        index: index as i64,
                    })
            }
            _ => Err(FableError::UnsupportedOperation {
                node: id,
                operation: "menu_option_mut",
            }),
        }
    }

    // -------------------------------------------------------------------------
    // OPTIONS
    // -------------------------------------------------------------------------

    /// Append an option to an action or menu. Returns its index.
    pub fn add_option(&mut self, id: NodeId) -> Result<usize, FableError> {
        let node = self.node_mut(id)?;
        let index = match &mut node.kind {
            NodeKind::Action(action) => {
                action.option_count += 1;
                action.option_count - 1
            }
            NodeKind::Menu(menu) => {
                let index = menu.options.len();
                menu.options.push(Media::named(format!("Option {}", index + 1)));
                index
            }
            _ => {
                return Err(FableError::UnsupportedOperation {
                    node: id,
                    operation: "add_option",
                });
            }
        };
        if let Err(e) = node.kind.validate(id) {
            match &mut node.kind {
                NodeKind::Action(action) => action.option_count -= 1,
                NodeKind::Menu(menu) => {
                    menu.options.pop();
                }
                _ => {}
            }
            return Err(e);
        }
        debug!(node = %id, option = index, "option added");
        Ok(index)
    }

    /// Remove an option, its ports and their links.
    ///
    /// Higher options shift down by one and their links follow them.
    /// Returns the removed links.
    pub fn remove_option(&mut self, id: NodeId, index: usize) -> Result<Vec<LinkId>, FableError> {
        let node = self.node_ref(id)?;
        if !matches!(node.kind, NodeKind::Action(_) | NodeKind::Menu(_)) {
            return Err(FableError::UnsupportedOperation {
                node: id,
                operation: "remove_option",
            });
        }
        if index >= node.kind.option_count() {
            return Err(FableError::OptionOutOfRange {
                node: id,
                index: index as i64,
            });
        }

        let doomed: Vec<LinkId> = self
            .links
            .values()
            .filter(|link| {
                [link.source, link.target]
                    .iter()
                    .any(|end| end.node == id && end.slot.option_index() == Some(index))
            })
            .map(|link| link.id)
            .collect();
        for link_id in &doomed {
            self.links.remove(link_id);
        }

        for link in self.links.values_mut() {
            for end in [&mut link.source, &mut link.target] {
                if end.node != id {
                    continue;
                }
                if let Some(i) = end.slot.option_index() {
                    if i > index {
                        end.slot = end.slot.with_index(i - 1);
                    }
                }
            }
        }

        match &mut self.node_mut(id)?.kind {
            NodeKind::Action(action) => action.option_count -= 1,
            NodeKind::Menu(menu) => {
                menu.options.remove(index);
                let removed = index as i32;
                if menu.default_option == removed {
                    menu.default_option = if menu.options.is_empty() { -1 } else { 0 };
                } else if menu.default_option > removed {
                    menu.default_option -= 1;
                }
            }
            _ => {}
        }
        debug!(node = %id, option = index, removed_links = doomed.len(), "option removed");
        Ok(doomed)
    }

    /// Pick the option a menu plays on "ok" (`-1` for random).
    pub fn set_default_option(&mut self, id: NodeId, option: i32) -> Result<(), FableError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Menu(menu) => {
                let in_range = option == -1
                    || (option >= 0 && (option as usize) < menu.options.len());
                if !in_range {
                    return Err(FableError::OptionOutOfRange {
                        node: id,
                        index: i64::from(option),
                    });
                }
                menu.default_option = option;
                Ok(())
            }
            _ => Err(FableError::UnsupportedOperation {
                node: id,
                operation: "set_default_option",
            }),
        }
    }

    // -------------------------------------------------------------------------
    // CONTROLS
    // -------------------------------------------------------------------------

    /// Toggle a control on a stage, cover, or menu question.
    ///
    /// Links on ports that disappear are removed and returned.
    pub fn set_control(
        &mut self,
        id: NodeId,
        control: Control,
        enabled: bool,
    ) -> Result<Vec<LinkId>, FableError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Stage(stage) => stage.controls.set(control, enabled),
            NodeKind::Cover(cover) => {
                if !enabled && matches!(control, Control::Wheel | Control::Ok) {
                    return Err(FableError::ForcedControl { node: id, control });
                }
                cover.controls.set(control, enabled);
            }
            NodeKind::Menu(menu) => menu.question_controls.set(control, enabled),
            NodeKind::Story(_) | NodeKind::Action(_) => {
                return Err(FableError::UnsupportedOperation {
                    node: id,
                    operation: "set_control",
                });
            }
        }
        Ok(self.prune_links(id))
    }

    pub fn set_custom_ok(&mut self, id: NodeId, enabled: bool) -> Result<Vec<LinkId>, FableError> {
        self.update_story_flags(id, |flags| flags.custom_ok_transition = enabled)
    }

    pub fn set_custom_home(
        &mut self,
        id: NodeId,
        enabled: bool,
    ) -> Result<Vec<LinkId>, FableError> {
        self.update_story_flags(id, |flags| flags.custom_home_transition = enabled)
    }

    pub fn set_disable_home(
        &mut self,
        id: NodeId,
        disabled: bool,
    ) -> Result<Vec<LinkId>, FableError> {
        self.update_story_flags(id, |flags| flags.disable_home = disabled)
    }

    fn update_story_flags(
        &mut self,
        id: NodeId,
        update: impl FnOnce(&mut StoryFlags),
    ) -> Result<Vec<LinkId>, FableError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Story(story) => update(&mut story.flags),
            _ => {
                return Err(FableError::UnsupportedOperation {
                    node: id,
                    operation: "story flags",
                });
            }
        }
        Ok(self.prune_links(id))
    }

    /// Drop links whose endpoint on `id` is no longer an exposed port.
    fn prune_links(&mut self, id: NodeId) -> Vec<LinkId> {
        let is_entry = self.entry == Some(id);
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let doomed: Vec<LinkId> = self
            .links
            .values()
            .filter(|link| {
                [link.source, link.target]
                    .iter()
                    .any(|end| end.node == id && node.kind.port(end.slot, is_entry).is_none())
            })
            .map(|link| link.id)
            .collect();
        for link_id in &doomed {
            self.links.remove(link_id);
        }
        if !doomed.is_empty() {
            debug!(node = %id, removed_links = doomed.len(), "orphaned links removed");
        }
        doomed
    }

    // -------------------------------------------------------------------------
    // ENTRY NODE
    // -------------------------------------------------------------------------

    #[must_use]
    pub const fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    #[must_use]
    pub fn entry_node(&self) -> Option<&Node> {
        self.entry.and_then(|id| self.nodes.get(&id))
    }

    #[must_use]
    pub fn is_entry(&self, id: NodeId) -> bool {
        self.entry == Some(id)
    }

    /// Designate a stage as the entry node.
    ///
    /// Fails if another node already is the entry. Links on the stage's
    /// inbound port are removed and returned.
    pub fn set_entry(&mut self, id: NodeId) -> Result<Vec<LinkId>, FableError> {
        let node = self.node_ref(id)?;
        if self.entry == Some(id) {
            return Ok(Vec::new());
        }
        if !matches!(node.kind, NodeKind::Stage(_) | NodeKind::Cover(_)) {
            return Err(FableError::NotEntryCapable(id));
        }
        if let Some(existing) = self.entry {
            return Err(FableError::EntryConflict {
                existing,
                requested: id,
            });
        }
        self.entry = Some(id);
        debug!(node = %id, "entry designated");
        Ok(self.prune_links(id))
    }

    /// Unflag the entry node. A cover cannot be unflagged.
    pub fn clear_entry(&mut self) -> Result<(), FableError> {
        if let Some(entry) = self.entry {
            if matches!(self.node_ref(entry)?.kind, NodeKind::Cover(_)) {
                return Err(FableError::CoverIsEntry(entry));
            }
        }
        self.entry = None;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // PORTS
    // -------------------------------------------------------------------------

    /// Ports currently exposed by a node.
    pub fn ports(&self, id: NodeId) -> Result<Vec<Port>, FableError> {
        let node = self.node_ref(id)?;
        Ok(node.kind.ports(self.is_entry(id)))
    }

    #[must_use]
    pub fn port(&self, port: PortRef) -> Option<Port> {
        self.nodes
            .get(&port.node)
            .and_then(|node| node.kind.port(port.slot, self.is_entry(port.node)))
    }

    #[must_use]
    pub fn port_kind(&self, port: PortRef) -> Option<PortKind> {
        self.port(port).map(|p| p.kind)
    }

    // -------------------------------------------------------------------------
    // LINKS
    // -------------------------------------------------------------------------

    /// Check that `a` and `b` can be linked.
    ///
    /// Returns the ports as `(outbound, inbound)`.
    pub fn check_link(&self, a: PortRef, b: PortRef) -> Result<(PortRef, PortRef), FableError> {
        let port_a = self.resolve_port(a)?;
        let port_b = self.resolve_port(b)?;
        let illegal = |reason| FableError::IllegalLink {
            from: a,
            to: b,
            reason,
        };

        if port_a.kind == port_b.kind {
            return Err(illegal(LinkViolation::SameKind));
        }
        if port_a.direction == port_b.direction {
            return Err(illegal(LinkViolation::SameDirection));
        }
        if a.node == b.node {
            return Err(illegal(LinkViolation::SelfLoop));
        }
        let (outbound, inbound) = if port_a.direction == Direction::Outbound {
            (a, b)
        } else {
            (b, a)
        };
        if self.outbound_link(outbound).is_some() {
            return Err(illegal(LinkViolation::FanOut));
        }
        Ok((outbound, inbound))
    }

    /// Link two ports, in either drawing direction.
    pub fn connect(&mut self, source: PortRef, target: PortRef) -> Result<LinkId, FableError> {
        let (outbound, _) = self.check_link(source, target)?;
        let id = LinkId(self.next_link_id);
        let link = Link {
            id,
            source,
            target,
            inversed: outbound != source,
        };
        self.links.insert(id, link);
        self.next_link_id = self.next_link_id.saturating_add(1);
        debug!(link = %id, from = %source, to = %target, "link added");
        Ok(id)
    }

    pub fn disconnect(&mut self, id: LinkId) -> Result<Link, FableError> {
        self.links.remove(&id).ok_or(FableError::LinkNotFound(id))
    }

    #[must_use]
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Links in id (creation) order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Semantic `(outbound, inbound)` pair of a link.
    #[must_use]
    pub fn forward(&self, id: LinkId) -> Option<(PortRef, PortRef)> {
        self.links.get(&id).map(Link::forward)
    }

    /// Every link with an endpoint on `port`.
    pub fn links_at(&self, port: PortRef) -> impl Iterator<Item = &Link> {
        self.links
            .values()
            .filter(move |link| link.source == port || link.target == port)
    }

    /// Links leaving `port`. Legal graphs have at most one.
    #[must_use]
    pub fn outbound_links(&self, port: PortRef) -> Vec<&Link> {
        self.links
            .values()
            .filter(|link| link.outbound() == port)
            .collect()
    }

    #[must_use]
    pub fn outbound_link(&self, port: PortRef) -> Option<&Link> {
        self.links.values().find(|link| link.outbound() == port)
    }

    /// Links arriving at `port`, in creation order.
    #[must_use]
    pub fn inbound_links(&self, port: PortRef) -> Vec<&Link> {
        self.links
            .values()
            .filter(|link| link.inbound() == port)
            .collect()
    }

    /// Outbound ports linking into any inbound port of `id`, in link order.
    #[must_use]
    pub fn predecessors(&self, id: NodeId) -> Vec<PortRef> {
        self.links
            .values()
            .filter(|link| link.inbound().node == id)
            .map(Link::outbound)
            .collect()
    }

    /// Nodes reached from the outbound ports of `id`, in port order.
    #[must_use]
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        node.kind
            .ports(self.is_entry(id))
            .into_iter()
            .filter(|port| port.direction == Direction::Outbound)
            .filter_map(|port| self.outbound_link(PortRef::new(id, port.slot)))
            .map(|link| link.inbound().node)
            .collect()
    }

    fn resolve_port(&self, port: PortRef) -> Result<Port, FableError> {
        let node = self.node_ref(port.node)?;
        node.kind
            .port(port.slot, self.is_entry(port.node))
            .ok_or(FableError::PortNotFound(port))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PortSlot;

    fn port(node: NodeId, slot: PortSlot) -> PortRef {
        PortRef::new(node, slot)
    }

    fn violation(result: Result<LinkId, FableError>) -> Option<LinkViolation> {
        match result {
            Err(FableError::IllegalLink { reason, .. }) => Some(reason),
            _ => None,
        }
    }

    #[test]
    fn connect_stage_to_action_and_back() {
        let mut pack = Pack::default();
        let s1 = pack.add_node(NodeKind::stage("s1"), None).expect("s1");
        let a = pack.add_node(NodeKind::action("a", 1), None).expect("a");
        let s2 = pack.add_node(NodeKind::stage("s2"), None).expect("s2");

        let l1 = pack
            .connect(port(s1, PortSlot::Ok), port(a, PortSlot::OptionIn(0)))
            .expect("s1 -> a");
        let l2 = pack
            .connect(port(s2, PortSlot::From), port(a, PortSlot::OptionOut(0)))
            .expect("drawn backwards");

        assert!(!pack.link(l1).expect("l1").inversed);
        let drawn = pack.link(l2).expect("l2");
        assert!(drawn.inversed);
        assert_eq!(
            drawn.forward(),
            (port(a, PortSlot::OptionOut(0)), port(s2, PortSlot::From))
        );
        assert_eq!(pack.successors(a), vec![s2]);
        assert_eq!(pack.predecessors(a), vec![port(s1, PortSlot::Ok)]);
    }

    #[test]
    fn same_kind_is_rejected() {
        let mut pack = Pack::default();
        let s1 = pack.add_node(NodeKind::stage("s1"), None).expect("s1");
        let s2 = pack.add_node(NodeKind::stage("s2"), None).expect("s2");
        let result = pack.connect(port(s1, PortSlot::Ok), port(s2, PortSlot::From));
        assert_eq!(violation(result), Some(LinkViolation::SameKind));
    }

    #[test]
    fn same_direction_is_rejected() {
        let mut pack = Pack::default();
        let s = pack.add_node(NodeKind::stage("s"), None).expect("s");
        let a = pack.add_node(NodeKind::action("a", 1), None).expect("a");
        let result = pack.connect(port(s, PortSlot::Ok), port(a, PortSlot::OptionOut(0)));
        assert_eq!(violation(result), Some(LinkViolation::SameDirection));
    }

    #[test]
    fn self_loop_is_rejected() {
        let mut pack = Pack::default();
        let m = pack
            .add_node(NodeKind::menu("m", &["a"]), None)
            .expect("menu");
        // Content option out to branch-side inbound of the same node.
        let result = pack.connect(port(m, PortSlot::Option(0)), port(m, PortSlot::From));
        assert_eq!(violation(result), Some(LinkViolation::SelfLoop));
    }

    #[test]
    fn fan_out_is_bounded_fan_in_is_not() {
        let mut pack = Pack::default();
        let s1 = pack.add_node(NodeKind::stage("s1"), None).expect("s1");
        let s2 = pack.add_node(NodeKind::stage("s2"), None).expect("s2");
        let a = pack.add_node(NodeKind::action("a", 2), None).expect("a");

        pack.connect(port(s1, PortSlot::Ok), port(a, PortSlot::OptionIn(0)))
            .expect("first");
        pack.connect(port(s2, PortSlot::Ok), port(a, PortSlot::OptionIn(0)))
            .expect("fan-in");
        let result = pack.connect(port(s1, PortSlot::Ok), port(a, PortSlot::Random));
        assert_eq!(violation(result), Some(LinkViolation::FanOut));
        assert_eq!(pack.inbound_links(port(a, PortSlot::OptionIn(0))).len(), 2);
    }

    #[test]
    fn missing_port_is_reported() {
        let mut pack = Pack::default();
        let s = pack.add_node(NodeKind::stage("s"), None).expect("s");
        let a = pack.add_node(NodeKind::action("a", 1), None).expect("a");
        let result = pack.connect(port(s, PortSlot::Ok), port(a, PortSlot::OptionIn(3)));
        assert!(matches!(result, Err(FableError::PortNotFound(_))));
    }

    #[test]
    fn control_toggle_cascades_links() {
        let mut pack = Pack::default();
        let s = pack.add_node(NodeKind::stage("s"), None).expect("s");
        let a = pack.add_node(NodeKind::action("a", 1), None).expect("a");
        let link = pack
            .connect(port(s, PortSlot::Home), port(a, PortSlot::OptionIn(0)))
            .expect("home link");

        let removed = pack.set_control(s, Control::Home, false).expect("toggle");
        assert_eq!(removed, vec![link]);
        assert_eq!(pack.link_count(), 0);
        assert!(pack.port(port(s, PortSlot::Home)).is_none());
    }

    #[test]
    fn autoplay_keeps_ok_port_alive() {
        let mut pack = Pack::default();
        let s = pack.add_node(NodeKind::stage("s"), None).expect("s");
        let a = pack.add_node(NodeKind::action("a", 1), None).expect("a");
        pack.connect(port(s, PortSlot::Ok), port(a, PortSlot::OptionIn(0)))
            .expect("ok link");

        pack.set_control(s, Control::Autoplay, true).expect("autoplay");
        let removed = pack.set_control(s, Control::Ok, false).expect("ok off");
        assert!(removed.is_empty());
        assert_eq!(pack.link_count(), 1);
    }

    #[test]
    fn cover_is_entry_and_unique() {
        let mut pack = Pack::default();
        let cover = pack.add_node(NodeKind::cover("c"), None).expect("cover");
        assert_eq!(pack.entry(), Some(cover));

        let second = pack.add_node(NodeKind::cover("c2"), None);
        assert!(matches!(second, Err(FableError::EntryConflict { .. })));
        assert!(matches!(
            pack.clone_node(cover),
            Err(FableError::EntryConflict { .. })
        ));
        assert!(matches!(
            pack.clear_entry(),
            Err(FableError::CoverIsEntry(_))
        ));
        assert!(matches!(
            pack.set_control(cover, Control::Ok, false),
            Err(FableError::ForcedControl { .. })
        ));
    }

    #[test]
    fn set_entry_rules() {
        let mut pack = Pack::default();
        let s1 = pack.add_node(NodeKind::stage("s1"), None).expect("s1");
        let s2 = pack.add_node(NodeKind::stage("s2"), None).expect("s2");
        let a = pack.add_node(NodeKind::action("a", 1), None).expect("a");
        let story = pack.add_node(NodeKind::story("st"), None).expect("story");
        let link = pack
            .connect(port(a, PortSlot::OptionOut(0)), port(s1, PortSlot::From))
            .expect("a -> s1");

        assert!(matches!(
            pack.set_entry(story),
            Err(FableError::NotEntryCapable(_))
        ));
        let removed = pack.set_entry(s1).expect("entry");
        assert_eq!(removed, vec![link]);
        assert!(pack.set_entry(s1).expect("idempotent").is_empty());
        assert!(matches!(
            pack.set_entry(s2),
            Err(FableError::EntryConflict { .. })
        ));

        pack.clear_entry().expect("clear");
        pack.set_entry(s2).expect("new entry");
        assert_eq!(pack.entry(), Some(s2));
    }

    #[test]
    fn removing_entry_clears_designation() {
        let mut pack = Pack::default();
        let cover = pack.add_node(NodeKind::cover("c"), None).expect("cover");
        let a = pack.add_node(NodeKind::action("a", 1), None).expect("a");
        pack.connect(port(cover, PortSlot::Ok), port(a, PortSlot::OptionIn(0)))
            .expect("link");

        pack.remove_node(cover).expect("remove");
        assert_eq!(pack.entry(), None);
        assert_eq!(pack.link_count(), 0);
        pack.add_node(NodeKind::cover("c2"), None)
            .expect("a new cover is accepted");
    }

    #[test]
    fn remove_option_renumbers_links() {
        let mut pack = Pack::default();
        let a = pack.add_node(NodeKind::action("a", 3), None).expect("a");
        let s0 = pack.add_node(NodeKind::stage("s0"), None).expect("s0");
        let s2 = pack.add_node(NodeKind::stage("s2"), None).expect("s2");
        let l0 = pack
            .connect(port(a, PortSlot::OptionOut(0)), port(s0, PortSlot::From))
            .expect("o0");
        let l2 = pack
            .connect(port(a, PortSlot::OptionOut(2)), port(s2, PortSlot::From))
            .expect("o2");

        let removed = pack.remove_option(a, 0).expect("remove");
        assert_eq!(removed, vec![l0]);
        assert_eq!(
            pack.link(l2).expect("l2").source,
            port(a, PortSlot::OptionOut(1))
        );
        assert_eq!(pack.node(a).expect("a").kind.option_count(), 2);
        assert!(matches!(
            pack.remove_option(a, 5),
            Err(FableError::OptionOutOfRange { .. })
        ));
    }

    #[test]
    fn menu_options_and_default() {
        let mut pack = Pack::default();
        let m = pack
            .add_node(NodeKind::menu("m", &["red", "blue"]), None)
            .expect("menu");
        pack.set_default_option(m, 1).expect("default 1");
        assert!(pack.set_default_option(m, 2).is_err());

        assert_eq!(pack.add_option(m).expect("add"), 2);
        pack.remove_option(m, 0).expect("remove red");
        let kind = &pack.node(m).expect("menu").kind;
        assert!(matches!(
            kind,
            NodeKind::Menu(menu) if menu.default_option == 0 && menu.options[0].name == "blue"
        ));
    }

    #[test]
    fn story_flags_cascade() {
        let mut pack = Pack::default();
        let story = pack.add_node(NodeKind::story("st"), None).expect("story");
        let a = pack.add_node(NodeKind::action("a", 1), None).expect("a");

        assert!(pack.port(port(story, PortSlot::Home)).is_none());
        pack.set_custom_home(story, true).expect("custom home");
        let link = pack
            .connect(port(story, PortSlot::Home), port(a, PortSlot::OptionIn(0)))
            .expect("home link");

        let removed = pack.set_disable_home(story, true).expect("disable");
        assert_eq!(removed, vec![link]);
    }

    #[test]
    fn clone_gets_fresh_identity_and_no_links() {
        let mut pack = Pack::default();
        let s = pack.add_node(NodeKind::stage("s"), None).expect("s");
        let a = pack.add_node(NodeKind::action("a", 1), None).expect("a");
        pack.connect(port(s, PortSlot::Ok), port(a, PortSlot::OptionIn(0)))
            .expect("link");

        let copy = pack.clone_node(s).expect("clone");
        let original = pack.node(s).expect("s");
        let cloned = pack.node(copy).expect("copy");
        assert_ne!(original.uuid, cloned.uuid);
        assert_eq!(original.kind, cloned.kind);
        assert_eq!(pack.links_at(port(copy, PortSlot::Ok)).count(), 0);
    }

    #[test]
    fn duplicate_uuid_is_rejected() {
        let mut pack = Pack::default();
        let uuid = Uuid::new_v4();
        pack.add_node_with_uuid(uuid, NodeKind::stage("a"), None)
            .expect("first");
        assert!(matches!(
            pack.add_node_with_uuid(uuid, NodeKind::stage("b"), None),
            Err(FableError::DuplicateUuid(_))
        ));
    }
}
