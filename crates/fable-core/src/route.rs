//! # Routes
//!
//! A `Route` names the branch a transition enters and which of its options
//! is taken. It is the authoring-graph form of an archive transition
//! (`{actionNode, optionIndex}`): the compiler turns routes into records and
//! the traversal engine follows them.
//!
//! Composite nodes own synthetic branches:
//! - a menu has a question branch (one option, the question) and an options
//!   branch (one option per menu option);
//! - a story has a story branch (one option, the story itself).

use crate::graph::Pack;
use crate::node::NodeKind;
use crate::{NodeId, PortRef, PortSlot};
use serde::{Deserialize, Serialize};

/// A branch a transition can enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Branch {
    /// An authored action node.
    Action(NodeId),
    /// The question branch of a menu.
    MenuQuestion(NodeId),
    /// The options branch of a menu.
    MenuOptions(NodeId),
    /// The self-referencing branch of a story.
    Story(NodeId),
}

impl Branch {
    /// Node that owns the branch.
    #[must_use]
    pub const fn node(self) -> NodeId {
        match self {
            Self::Action(id) | Self::MenuQuestion(id) | Self::MenuOptions(id) | Self::Story(id) => {
                id
            }
        }
    }
}

/// Which option of a branch is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Selector {
    Index(usize),
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Route {
    pub branch: Branch,
    pub selector: Selector,
}

impl Route {
    #[must_use]
    pub const fn new(branch: Branch, selector: Selector) -> Self {
        Self { branch, selector }
    }

    #[must_use]
    pub const fn first(branch: Branch) -> Self {
        Self::new(branch, Selector::Index(0))
    }
}

impl Pack {
    /// Route taken when a transition lands on `target`.
    ///
    /// `None` if `target` is not a branch-side inbound port.
    #[must_use]
    pub fn route_into(&self, target: PortRef) -> Option<Route> {
        let node = self.node(target.node)?;
        let id = target.node;
        match (&node.kind, target.slot) {
            (NodeKind::Action(action), PortSlot::OptionIn(i)) if i < action.option_count => {
                Some(Route::new(Branch::Action(id), Selector::Index(i)))
            }
            (NodeKind::Action(_), PortSlot::Random) => {
                Some(Route::new(Branch::Action(id), Selector::Random))
            }
            (NodeKind::Menu(_), PortSlot::From) => Some(Route::first(Branch::MenuQuestion(id))),
            (NodeKind::Story(_), PortSlot::From) => Some(Route::first(Branch::Story(id))),
            _ => None,
        }
    }

    /// Route reached through the link on an outbound port.
    #[must_use]
    pub fn route_from(&self, outbound: PortRef) -> Option<Route> {
        self.outbound_link(outbound)
            .and_then(|link| self.route_into(link.inbound()))
    }

    /// Route of the entry node's "ok" link: the first meaningful step of
    /// the pack.
    #[must_use]
    pub fn entry_route(&self) -> Option<Route> {
        let entry = self.entry()?;
        self.route_from(PortRef::new(entry, PortSlot::Ok))
    }

    /// Route that re-enters whatever leads into a menu.
    ///
    /// Follows the menu's first inbound link back to its predecessor and
    /// rebuilds the transition that reaches that predecessor. `None` when
    /// the menu has no inbound link or the predecessor is only reachable
    /// as the entry.
    #[must_use]
    pub fn menu_home_route(&self, menu: NodeId) -> Option<Route> {
        let inbound = self.inbound_links(PortRef::new(menu, PortSlot::From));
        let predecessor = inbound.first()?.outbound();
        let node = self.node(predecessor.node)?;
        match (&node.kind, predecessor.slot) {
            (NodeKind::Stage(_), _) => {
                let into_stage = self.inbound_links(PortRef::new(predecessor.node, PortSlot::From));
                let via = into_stage.first()?.outbound();
                match (&self.node(via.node)?.kind, via.slot) {
                    (NodeKind::Action(_), PortSlot::OptionOut(k)) => {
                        Some(Route::new(Branch::Action(via.node), Selector::Index(k)))
                    }
                    _ => None,
                }
            }
            (NodeKind::Menu(_), PortSlot::Option(k)) => Some(Route::new(
                Branch::MenuOptions(predecessor.node),
                Selector::Index(k),
            )),
            (NodeKind::Story(_), _) => Some(Route::first(Branch::Story(predecessor.node))),
            _ => None,
        }
    }

    /// Number of options a branch offers.
    #[must_use]
    pub fn branch_width(&self, branch: Branch) -> Option<usize> {
        let node = self.node(branch.node())?;
        match (branch, &node.kind) {
            (Branch::Action(_), NodeKind::Action(action)) => Some(action.option_count),
            (Branch::MenuOptions(_), NodeKind::Menu(menu)) => Some(menu.options.len()),
            (Branch::MenuQuestion(_), NodeKind::Menu(_)) | (Branch::Story(_), NodeKind::Story(_)) => {
                Some(1)
            }
            _ => None,
        }
    }

    /// Content node an action option leads to.
    #[must_use]
    pub fn option_target(&self, action: NodeId, index: usize) -> Option<NodeId> {
        self.outbound_link(PortRef::new(action, PortSlot::OptionOut(index)))
            .map(|link| link.inbound().node)
    }
}

// =============================================================================
// TESTS
// =============================================================================
