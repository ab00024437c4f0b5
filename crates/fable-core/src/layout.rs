//! # Layout Assist
//!
//! Deterministic rank-based left-to-right layout.
//!
//! Ranks come from a breadth-first walk along outbound links, starting at
//! the entry node, then at every node without inbound links, then at
//! anything still unvisited (cycles). Each rank is a column; nodes in a
//! column are stacked in discovery order.
//!
//! Coordinates are computed with integers and only converted to `f64` at
//! the end, so the same graph always produces the same positions.

use crate::graph::Pack;
use crate::{NodeId, Position};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Grid used to place ranked nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub column_width: i64,
    pub row_height: i64,
    pub origin_x: i64,
    pub origin_y: i64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            column_width: 320,
            row_height: 160,
            origin_x: 0,
            origin_y: 0,
        }
    }
}

/// Rank of every node, plus its row inside the rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub rank: usize,
    pub row: usize,
}

/// Assign a `(rank, row)` slot to every node of the pack.
#[must_use]
pub fn rank_nodes(pack: &Pack) -> BTreeMap<NodeId, Slot> {
    let with_inbound: BTreeSet<NodeId> = pack.links().map(|link| link.inbound().node).collect();

    let mut roots: Vec<NodeId> = pack.entry().into_iter().collect();
    roots.extend(
        pack.nodes()
            .map(|node| node.id)
            .filter(|id| !with_inbound.contains(id) && Some(*id) != pack.entry()),
    );
    roots.extend(pack.nodes().map(|node| node.id));

    let mut ranks: BTreeMap<NodeId, usize> = BTreeMap::new();
    let mut order: Vec<NodeId> = Vec::with_capacity(pack.node_count());
    for root in roots {
        if ranks.contains_key(&root) {
            continue;
        }
        ranks.insert(root, 0);
        order.push(root);
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            let rank = ranks.get(&current).copied().unwrap_or(0);
            for next in pack.successors(current) {
                if ranks.contains_key(&next) {
                    continue;
                }
                ranks.insert(next, rank + 1);
                order.push(next);
                queue.push_back(next);
            }
        }
    }

    let mut rows_used: BTreeMap<usize, usize> = BTreeMap::new();
    let mut slots = BTreeMap::new();
    for id in order {
        let rank = ranks.get(&id).copied().unwrap_or(0);
        let row = rows_used.entry(rank).or_insert(0);
        slots.insert(id, Slot { rank, row: *row });
        *row += 1;
    }
    slots
}

/// Compute a position for every node.
#[must_use]
pub fn compute_layout(pack: &Pack, config: &LayoutConfig) -> BTreeMap<NodeId, Position> {
    rank_nodes(pack)
        .into_iter()
        .map(|(id, slot)| {
            let x = config
                .origin_x
                .saturating_add((slot.rank as i64).saturating_mul(config.column_width));
            let y = config
                .origin_y
                .saturating_add((slot.row as i64).saturating_mul(config.row_height));
            (id, Position::new(x as f64, y as f64))
        })
        .collect()
}

/// Overwrite every node position with the computed layout.
///
/// Returns the number of nodes placed.
pub fn apply_layout(pack: &mut Pack, config: &LayoutConfig) -> usize {
    let positions = compute_layout(pack, config);
    let mut placed = 0;
    for (id, position) in positions {
        if pack.set_position(id, Some(position)).is_ok() {
            placed += 1;
        }
    }
    placed
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use crate::{PortRef, PortSlot};

    fn chain() -> (Pack, Vec<NodeId>) {
        let mut pack = Pack::default();
        let cover = pack.add_node(NodeKind::cover("c"), None).expect("cover");
        let a = pack.add_node(NodeKind::action("a", 2), None).expect("a");
        let s1 = pack.add_node(NodeKind::stage("s1"), None).expect("s1");
        let s2 = pack.add_node(NodeKind::stage("s2"), None).expect("s2");
        let lonely = pack.add_node(NodeKind::stage("lonely"), None).expect("lonely");
        pack.connect(
            PortRef::new(cover, PortSlot::Ok),
            PortRef::new(a, PortSlot::OptionIn(0)),
        )
        .expect("c -> a");
        pack.connect(
            PortRef::new(a, PortSlot::OptionOut(0)),
            PortRef::new(s1, PortSlot::From),
        )
        .expect("a -> s1");
        pack.connect(
            PortRef::new(a, PortSlot::OptionOut(1)),
            PortRef::new(s2, PortSlot::From),
        )
        .expect("a -> s2");
        (pack, vec![cover, a, s1, s2, lonely])
    }

    #[test]
    fn ranks_follow_links_from_entry() {
        let (pack, ids) = chain();
        let slots = rank_nodes(&pack);

        assert_eq!(slots[&ids[0]], Slot { rank: 0, row: 0 });
        assert_eq!(slots[&ids[1]], Slot { rank: 1, row: 0 });
        assert_eq!(slots[&ids[2]], Slot { rank: 2, row: 0 });
        assert_eq!(slots[&ids[3]], Slot { rank: 2, row: 1 });
        assert_eq!(slots[&ids[4]], Slot { rank: 0, row: 1 });
    }

    #[test]
    fn every_node_gets_a_position() {
        let (mut pack, _) = chain();
        let placed = apply_layout(&mut pack, &LayoutConfig::default());
        assert_eq!(placed, pack.node_count());
        assert!(pack.nodes().all(|node| node.position.is_some()));
    }

    #[test]
    fn layout_is_deterministic() {
        let (pack, ids) = chain();
        let config = LayoutConfig {
            column_width: 100,
            row_height: 50,
            origin_x: 10,
            origin_y: 20,
        };
        let first = compute_layout(&pack, &config);
        let second = compute_layout(&pack, &config);
        assert_eq!(first, second);
        assert_eq!(first[&ids[3]], Position::new(210.0, 70.0));
    }

    #[test]
    fn cycles_without_roots_are_placed() {
        let mut pack = Pack::default();
        let s = pack.add_node(NodeKind::stage("s"), None).expect("s");
        let a = pack.add_node(NodeKind::action("a", 1), None).expect("a");
        pack.connect(PortRef::new(s, PortSlot::Ok), PortRef::new(a, PortSlot::OptionIn(0)))
            .expect("s -> a");
        pack.connect(
            PortRef::new(a, PortSlot::OptionOut(0)),
            PortRef::new(s, PortSlot::From),
        )
        .expect("a -> s");

        let slots = rank_nodes(&pack);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[&s].rank, 0);
        assert_eq!(slots[&a].rank, 1);
    }
}
