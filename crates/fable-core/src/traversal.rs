//! # Traversal Engine
//!
//! Interprets a pack as the playback device would: a state machine over the
//! scene being played and the branch it was reached through.
//!
//! - `ok`, `home` and the wheel move the player from its current state.
//! - A move that cannot be resolved returns `Step::DeadEnd` and leaves the
//!   state untouched. Dead ends are composition problems, never faults.
//! - Random picks go through an injected `rand::Rng`, so a seeded player
//!   replays the same path.
//!
//! Menus and stories play the way the compiler expands them: a menu shows
//! its question, then its options; a story plays and then follows the
//! entry's first transition unless it overrides it.

use crate::graph::Pack;
use crate::node::NodeKind;
use crate::route::{Branch, Route, Selector};
use crate::{Control, NodeId, PortRef, PortSlot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// STATE
// =============================================================================

/// What the device is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scene {
    /// A stage, cover or story node.
    Node(NodeId),
    /// The question of a menu.
    MenuQuestion(NodeId),
    /// One option of a menu.
    MenuOption(NodeId, usize),
}

impl Scene {
    /// Node the scene belongs to.
    #[must_use]
    pub const fn node(self) -> NodeId {
        match self {
            Self::Node(id) | Self::MenuQuestion(id) | Self::MenuOption(id, _) => id,
        }
    }
}

/// The branch the current scene was reached through, and the option taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchContext {
    pub branch: Branch,
    pub index: usize,
}

/// Player state: current scene plus optional branch context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playback {
    pub scene: Scene,
    pub context: Option<BranchContext>,
}

impl Playback {
    #[must_use]
    pub const fn at(scene: Scene) -> Self {
        Self {
            scene,
            context: None,
        }
    }
}

/// Why a move could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeadEnd {
    /// `start` was never called.
    NotStarted,
    /// The pack has no entry node.
    NoEntry,
    /// The node is gone or cannot be played.
    UnknownNode(NodeId),
    /// The port does not lead into a branch.
    NotEnterable(PortRef),
    /// The scene does not react to this control.
    ControlDisabled(Control),
    /// The wheel needs a branch context.
    NoBranchContext,
    /// No link leaves the port.
    MissingDestination(PortRef),
    /// More than one link leaves the port.
    AmbiguousDestination(PortRef),
    /// The branch has no options to pick from.
    EmptyBranch(Branch),
    /// The selected option does not exist.
    OptionOutOfRange { branch: Branch, index: usize },
}

impl fmt::Display for DeadEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "playback not started"),
            Self::NoEntry => write!(f, "pack has no entry node"),
            Self::UnknownNode(id) => write!(f, "node {} cannot be played", id),
            Self::NotEnterable(port) => write!(f, "port {} does not lead into a branch", port),
            Self::ControlDisabled(control) => write!(f, "control '{}' is disabled here", control),
            Self::NoBranchContext => write!(f, "no branch to turn the wheel on"),
            Self::MissingDestination(port) => write!(f, "no link leaves {}", port),
            Self::AmbiguousDestination(port) => write!(f, "several links leave {}", port),
            Self::EmptyBranch(branch) => write!(f, "branch {:?} has no options", branch),
            Self::OptionOutOfRange { branch, index } => {
                write!(f, "option {} out of range on {:?}", index, branch)
            }
        }
    }
}

/// Result of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Moved(Playback),
    DeadEnd(DeadEnd),
}

impl Step {
    #[must_use]
    pub const fn playback(&self) -> Option<&Playback> {
        match self {
            Self::Moved(playback) => Some(playback),
            Self::DeadEnd(_) => None,
        }
    }

    #[must_use]
    pub const fn is_dead_end(&self) -> bool {
        matches!(self, Self::DeadEnd(_))
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// Stateful player over a borrowed pack.
pub struct Player<'p, R = StdRng> {
    pack: &'p Pack,
    rng: R,
    current: Option<Playback>,
}

impl<'p> Player<'p, StdRng> {
    /// Player with an entropy-seeded random source.
    #[must_use]
    pub fn new(pack: &'p Pack) -> Self {
        Self::with_rng(pack, StdRng::from_entropy())
    }

    /// Player whose random picks replay for the same seed.
    #[must_use]
    pub fn seeded(pack: &'p Pack, seed: u64) -> Self {
        Self::with_rng(pack, StdRng::seed_from_u64(seed))
    }
}

impl<'p, R: Rng> Player<'p, R> {
    pub fn with_rng(pack: &'p Pack, rng: R) -> Self {
        Self {
            pack,
            rng,
            current: None,
        }
    }

    #[must_use]
    pub const fn current(&self) -> Option<&Playback> {
        self.current.as_ref()
    }

    /// Jump to the entry node with no branch context.
    pub fn start(&mut self) -> Step {
        let step = self.reset();
        self.commit(step)
    }

    /// Enter `node` through its `via` port.
    pub fn enter(&mut self, node: NodeId, via: PortSlot) -> Step {
        let step = self.resolve_enter(node, via);
        self.commit(step)
    }

    /// Take a route directly.
    pub fn follow(&mut self, route: Route) -> Step {
        let step = self.resolve_route(route);
        self.commit(step)
    }

    pub fn ok(&mut self) -> Step {
        let step = self.resolve_ok();
        self.commit(step)
    }

    pub fn home(&mut self) -> Step {
        let step = self.resolve_home();
        self.commit(step)
    }

    pub fn wheel_left(&mut self) -> Step {
        let step = self.resolve_wheel(false);
        self.commit(step)
    }

    pub fn wheel_right(&mut self) -> Step {
        let step = self.resolve_wheel(true);
        self.commit(step)
    }

    fn commit(&mut self, step: Step) -> Step {
        if let Step::Moved(playback) = step {
            self.current = Some(playback);
        }
        step
    }

    // -------------------------------------------------------------------------
    // RESOLUTION
    // -------------------------------------------------------------------------

    fn reset(&self) -> Step {
        match self.pack.entry() {
            Some(entry) => Step::Moved(Playback::at(Scene::Node(entry))),
            None => Step::DeadEnd(DeadEnd::NoEntry),
        }
    }

    fn resolve_enter(&mut self, node: NodeId, via: PortSlot) -> Step {
        let Some(target) = self.pack.node(node) else {
            return Step::DeadEnd(DeadEnd::UnknownNode(node));
        };
        match target.kind {
            NodeKind::Stage(_) | NodeKind::Cover(_) => {
                Step::Moved(Playback::at(Scene::Node(node)))
            }
            NodeKind::Story(_) | NodeKind::Menu(_) | NodeKind::Action(_) => {
                let port = PortRef::new(node, via);
                match self.pack.route_into(port) {
                    Some(route) => self.resolve_route(route),
                    None => Step::DeadEnd(DeadEnd::NotEnterable(port)),
                }
            }
        }
    }

    fn resolve_route(&mut self, route: Route) -> Step {
        let Some(width) = self.pack.branch_width(route.branch) else {
            return Step::DeadEnd(DeadEnd::UnknownNode(route.branch.node()));
        };
        let index = match route.selector {
            Selector::Index(i) if i < width => i,
            Selector::Index(i) => {
                return Step::DeadEnd(DeadEnd::OptionOutOfRange {
                    branch: route.branch,
                    index: i,
                });
            }
            Selector::Random if width == 0 => {
                return Step::DeadEnd(DeadEnd::EmptyBranch(route.branch));
            }
            Selector::Random => self.rng.gen_range(0..width),
        };
        self.land(route.branch, index)
    }

    /// Scene reached by taking option `index` of `branch`.
    fn land(&self, branch: Branch, index: usize) -> Step {
        let context = Some(BranchContext { branch, index });
        let scene = match branch {
            Branch::Action(action) => {
                let port = PortRef::new(action, PortSlot::OptionOut(index));
                let links = self.pack.outbound_links(port);
                match links.as_slice() {
                    [] => return Step::DeadEnd(DeadEnd::MissingDestination(port)),
                    [link] => Scene::Node(link.inbound().node),
                    _ => return Step::DeadEnd(DeadEnd::AmbiguousDestination(port)),
                }
            }
            Branch::MenuQuestion(menu) => Scene::MenuQuestion(menu),
            Branch::MenuOptions(menu) => Scene::MenuOption(menu, index),
            Branch::Story(story) => Scene::Node(story),
        };
        Step::Moved(Playback { scene, context })
    }

    /// Follow the single link on an outbound port into its target.
    fn follow_port(&mut self, port: PortRef) -> Step {
        let pack = self.pack;
        let links = pack.outbound_links(port);
        match links.as_slice() {
            [] => Step::DeadEnd(DeadEnd::MissingDestination(port)),
            [link] => {
                let target = link.inbound();
                self.resolve_enter(target.node, target.slot)
            }
            _ => Step::DeadEnd(DeadEnd::AmbiguousDestination(port)),
        }
    }

    fn follow_entry_route(&mut self) -> Step {
        match self.pack.entry_route() {
            Some(route) => self.resolve_route(route),
            None => match self.pack.entry() {
                Some(entry) => {
                    Step::DeadEnd(DeadEnd::MissingDestination(PortRef::new(entry, PortSlot::Ok)))
                }
                None => Step::DeadEnd(DeadEnd::NoEntry),
            },
        }
    }

    fn resolve_ok(&mut self) -> Step {
        let Some(current) = self.current else {
            return Step::DeadEnd(DeadEnd::NotStarted);
        };
        let pack = self.pack;
        let id = current.scene.node();
        let Some(node) = pack.node(id) else {
            return Step::DeadEnd(DeadEnd::UnknownNode(id));
        };

        match (current.scene, &node.kind) {
            (Scene::Node(_), NodeKind::Stage(_) | NodeKind::Cover(_)) => {
                let port = PortRef::new(id, PortSlot::Ok);
                if pack.port(port).is_none() {
                    return Step::DeadEnd(DeadEnd::ControlDisabled(Control::Ok));
                }
                self.follow_port(port)
            }
            (Scene::Node(_), NodeKind::Story(story)) => {
                if story.flags.custom_ok_transition {
                    self.follow_port(PortRef::new(id, PortSlot::Ok))
                } else {
                    self.follow_entry_route()
                }
            }
            (Scene::MenuQuestion(_), NodeKind::Menu(menu)) => {
                if !menu.question_controls.leaves_on_ok() {
                    return Step::DeadEnd(DeadEnd::ControlDisabled(Control::Ok));
                }
                let selector = usize::try_from(menu.default_option)
                    .map(Selector::Index)
                    .unwrap_or(Selector::Random);
                self.resolve_route(Route::new(Branch::MenuOptions(id), selector))
            }
            (Scene::MenuOption(_, index), NodeKind::Menu(_)) => {
                self.follow_port(PortRef::new(id, PortSlot::Option(index)))
            }
            _ => Step::DeadEnd(DeadEnd::UnknownNode(id)),
        }
    }

    fn resolve_home(&mut self) -> Step {
        let Some(current) = self.current else {
            return Step::DeadEnd(DeadEnd::NotStarted);
        };
        let pack = self.pack;
        let id = current.scene.node();
        let Some(node) = pack.node(id) else {
            return Step::DeadEnd(DeadEnd::UnknownNode(id));
        };

        match (current.scene, &node.kind) {
            (Scene::Node(_), NodeKind::Stage(_) | NodeKind::Cover(_)) => {
                let port = PortRef::new(id, PortSlot::Home);
                if pack.outbound_link(port).is_none() {
                    return self.reset();
                }
                self.follow_port(port)
            }
            (Scene::Node(_), NodeKind::Story(story)) => {
                if story.flags.disable_home {
                    return self.reset();
                }
                if story.flags.custom_home_transition {
                    let port = PortRef::new(id, PortSlot::Home);
                    if pack.outbound_link(port).is_none() {
                        return self.reset();
                    }
                    return self.follow_port(port);
                }
                match pack.entry_route() {
                    Some(route) => self.resolve_route(route),
                    None => self.reset(),
                }
            }
            (Scene::MenuQuestion(_), NodeKind::Menu(menu)) if !menu.question_controls.home => {
                self.reset()
            }
            (Scene::MenuQuestion(_) | Scene::MenuOption(..), NodeKind::Menu(_)) => {
                match pack.menu_home_route(id) {
                    Some(route) => self.resolve_route(route),
                    None => self.reset(),
                }
            }
            _ => Step::DeadEnd(DeadEnd::UnknownNode(id)),
        }
    }

    fn resolve_wheel(&self, forward: bool) -> Step {
        let Some(current) = self.current else {
            return Step::DeadEnd(DeadEnd::NotStarted);
        };
        let Some(context) = current.context else {
            return Step::DeadEnd(DeadEnd::NoBranchContext);
        };
        let width = match self.pack.branch_width(context.branch) {
            Some(0) => return Step::DeadEnd(DeadEnd::EmptyBranch(context.branch)),
            Some(width) => width,
            None => return Step::DeadEnd(DeadEnd::UnknownNode(context.branch.node())),
        };
        let index = context.index % width;
        let next = if forward {
            (index + 1) % width
        } else {
            (index + width - 1) % width
        };
        self.land(context.branch, next)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn port(node: NodeId, slot: PortSlot) -> PortRef {
        PortRef::new(node, slot)
    }

    /// Cover -> action with `n` options, each leading to its own stage.
    fn fan(n: usize) -> (Pack, NodeId, NodeId, Vec<NodeId>) {
        let mut pack = Pack::default();
        let cover = pack.add_node(NodeKind::cover("C"), None).expect("cover");
        let action = pack.add_node(NodeKind::action("A", n), None).expect("a");
        pack.connect(port(cover, PortSlot::Ok), port(action, PortSlot::OptionIn(0)))
            .expect("c -> a");
        let stages = (0..n)
            .map(|i| {
                let s = pack
                    .add_node(NodeKind::stage(format!("S{}", i)), None)
                    .expect("stage");
                pack.connect(port(action, PortSlot::OptionOut(i)), port(s, PortSlot::From))
                    .expect("a -> s");
                s
            })
            .collect();
        (pack, cover, action, stages)
    }

    fn scene(step: Step) -> Scene {
        step.playback().expect("moved").scene
    }

    #[test]
    fn cover_ok_enters_first_option() {
        let (pack, _, action, stages) = fan(1);
        let mut player = Player::seeded(&pack, 1);
        player.start();

        let step = player.ok();
        assert_eq!(
            step,
            Step::Moved(Playback {
                scene: Scene::Node(stages[0]),
                context: Some(BranchContext {
                    branch: Branch::Action(action),
                    index: 0
                }),
            })
        );
    }

    #[test]
    fn content_node_enters_itself() {
        let (pack, _, _, stages) = fan(1);
        let mut player = Player::seeded(&pack, 1);
        assert_eq!(
            player.enter(stages[0], PortSlot::From),
            Step::Moved(Playback::at(Scene::Node(stages[0])))
        );
    }

    #[test]
    fn home_without_link_resets_to_entry() {
        let (pack, cover, _, stages) = fan(2);
        let mut player = Player::seeded(&pack, 1);

        player.start();
        assert_eq!(player.home(), Step::Moved(Playback::at(Scene::Node(cover))));

        player.ok();
        assert_eq!(scene(player.wheel_right()), Scene::Node(stages[1]));
        assert_eq!(player.home(), Step::Moved(Playback::at(Scene::Node(cover))));
    }

    #[test]
    fn home_follows_link_when_present() {
        let (mut pack, _, action, stages) = fan(2);
        pack.connect(port(stages[0], PortSlot::Home), port(action, PortSlot::OptionIn(1)))
            .expect("home link");
        let mut player = Player::seeded(&pack, 1);
        player.enter(stages[0], PortSlot::From);
        assert_eq!(scene(player.home()), Scene::Node(stages[1]));
    }

    #[test]
    fn wheel_is_cyclic() {
        let (pack, _, _, stages) = fan(3);
        let mut player = Player::seeded(&pack, 1);
        player.start();
        let origin = player.ok();

        assert_eq!(scene(player.wheel_left()), Scene::Node(stages[2]));
        assert_eq!(scene(player.wheel_right()), Scene::Node(stages[0]));
        for _ in 0..3 {
            player.wheel_right();
        }
        assert_eq!(player.current(), origin.playback());
    }

    #[test]
    fn single_option_wheel_is_noop() {
        let (pack, _, _, _) = fan(1);
        let mut player = Player::seeded(&pack, 1);
        player.start();
        let origin = player.ok();
        assert_eq!(player.wheel_right(), origin);
        assert_eq!(player.wheel_left(), origin);
    }

    #[test]
    fn dangling_option_is_a_dead_end() {
        let (mut pack, _, action, _) = fan(2);
        pack.add_option(action).expect("third option");
        let mut player = Player::seeded(&pack, 1);
        player.start();
        let before = player.ok();
        let step = player.wheel_left();
        assert_eq!(
            step,
            Step::DeadEnd(DeadEnd::MissingDestination(port(
                action,
                PortSlot::OptionOut(2)
            )))
        );
        assert_eq!(player.current(), before.playback());
    }

    #[test]
    fn wheel_needs_context() {
        let (pack, _, _, _) = fan(1);
        let mut player = Player::seeded(&pack, 1);
        assert_eq!(player.ok(), Step::DeadEnd(DeadEnd::NotStarted));
        player.start();
        assert_eq!(player.wheel_right(), Step::DeadEnd(DeadEnd::NoBranchContext));
    }

    #[test]
    fn ok_without_port_is_a_dead_end() {
        let (mut pack, _, _, stages) = fan(1);
        pack.set_control(stages[0], Control::Ok, false).expect("ok off");
        let mut player = Player::seeded(&pack, 1);
        player.enter(stages[0], PortSlot::From);
        assert_eq!(
            player.ok(),
            Step::DeadEnd(DeadEnd::ControlDisabled(Control::Ok))
        );
    }

    #[test]
    fn random_port_is_seeded() {
        let mut pack = Pack::default();
        let cover = pack.add_node(NodeKind::cover("C"), None).expect("cover");
        let action = pack.add_node(NodeKind::action("A", 4), None).expect("a");
        for i in 0..4 {
            let s = pack.add_node(NodeKind::stage("s"), None).expect("s");
            pack.connect(port(action, PortSlot::OptionOut(i)), port(s, PortSlot::From))
                .expect("link");
        }
        pack.connect(port(cover, PortSlot::Ok), port(action, PortSlot::Random))
            .expect("random");

        let picks = |seed| {
            let mut player = Player::seeded(&pack, seed);
            player.start();
            (0..8)
                .map(|_| {
                    let step = player.ok();
                    player.start();
                    step.playback().and_then(|p| p.context).map(|c| c.index)
                })
                .collect::<Vec<_>>()
        };
        let first = picks(42);
        assert_eq!(first, picks(42));
        assert!(first.iter().all(|i| matches!(i, Some(0..=3))));
    }

    #[test]
    fn menu_plays_question_then_options() {
        let mut pack = Pack::default();
        let cover = pack.add_node(NodeKind::cover("C"), None).expect("cover");
        let menu = pack
            .add_node(NodeKind::menu("M", &["red", "blue"]), None)
            .expect("menu");
        let action = pack.add_node(NodeKind::action("A", 1), None).expect("a");
        let after = pack.add_node(NodeKind::stage("after"), None).expect("after");
        pack.set_default_option(menu, 1).expect("default");
        pack.connect(port(cover, PortSlot::Ok), port(menu, PortSlot::From))
            .expect("c -> m");
        pack.connect(port(menu, PortSlot::Option(1)), port(action, PortSlot::OptionIn(0)))
            .expect("blue -> a");
        pack.connect(port(action, PortSlot::OptionOut(0)), port(after, PortSlot::From))
            .expect("a -> after");

        let mut player = Player::seeded(&pack, 7);
        player.start();
        assert_eq!(scene(player.ok()), Scene::MenuQuestion(menu));
        assert_eq!(scene(player.wheel_right()), Scene::MenuQuestion(menu));
        assert_eq!(scene(player.ok()), Scene::MenuOption(menu, 1));
        assert_eq!(scene(player.wheel_right()), Scene::MenuOption(menu, 0));
        assert_eq!(
            player.ok(),
            Step::DeadEnd(DeadEnd::MissingDestination(port(menu, PortSlot::Option(0))))
        );
        assert_eq!(scene(player.wheel_left()), Scene::MenuOption(menu, 1));
        assert_eq!(scene(player.ok()), Scene::Node(after));

        // No predecessor other than the entry: home resets.
        player.follow(Route::first(Branch::MenuQuestion(menu)));
        assert_eq!(scene(player.home()), Scene::Node(cover));
    }

    #[test]
    fn story_defaults_to_entry_route() {
        let (mut pack, _, action, stages) = fan(1);
        let story = pack.add_node(NodeKind::story("tale"), None).expect("story");
        pack.connect(port(stages[0], PortSlot::Ok), port(story, PortSlot::From))
            .expect("s -> story");

        let mut player = Player::seeded(&pack, 1);
        player.enter(stages[0], PortSlot::From);
        let entered = player.ok();
        assert_eq!(
            entered,
            Step::Moved(Playback {
                scene: Scene::Node(story),
                context: Some(BranchContext {
                    branch: Branch::Story(story),
                    index: 0
                }),
            })
        );
        let next = player.ok();
        assert_eq!(
            next.playback().and_then(|p| p.context),
            Some(BranchContext {
                branch: Branch::Action(action),
                index: 0
            })
        );

        pack.set_disable_home(story, true).expect("disable");
        let mut player = Player::seeded(&pack, 1);
        player.enter(story, PortSlot::From);
        assert_eq!(
            player.home(),
            Step::Moved(Playback::at(Scene::Node(pack.entry().expect("entry"))))
        );
    }

    #[test]
    fn home_without_port_resets_to_entry() {
        let (mut pack, cover, _, stages) = fan(1);
        pack.set_control(cover, Control::Home, false).expect("home off");
        pack.set_control(stages[0], Control::Home, false).expect("home off");
        let entry = Step::Moved(Playback::at(Scene::Node(cover)));
        let mut player = Player::seeded(&pack, 1);

        player.start();
        assert_eq!(player.home(), entry);

        player.enter(stages[0], PortSlot::From);
        assert_eq!(player.home(), entry);
    }
}
