//! # Validation
//!
//! Composition checks run before compiling. Nothing here blocks
//! compilation: an incomplete pack still compiles, the report only says
//! what the device would trip over.
//!
//! Issues are collected per node in a `BTreeMap`, so reports list nodes
//! in id order and two runs over the same pack are identical.

use crate::graph::Pack;
use crate::node::{Media, Node, NodeKind};
use crate::route::{Branch, Route, Selector};
use crate::{NodeId, PortRef, PortSlot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Everything the validator knows how to complain about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    NoEntry,
    MissingAssets,
    UnlinkedOk,
    UnlinkedHome,
    NoOptions,
    DanglingOption(usize),
    OptionMissingAssets(usize),
    QuestionWithoutAudio,
    UnresolvedMenuHome,
    SelfLoopTransition(PortSlot),
}

impl IssueKind {
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::UnlinkedHome | Self::QuestionWithoutAudio | Self::UnresolvedMenuHome => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEntry => write!(f, "pack has no entry node"),
            Self::MissingAssets => write!(f, "node has neither image nor audio"),
            Self::UnlinkedOk => write!(f, "ok transition is not linked"),
            Self::UnlinkedHome => write!(f, "home transition is not linked, falls back to entry"),
            Self::NoOptions => write!(f, "node has no options"),
            Self::DanglingOption(i) => write!(f, "option {} leads nowhere", i),
            Self::OptionMissingAssets(i) => write!(f, "option {} has neither image nor audio", i),
            Self::QuestionWithoutAudio => write!(f, "menu question has no audio"),
            Self::UnresolvedMenuHome => {
                write!(f, "home cannot be resolved from the menu's predecessor")
            }
            Self::SelfLoopTransition(slot) => {
                write!(f, "{} transition leads straight back to this node", slot)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
}

impl From<IssueKind> for Issue {
    fn from(kind: IssueKind) -> Self {
        Self {
            severity: kind.severity(),
            kind,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.kind)
    }
}

/// Pack-level issues plus a per-node issue map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub pack_issues: Vec<Issue>,
    pub node_issues: BTreeMap<NodeId, Vec<Issue>>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.pack_issues.is_empty() && self.node_issues.is_empty()
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.pack_issues
            .iter()
            .chain(self.node_issues.values().flatten())
            .filter(|issue| issue.severity == severity)
            .count()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    #[must_use]
    pub fn issues_for(&self, id: NodeId) -> &[Issue] {
        self.node_issues.get(&id).map_or(&[], Vec::as_slice)
    }

    fn push(&mut self, id: NodeId, kind: IssueKind) {
        self.node_issues.entry(id).or_default().push(kind.into());
    }
}

/// Check every node of the pack.
#[must_use]
pub fn validate(pack: &Pack) -> ValidationReport {
    let mut report = ValidationReport::default();
    if pack.entry().is_none() {
        report.pack_issues.push(IssueKind::NoEntry.into());
    }
    for node in pack.nodes() {
        check_node(pack, node, &mut report);
    }
    report
}

fn check_node(pack: &Pack, node: &Node, report: &mut ValidationReport) {
    let id = node.id;
    match &node.kind {
        NodeKind::Stage(stage) | NodeKind::Cover(stage) => {
            if !stage.media.has_assets() {
                report.push(id, IssueKind::MissingAssets);
            }
            check_transitions(pack, id, report);
        }
        NodeKind::Story(story) => {
            if !story.media.has_assets() {
                report.push(id, IssueKind::MissingAssets);
            }
            check_transitions(pack, id, report);
        }
        NodeKind::Action(action) => {
            if action.option_count == 0 {
                report.push(id, IssueKind::NoOptions);
            }
            for i in 0..action.option_count {
                if pack.option_target(id, i).is_none() {
                    report.push(id, IssueKind::DanglingOption(i));
                }
            }
        }
        NodeKind::Menu(menu) => {
            if menu.options.is_empty() {
                report.push(id, IssueKind::NoOptions);
            }
            if menu.question.audio.is_none() {
                report.push(id, IssueKind::QuestionWithoutAudio);
            }
            for (i, option) in menu.options.iter().enumerate() {
                if pack
                    .outbound_link(PortRef::new(id, PortSlot::Option(i)))
                    .is_none()
                {
                    report.push(id, IssueKind::DanglingOption(i));
                }
                if !Media::has_assets(option) {
                    report.push(id, IssueKind::OptionMissingAssets(i));
                }
            }
            if pack.menu_home_route(id).is_none() {
                report.push(id, IssueKind::UnresolvedMenuHome);
            }
        }
    }
}

/// Ok and home ports of a content node: linked, and not looping back.
fn check_transitions(pack: &Pack, id: NodeId, report: &mut ValidationReport) {
    for (slot, missing) in [
        (PortSlot::Ok, IssueKind::UnlinkedOk),
        (PortSlot::Home, IssueKind::UnlinkedHome),
    ] {
        let port = PortRef::new(id, slot);
        if pack.port(port).is_none() {
            continue;
        }
        let Some(link) = pack.outbound_link(port) else {
            report.push(id, missing);
            continue;
        };
        let loops = pack
            .route_into(link.inbound())
            .is_some_and(|route| loops_back(pack, route, id));
        if loops {
            report.push(id, IssueKind::SelfLoopTransition(slot));
        }
    }
}

/// True when every option the route can select lands on `origin`.
fn loops_back(pack: &Pack, route: Route, origin: NodeId) -> bool {
    let Branch::Action(action) = route.branch else {
        return false;
    };
    match route.selector {
        Selector::Index(i) => pack.option_target(action, i) == Some(origin),
        Selector::Random => {
            let width = pack.branch_width(route.branch).unwrap_or(0);
            width > 0 && (0..width).all(|i| pack.option_target(action, i) == Some(origin))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
