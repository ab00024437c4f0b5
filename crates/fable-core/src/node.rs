//! # Node Variants
//!
//! The closed set of node variants an author can place in a pack, and the
//! port table each variant exposes.
//!
//! Primitive kinds:
//! - **Content** (`Stage`, `Cover`, `Story`): plays media and waits for input.
//! - **Branch** (`Action`): routes to the next content node.
//!
//! `Menu` and `Story` are authoring sugar. The compiler expands them into
//! primitive records; the port table makes their inbound port accept links
//! from content ports, as a branch would.

use crate::asset::AssetData;
use crate::primitives::MAX_OPTIONS;
use crate::{Control, Controls, Direction, FableError, NodeId, Port, PortKind, PortSlot, Position};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// CONTENT BLOCKS
// =============================================================================

/// A named block of media: what one stage shows and plays.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Media {
    pub name: String,
    pub image: Option<AssetData>,
    pub audio: Option<AssetData>,
}

impl Media {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            audio: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: AssetData) -> Self {
        self.image = Some(image);
        self
    }

    #[must_use]
    pub fn with_audio(mut self, audio: AssetData) -> Self {
        self.audio = Some(audio);
        self
    }

    /// At least one of image or audio is attached.
    #[must_use]
    pub fn has_assets(&self) -> bool {
        self.image.is_some() || self.audio.is_some()
    }
}

/// Plain stage, also used for covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNode {
    pub media: Media,
    pub controls: Controls,
}

impl StageNode {
    #[must_use]
    pub fn new(media: Media, controls: Controls) -> Self {
        Self { media, controls }
    }
}

/// Override flags of a story node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryFlags {
    pub custom_ok_transition: bool,
    pub custom_home_transition: bool,
    pub disable_home: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryNode {
    pub media: Media,
    pub flags: StoryFlags,
}

impl StoryNode {
    /// Controls are fully determined by the flags.
    #[must_use]
    pub const fn controls(&self) -> Controls {
        Controls {
            wheel: false,
            ok: false,
            home: !self.flags.disable_home,
            pause: true,
            autoplay: true,
        }
    }
}

/// Question block plus N options, each option a content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuNode {
    pub name: String,
    /// Question content. Only the audio is played.
    pub question: Media,
    pub question_controls: Controls,
    pub options: Vec<Media>,
    /// Option picked on "ok"; `-1` picks one at random.
    pub default_option: i32,
}

impl MenuNode {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            question: Media::named(format!("{} question", name)),
            name,
            question_controls: Controls::STAGE_DEFAULT,
            options: Vec::new(),
            default_option: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionNode {
    pub name: String,
    pub option_count: usize,
}

// =============================================================================
// NODE KIND
// =============================================================================

/// Variant tag without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeVariant {
    Stage,
    Cover,
    Story,
    Menu,
    Action,
}

impl fmt::Display for NodeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stage => "stage",
            Self::Cover => "cover",
            Self::Story => "story",
            Self::Menu => "menu",
            Self::Action => "action",
        };
        f.write_str(name)
    }
}

/// A node variant with its authored payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Stage(StageNode),
    Cover(StageNode),
    Story(StoryNode),
    Menu(MenuNode),
    Action(ActionNode),
}

impl NodeKind {
    pub fn stage(name: impl Into<String>) -> Self {
        Self::Stage(StageNode::new(Media::named(name), Controls::STAGE_DEFAULT))
    }

    pub fn cover(name: impl Into<String>) -> Self {
        let controls = Controls::STAGE_DEFAULT
            .with(Control::Wheel, true)
            .with(Control::Ok, true);
        Self::Cover(StageNode::new(Media::named(name), controls))
    }

    pub fn story(name: impl Into<String>) -> Self {
        Self::Story(StoryNode {
            media: Media::named(name),
            flags: StoryFlags::default(),
        })
    }

    /// Menu with one named option per entry of `options`.
    pub fn menu(name: impl Into<String>, options: &[&str]) -> Self {
        let mut menu = MenuNode::new(name);
        menu.options = options.iter().map(|option| Media::named(*option)).collect();
        Self::Menu(menu)
    }

    pub fn action(name: impl Into<String>, option_count: usize) -> Self {
        Self::Action(ActionNode {
            name: name.into(),
            option_count,
        })
    }

    #[must_use]
    pub const fn variant(&self) -> NodeVariant {
        match self {
            Self::Stage(_) => NodeVariant::Stage,
            Self::Cover(_) => NodeVariant::Cover,
            Self::Story(_) => NodeVariant::Story,
            Self::Menu(_) => NodeVariant::Menu,
            Self::Action(_) => NodeVariant::Action,
        }
    }

    /// Content for the stage family and menus, branch for actions.
    #[must_use]
    pub const fn primitive_kind(&self) -> PortKind {
        match self {
            Self::Action(_) => PortKind::Branch,
            _ => PortKind::Content,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Stage(stage) | Self::Cover(stage) => &stage.media.name,
            Self::Story(story) => &story.media.name,
            Self::Menu(menu) => &menu.name,
            Self::Action(action) => &action.name,
        }
    }

    /// Effective controls, with forced bits applied.
    ///
    /// For a menu these are the question controls. Actions have none.
    #[must_use]
    pub fn controls(&self) -> Option<Controls> {
        match self {
            Self::Stage(stage) => Some(stage.controls),
            Self::Cover(cover) => Some(
                cover
                    .controls
                    .with(Control::Wheel, true)
                    .with(Control::Ok, true),
            ),
            Self::Story(story) => Some(story.controls()),
            Self::Menu(menu) => Some(menu.question_controls),
            Self::Action(_) => None,
        }
    }

    /// Media block of the stage family.
    #[must_use]
    pub fn media(&self) -> Option<&Media> {
        match self {
            Self::Stage(stage) | Self::Cover(stage) => Some(&stage.media),
            Self::Story(story) => Some(&story.media),
            Self::Menu(_) | Self::Action(_) => None,
        }
    }

    pub(crate) fn media_mut(&mut self) -> Option<&mut Media> {
        match self {
            Self::Stage(stage) | Self::Cover(stage) => Some(&mut stage.media),
            Self::Story(story) => Some(&mut story.media),
            Self::Menu(_) | Self::Action(_) => None,
        }
    }

    /// Number of options of an action or menu; zero otherwise.
    #[must_use]
    pub fn option_count(&self) -> usize {
        match self {
            Self::Menu(menu) => menu.options.len(),
            Self::Action(action) => action.option_count,
            _ => 0,
        }
    }

    /// Every asset attached to this node.
    #[must_use]
    pub fn assets(&self) -> Vec<&AssetData> {
        let mut assets = Vec::new();
        match self {
            Self::Stage(stage) | Self::Cover(stage) => collect_media(&mut assets, &stage.media, true),
            Self::Story(story) => collect_media(&mut assets, &story.media, true),
            Self::Menu(menu) => {
                collect_media(&mut assets, &menu.question, false);
                for option in &menu.options {
                    collect_media(&mut assets, option, true);
                }
            }
            Self::Action(_) => {}
        }
        assets
    }

    /// Look up one port, or `None` if this node does not expose it.
    #[must_use]
    pub fn port(&self, slot: PortSlot, is_entry: bool) -> Option<Port> {
        use Direction::{Inbound, Outbound};
        use PortKind::{Branch, Content};

        let controls = self.controls().unwrap_or_default();
        let (kind, direction) = match (self, slot) {
            (Self::Stage(_), PortSlot::From) if !is_entry => (Content, Inbound),
            (Self::Stage(_) | Self::Cover(_), PortSlot::Ok) if controls.leaves_on_ok() => {
                (Content, Outbound)
            }
            (Self::Stage(_) | Self::Cover(_), PortSlot::Home) if controls.home => {
                (Content, Outbound)
            }
            (Self::Story(_) | Self::Menu(_), PortSlot::From) => (Branch, Inbound),
            (Self::Story(story), PortSlot::Ok) if story.flags.custom_ok_transition => {
                (Content, Outbound)
            }
            (Self::Story(story), PortSlot::Home)
                if story.flags.custom_home_transition && !story.flags.disable_home =>
            {
                (Content, Outbound)
            }
            (Self::Menu(menu), PortSlot::Option(i)) if i < menu.options.len() => {
                (Content, Outbound)
            }
            (Self::Action(action), PortSlot::OptionIn(i)) if i < action.option_count => {
                (Branch, Inbound)
            }
            (Self::Action(action), PortSlot::OptionOut(i)) if i < action.option_count => {
                (Branch, Outbound)
            }
            (Self::Action(_), PortSlot::Random) => (Branch, Inbound),
            _ => return None,
        };
        Some(Port {
            slot,
            kind,
            direction,
        })
    }

    /// All ports this node currently exposes, in a stable order.
    #[must_use]
    pub fn ports(&self, is_entry: bool) -> Vec<Port> {
        let mut slots = vec![PortSlot::From, PortSlot::Ok, PortSlot::Home];
        match self {
            Self::Menu(menu) => slots.extend((0..menu.options.len()).map(PortSlot::Option)),
            Self::Action(action) => {
                for i in 0..action.option_count {
                    slots.push(PortSlot::OptionIn(i));
                    slots.push(PortSlot::OptionOut(i));
                }
                slots.push(PortSlot::Random);
            }
            _ => {}
        }
        slots
            .into_iter()
            .filter_map(|slot| self.port(slot, is_entry))
            .collect()
    }

    /// Check the payload's internal consistency.
    pub(crate) fn validate(&self, id: NodeId) -> Result<(), FableError> {
        let count = self.option_count();
        if count > MAX_OPTIONS {
            return Err(FableError::OptionOutOfRange {
                node: id,
                index: count as i64,
            });
        }
        if let Self::Menu(menu) = self {
            let default = i64::from(menu.default_option);
            if default < -1 || (default >= 0 && default as usize >= count.max(1)) {
                return Err(FableError::OptionOutOfRange {
                    node: id,
                    index: default,
                });
            }
        }
        Ok(())
    }

    /// Apply forced controls so the stored payload matches the effective one.
    pub(crate) fn normalize(&mut self) {
        if let Self::Cover(cover) = self {
            cover.controls.wheel = true;
            cover.controls.ok = true;
        }
    }
}

fn collect_media<'a>(assets: &mut Vec<&'a AssetData>, media: &'a Media, include_image: bool) {
    if include_image {
        assets.extend(media.image.as_ref());
    }
    assets.extend(media.audio.as_ref());
}

// =============================================================================
// NODE
// =============================================================================

/// A node placed in a pack.
///
/// `id` is graph-local; `uuid` is the stable business identity written into
/// archives. Both are assigned by the pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub uuid: Uuid,
    pub position: Option<Position>,
    pub kind: NodeKind,
}

impl Node {
    #[must_use]
    pub const fn variant(&self) -> NodeVariant {
        self.kind.variant()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.kind.name()
    }
}

// =============================================================================
// TESTS
// =============================================================================
