//! # Compiler
//!
//! Authoring graph → `CompiledPack`.
//!
//! Two phases:
//! 1. **Hash**: every asset of every node (and the thumbnail) goes into the
//!    `AssetStore`. Any unsupported asset aborts here, before a single
//!    record exists.
//! 2. **Assemble**: nodes are visited in insertion order and turned into
//!    stage and action records. Menus and stories expand into synthetic
//!    records whose ids are UUIDv5 names under the composite's uuid, so an
//!    unchanged graph always compiles to the same manifest.
//!
//! The entry stage record is moved to the front of `stageNodes`.

use crate::archive::{ActionRecord, CompiledPack, StageRecord, StoryManifest, Transition};
use crate::asset::{AssetData, AssetStore, MediaType};
use crate::graph::Pack;
use crate::node::{Media, Node, NodeKind};
use crate::primitives::{ARCHIVE_FORMAT, RANDOM_OPTION_INDEX, roles};
use crate::route::{Branch, Route, Selector};
use crate::{Controls, FableError, NodeId, PortRef, PortSlot};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which asset of a node a stored file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MediaSlot {
    Image,
    Audio,
    QuestionAudio,
    OptionImage(usize),
    OptionAudio(usize),
}

/// Compile a pack into records and deduplicated assets.
pub fn compile(pack: &Pack) -> Result<CompiledPack, FableError> {
    Compiler::new(pack).compile()
}

/// Compile a pack straight to archive bytes.
pub fn compile_to_bytes(pack: &Pack) -> Result<Vec<u8>, FableError> {
    compile(pack)?.to_archive_bytes()
}

/// UUIDv5 id of a synthetic record owned by a composite node.
#[must_use]
pub fn synthetic_id(owner: Uuid, role: &str) -> Uuid {
    Uuid::new_v5(&owner, role.as_bytes())
}

fn option_stage_role(index: usize) -> String {
    format!("{}.{}", roles::MENU_OPTION_STAGE, index)
}

/// Single-use compilation context.
pub struct Compiler<'p> {
    pack: &'p Pack,
    assets: AssetStore,
    files: BTreeMap<(NodeId, MediaSlot), String>,
    stage_nodes: Vec<StageRecord>,
    action_nodes: Vec<ActionRecord>,
}

impl<'p> Compiler<'p> {
    #[must_use]
    pub fn new(pack: &'p Pack) -> Self {
        Self {
            pack,
            assets: AssetStore::new(),
            files: BTreeMap::new(),
            stage_nodes: Vec::new(),
            action_nodes: Vec::new(),
        }
    }

    pub fn compile(mut self) -> Result<CompiledPack, FableError> {
        let pack = self.pack;
        let entry = pack.entry_node().ok_or(FableError::MissingEntry)?;
        let entry_uuid = entry.uuid.to_string();

        // Phase 1: every asset is hashed before any record is built.
        for node in pack.nodes() {
            self.hash_node_assets(node)?;
        }
        let thumbnail = match &pack.info.thumbnail {
            Some(thumbnail) => Some(Self::thumbnail_bytes(thumbnail)?),
            None => None,
        };
        debug!(assets = self.assets.len(), "assets hashed");

        // Phase 2: records.
        for node in pack.nodes() {
            match &node.kind {
                NodeKind::Stage(stage) | NodeKind::Cover(stage) => {
                    let record = self.stage_record(node, &stage.media);
                    self.stage_nodes.push(record);
                }
                NodeKind::Story(_) => self.expand_story(node),
                NodeKind::Menu(_) => self.expand_menu(node),
                NodeKind::Action(action) => {
                    let record = self.action_record(node, action.option_count);
                    self.action_nodes.push(record);
                }
            }
        }

        if let Some(index) = self
            .stage_nodes
            .iter()
            .position(|record| record.uuid == entry_uuid)
        {
            let record = self.stage_nodes.remove(index);
            self.stage_nodes.insert(0, record);
        }

        info!(
            title = %pack.info.title,
            stages = self.stage_nodes.len(),
            actions = self.action_nodes.len(),
            assets = self.assets.len(),
            "pack compiled"
        );

        Ok(CompiledPack {
            manifest: StoryManifest {
                format: ARCHIVE_FORMAT.to_string(),
                title: pack.info.title.clone(),
                version: pack.info.version,
                description: pack.info.description.clone(),
                night_mode_available: pack.info.night_mode_available,
                stage_nodes: self.stage_nodes,
                action_nodes: self.action_nodes,
            },
            assets: self.assets,
            thumbnail,
        })
    }

    // -------------------------------------------------------------------------
    // PHASE 1: HASHING
    // -------------------------------------------------------------------------

    fn hash_node_assets(&mut self, node: &Node) -> Result<(), FableError> {
        let mut slots: Vec<(MediaSlot, &AssetData)> = Vec::new();
        match &node.kind {
            NodeKind::Stage(stage) | NodeKind::Cover(stage) => {
                push_media(&mut slots, &stage.media, MediaSlot::Image, MediaSlot::Audio);
            }
            NodeKind::Story(story) => {
                push_media(&mut slots, &story.media, MediaSlot::Image, MediaSlot::Audio);
            }
            NodeKind::Menu(menu) => {
                slots.extend(menu.question.audio.as_ref().map(|a| (MediaSlot::QuestionAudio, a)));
                for (i, option) in menu.options.iter().enumerate() {
                    push_media(
                        &mut slots,
                        option,
                        MediaSlot::OptionImage(i),
                        MediaSlot::OptionAudio(i),
                    );
                }
            }
            NodeKind::Action(_) => {}
        }
        for (slot, asset) in slots {
            let file = self
                .assets
                .insert(asset)
                .inspect_err(|e| warn!(node = %node.id, error = %e, "asset rejected"))?;
            self.files.insert((node.id, slot), file);
        }
        Ok(())
    }

    fn thumbnail_bytes(thumbnail: &AssetData) -> Result<Vec<u8>, FableError> {
        match thumbnail.media_type()? {
            MediaType::Png => Ok(thumbnail.bytes.clone()),
            other => Err(FableError::UnsupportedMediaType(format!(
                "thumbnail must be image/png, got {}",
                other
            ))),
        }
    }

    fn file(&self, node: NodeId, slot: MediaSlot) -> Option<String> {
        self.files.get(&(node, slot)).cloned()
    }

    // -------------------------------------------------------------------------
    // PHASE 2: RECORDS
    // -------------------------------------------------------------------------

    /// Archive id of the action record a branch compiles to.
    fn branch_id(&self, branch: Branch) -> Option<String> {
        let owner = self.pack.node(branch.node())?.uuid;
        let id = match branch {
            Branch::Action(_) => owner,
            Branch::MenuQuestion(_) => synthetic_id(owner, roles::MENU_QUESTION_ACTION),
            Branch::MenuOptions(_) => synthetic_id(owner, roles::MENU_OPTIONS_ACTION),
            Branch::Story(_) => synthetic_id(owner, roles::STORY_ACTION),
        };
        Some(id.to_string())
    }

    fn transition(&self, route: Option<Route>) -> Option<Transition> {
        let route = route?;
        let option_index = match route.selector {
            Selector::Index(i) => i as i32,
            Selector::Random => RANDOM_OPTION_INDEX,
        };
        Some(Transition {
            action_node: self.branch_id(route.branch)?,
            option_index,
        })
    }

    /// Transition through the link on an outbound port, if the port exists.
    fn port_transition(&self, node: NodeId, slot: PortSlot) -> Option<Transition> {
        let port = PortRef::new(node, slot);
        self.pack.port(port)?;
        self.transition(self.pack.route_from(port))
    }

    fn stage_record(&self, node: &Node, media: &Media) -> StageRecord {
        let record_type = match node.kind {
            NodeKind::Cover(_) => roles::COVER,
            _ => roles::STAGE,
        };
        StageRecord {
            uuid: node.uuid.to_string(),
            record_type: record_type.to_string(),
            group_id: None,
            name: media.name.clone(),
            position: node.position,
            image: self.file(node.id, MediaSlot::Image),
            audio: self.file(node.id, MediaSlot::Audio),
            ok_transition: self.port_transition(node.id, PortSlot::Ok),
            home_transition: self.port_transition(node.id, PortSlot::Home),
            control_settings: node.kind.controls().unwrap_or_default(),
            square_one: self.pack.is_entry(node.id),
        }
    }

    fn action_record(&self, node: &Node, option_count: usize) -> ActionRecord {
        let options = (0..option_count)
            .map(|i| {
                self.pack
                    .option_target(node.id, i)
                    .and_then(|target| self.pack.node(target))
                    .map(|target| target.uuid.to_string())
            })
            .collect();
        ActionRecord {
            id: node.uuid.to_string(),
            record_type: roles::ACTION.to_string(),
            group_id: None,
            name: node.name().to_string(),
            position: node.position,
            options,
        }
    }

    fn expand_story(&mut self, node: &Node) {
        let NodeKind::Story(story) = &node.kind else {
            return;
        };
        let group = Some(node.uuid.to_string());
        let action_id = synthetic_id(node.uuid, roles::STORY_ACTION);
        let fallback = self.transition(self.pack.entry_route());

        let ok_transition = if story.flags.custom_ok_transition {
            self.port_transition(node.id, PortSlot::Ok)
        } else {
            fallback.clone()
        };
        let home_transition = if story.flags.disable_home {
            None
        } else if story.flags.custom_home_transition {
            self.port_transition(node.id, PortSlot::Home)
        } else {
            fallback
        };

        debug!(node = %node.id, "story expanded");
        self.stage_nodes.push(StageRecord {
            uuid: node.uuid.to_string(),
            record_type: roles::STORY.to_string(),
            group_id: group.clone(),
            name: story.media.name.clone(),
            position: node.position,
            image: self.file(node.id, MediaSlot::Image),
            audio: self.file(node.id, MediaSlot::Audio),
            ok_transition,
            home_transition,
            control_settings: story.controls(),
            square_one: false,
        });
        self.action_nodes.push(ActionRecord {
            id: action_id.to_string(),
            record_type: roles::STORY_ACTION.to_string(),
            group_id: group,
            name: story.media.name.clone(),
            position: None,
            options: vec![Some(node.uuid.to_string())],
        });
    }

    fn expand_menu(&mut self, node: &Node) {
        let NodeKind::Menu(menu) = &node.kind else {
            return;
        };
        let group = Some(node.uuid.to_string());
        let question_stage = synthetic_id(node.uuid, roles::MENU_QUESTION_STAGE).to_string();
        let question_action = synthetic_id(node.uuid, roles::MENU_QUESTION_ACTION).to_string();
        let options_action = synthetic_id(node.uuid, roles::MENU_OPTIONS_ACTION).to_string();
        let option_stages: Vec<String> = (0..menu.options.len())
            .map(|i| synthetic_id(node.uuid, &option_stage_role(i)).to_string())
            .collect();

        let home_transition = self.transition(self.pack.menu_home_route(node.id));
        if home_transition.is_none() {
            warn!(
                node = %node.id,
                menu = %menu.name,
                "menu home predecessor unresolved, home transition left empty"
            );
        }

        self.action_nodes.push(ActionRecord {
            id: question_action,
            record_type: roles::MENU_QUESTION_ACTION.to_string(),
            group_id: group.clone(),
            name: menu.name.clone(),
            position: None,
            options: vec![Some(question_stage.clone())],
        });
        self.stage_nodes.push(StageRecord {
            uuid: question_stage,
            record_type: roles::MENU_QUESTION_STAGE.to_string(),
            group_id: group.clone(),
            name: menu.question.name.clone(),
            position: node.position,
            image: None,
            audio: self.file(node.id, MediaSlot::QuestionAudio),
            ok_transition: (!menu.options.is_empty()).then(|| Transition {
                action_node: options_action.clone(),
                option_index: menu.default_option,
            }),
            home_transition: home_transition.clone(),
            control_settings: menu.question_controls,
            square_one: false,
        });

        for (i, (option, uuid)) in menu.options.iter().zip(&option_stages).enumerate() {
            self.stage_nodes.push(StageRecord {
                uuid: uuid.clone(),
                record_type: roles::MENU_OPTION_STAGE.to_string(),
                group_id: group.clone(),
                name: option.name.clone(),
                position: None,
                image: self.file(node.id, MediaSlot::OptionImage(i)),
                audio: self.file(node.id, MediaSlot::OptionAudio(i)),
                ok_transition: self.port_transition(node.id, PortSlot::Option(i)),
                home_transition: home_transition.clone(),
                control_settings: Controls::MENU_OPTION,
                square_one: false,
            });
        }

        self.action_nodes.push(ActionRecord {
            id: options_action,
            record_type: roles::MENU_OPTIONS_ACTION.to_string(),
            group_id: group,
            name: menu.name.clone(),
            position: None,
            options: option_stages.into_iter().map(Some).collect(),
        });
        debug!(node = %node.id, options = menu.options.len(), "menu expanded");
    }
}

fn push_media<'a>(
    slots: &mut Vec<(MediaSlot, &'a AssetData)>,
    media: &'a Media,
    image: MediaSlot,
    audio: MediaSlot,
) {
    slots.extend(media.image.as_ref().map(|asset| (image, asset)));
    slots.extend(media.audio.as_ref().map(|asset| (audio, asset)));
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PackInfo;
    use crate::{Control, PortRef};

    fn port(node: NodeId, slot: PortSlot) -> PortRef {
        PortRef::new(node, slot)
    }

    fn png(bytes: &[u8]) -> AssetData {
        AssetData::new("image/png", bytes.to_vec())
    }

    /// Cover -> action(1) -> stage.
    fn simple_pack() -> (Pack, NodeId, NodeId, NodeId) {
        let mut pack = Pack::new(PackInfo {
            title: "Simple".to_string(),
            ..PackInfo::default()
        });
        let s1 = pack.add_node(NodeKind::stage("S1"), None).expect("s1");
        let cover = pack.add_node(NodeKind::cover("C"), None).expect("cover");
        let a = pack.add_node(NodeKind::action("A", 1), None).expect("a");
        pack.connect(port(cover, PortSlot::Ok), port(a, PortSlot::OptionIn(0)))
            .expect("c -> a");
        pack.connect(port(a, PortSlot::OptionOut(0)), port(s1, PortSlot::From))
            .expect("a -> s1");
        (pack, cover, a, s1)
    }

    #[test]
    fn entry_record_comes_first() {
        let (pack, cover, _, _) = simple_pack();
        let compiled = compile(&pack).expect("compile");
        let first = &compiled.manifest.stage_nodes[0];
        assert_eq!(first.uuid, pack.node(cover).expect("cover").uuid.to_string());
        assert!(first.square_one);
        assert_eq!(first.record_type, roles::COVER);
        assert_eq!(compiled.manifest.stage_nodes.iter().filter(|s| s.square_one).count(), 1);
    }

    #[test]
    fn primitive_transitions_resolve() {
        let (pack, cover, a, s1) = simple_pack();
        let compiled = compile(&pack).expect("compile");
        let manifest = &compiled.manifest;
        let a_uuid = pack.node(a).expect("a").uuid.to_string();

        let cover_record = manifest
            .stage(&pack.node(cover).expect("cover").uuid.to_string())
            .expect("cover record");
        assert_eq!(
            cover_record.ok_transition,
            Some(Transition {
                action_node: a_uuid.clone(),
                option_index: 0
            })
        );
        assert_eq!(cover_record.home_transition, None);

        let action = manifest.action(&a_uuid).expect("action record");
        assert_eq!(
            action.options,
            vec![Some(pack.node(s1).expect("s1").uuid.to_string())]
        );
    }

    #[test]
    fn missing_entry_aborts() {
        let mut pack = Pack::default();
        pack.add_node(NodeKind::stage("s"), None).expect("s");
        assert!(matches!(compile(&pack), Err(FableError::MissingEntry)));
    }

    #[test]
    fn unsupported_asset_aborts() {
        let (mut pack, _, _, s1) = simple_pack();
        pack.media_mut(s1).expect("media").image = Some(AssetData::new("image/gif", vec![1]));
        assert!(matches!(
            compile(&pack),
            Err(FableError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn identical_images_are_stored_once() {
        let (mut pack, cover, _, s1) = simple_pack();
        pack.media_mut(cover).expect("cover").image = Some(png(&[7, 7, 7]));
        pack.media_mut(s1).expect("s1").image = Some(png(&[7, 7, 7]));

        let compiled = compile(&pack).expect("compile");
        assert_eq!(compiled.assets.len(), 1);
        let images: Vec<_> = compiled
            .manifest
            .stage_nodes
            .iter()
            .map(|s| s.image.clone())
            .collect();
        assert_eq!(images[0], images[1]);
    }

    #[test]
    fn random_port_compiles_to_minus_one() {
        let mut pack = Pack::default();
        let cover = pack.add_node(NodeKind::cover("C"), None).expect("cover");
        let a = pack.add_node(NodeKind::action("A", 2), None).expect("a");
        pack.connect(port(cover, PortSlot::Ok), port(a, PortSlot::Random))
            .expect("random");

        let compiled = compile(&pack).expect("compile");
        let ok = compiled.manifest.stage_nodes[0]
            .ok_transition
            .clone()
            .expect("ok transition");
        assert_eq!(ok.option_index, RANDOM_OPTION_INDEX);
        let action = &compiled.manifest.action_nodes[0];
        assert_eq!(action.options, vec![None, None]);
    }

    #[test]
    fn menu_expansion() {
        let mut pack = Pack::default();
        let cover = pack.add_node(NodeKind::cover("C"), None).expect("cover");
        let menu = pack
            .add_node(NodeKind::menu("Colors", &["red", "blue"]), None)
            .expect("menu");
        pack.set_default_option(menu, 1).expect("default");
        pack.connect(port(cover, PortSlot::Ok), port(menu, PortSlot::From))
            .expect("c -> menu");
        let menu_uuid = pack.node(menu).expect("menu").uuid;

        let compiled = compile(&pack).expect("compile");
        let manifest = &compiled.manifest;
        assert_eq!(manifest.stage_nodes.len(), 4);
        assert_eq!(manifest.action_nodes.len(), 2);

        let question_action = synthetic_id(menu_uuid, roles::MENU_QUESTION_ACTION).to_string();
        let options_action = synthetic_id(menu_uuid, roles::MENU_OPTIONS_ACTION).to_string();
        let question_stage = synthetic_id(menu_uuid, roles::MENU_QUESTION_STAGE).to_string();

        let cover_ok = manifest.stage_nodes[0].ok_transition.clone().expect("cover ok");
        assert_eq!(cover_ok.action_node, question_action);
        assert_eq!(cover_ok.option_index, 0);

        let question = manifest.stage(&question_stage).expect("question stage");
        let question_ok = question.ok_transition.clone().expect("question ok");
        assert_eq!(question_ok.action_node, options_action);
        assert_eq!(question_ok.option_index, 1);

        let options = manifest.action(&options_action).expect("options action");
        let expected: Vec<Option<String>> = (0..2)
            .map(|i| Some(synthetic_id(menu_uuid, &option_stage_role(i)).to_string()))
            .collect();
        assert_eq!(options.options, expected);
        let red = manifest
            .stage(expected[0].as_deref().expect("red uuid"))
            .expect("red stage");
        assert_eq!(red.name, "red");
        assert_eq!(red.group_id, Some(menu_uuid.to_string()));

        // Reached straight from the cover: no predecessor to go home to.
        assert_eq!(question.home_transition, None);
    }

    #[test]
    fn empty_menu_question_leads_nowhere() {
        let mut pack = Pack::default();
        let cover = pack.add_node(NodeKind::cover("C"), None).expect("cover");
        let menu = pack.add_node(NodeKind::menu("M", &[]), None).expect("menu");
        pack.connect(port(cover, PortSlot::Ok), port(menu, PortSlot::From))
            .expect("c -> menu");
        let menu_uuid = pack.node(menu).expect("menu").uuid;

        let compiled = compile(&pack).expect("compile");
        let question_stage = synthetic_id(menu_uuid, roles::MENU_QUESTION_STAGE).to_string();
        let question = compiled.manifest.stage(&question_stage).expect("question stage");
        assert_eq!(question.ok_transition, None);

        let options_action = synthetic_id(menu_uuid, roles::MENU_OPTIONS_ACTION).to_string();
        let options = compiled.manifest.action(&options_action).expect("options action");
        assert!(options.options.is_empty());
    }

    #[test]
    fn menu_home_rebuilds_predecessor_transition() {
        let (mut pack, _, a, s1) = simple_pack();
        let menu = pack
            .add_node(NodeKind::menu("M", &["x"]), None)
            .expect("menu");
        pack.connect(port(s1, PortSlot::Ok), port(menu, PortSlot::From))
            .expect("s1 -> menu");

        let compiled = compile(&pack).expect("compile");
        let option_uuid =
            synthetic_id(pack.node(menu).expect("menu").uuid, &option_stage_role(0)).to_string();
        let option = compiled.manifest.stage(&option_uuid).expect("option stage");
        assert_eq!(
            option.home_transition,
            Some(Transition {
                action_node: pack.node(a).expect("a").uuid.to_string(),
                option_index: 0
            })
        );
    }

    #[test]
    fn story_expansion_and_defaults() {
        let (mut pack, _, a, s1) = simple_pack();
        let story = pack.add_node(NodeKind::story("Tale"), None).expect("story");
        pack.set_control(s1, Control::Ok, true).expect("ok");
        pack.connect(port(s1, PortSlot::Ok), port(story, PortSlot::From))
            .expect("s1 -> story");
        let story_uuid = pack.node(story).expect("story").uuid;

        let compiled = compile(&pack).expect("compile");
        let manifest = &compiled.manifest;
        let story_action = synthetic_id(story_uuid, roles::STORY_ACTION).to_string();

        let s1_record = manifest
            .stage(&pack.node(s1).expect("s1").uuid.to_string())
            .expect("s1 record");
        assert_eq!(
            s1_record.ok_transition,
            Some(Transition {
                action_node: story_action.clone(),
                option_index: 0
            })
        );

        let action = manifest.action(&story_action).expect("story action");
        assert_eq!(action.options, vec![Some(story_uuid.to_string())]);

        let record = manifest.stage(&story_uuid.to_string()).expect("story record");
        let entry_ok = Some(Transition {
            action_node: pack.node(a).expect("a").uuid.to_string(),
            option_index: 0,
        });
        assert_eq!(record.ok_transition, entry_ok);
        assert_eq!(record.home_transition, entry_ok);
        assert!(record.control_settings.autoplay);

        pack.set_disable_home(story, true).expect("disable home");
        let compiled = compile(&pack).expect("recompile");
        let record = compiled
            .manifest
            .stage(&story_uuid.to_string())
            .expect("story record");
        assert_eq!(record.home_transition, None);
        assert!(!record.control_settings.home);
    }

    #[test]
    fn recompiling_is_byte_identical() {
        let (mut pack, cover, _, _) = simple_pack();
        pack.media_mut(cover).expect("cover").audio =
            Some(AssetData::new("audio/mpeg", vec![1, 2, 3, 4]));
        pack.add_node(NodeKind::menu("M", &["a", "b"]), None)
            .expect("menu");

        let first = compile_to_bytes(&pack).expect("first");
        let second = compile_to_bytes(&pack).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn thumbnail_must_be_png() {
        let (mut pack, _, _, _) = simple_pack();
        pack.info.thumbnail = Some(AssetData::new("image/jpeg", vec![1]));
        assert!(compile(&pack).is_err());

        pack.info.thumbnail = Some(png(&[1, 2]));
        let compiled = compile(&pack).expect("compile");
        assert_eq!(compiled.thumbnail, Some(vec![1, 2]));
    }
}
