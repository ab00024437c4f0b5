//! # Decompiler
//!
//! Portable archive → authoring graph.
//!
//! Only primitive nodes come back: every stage record becomes a `Stage` and
//! every action record an `Action`. Menu and story sugar is not rebuilt, so
//! a composite pack does not survive a round trip in its authored shape;
//! after one round `compile ∘ decompile` is a fixed point.
//!
//! Any reference to an unknown record fails the whole decompile. A
//! transition the rebuilt graph cannot carry (the stage has no such port,
//! or the target is the entry stage) is skipped with a warning.

use crate::archive::{CompiledPack, StageRecord, StoryManifest};
use crate::asset::{AssetData, MediaType};
use crate::graph::{Pack, PackInfo};
use crate::layout::{LayoutConfig, apply_layout};
use crate::node::{Media, NodeKind, StageNode};
use crate::primitives::{MAX_OPTIONS, RANDOM_OPTION_INDEX};
use crate::{FableError, NodeId, PortRef, PortSlot};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Decompile archive bytes with the default layout grid.
pub fn decompile(bytes: &[u8]) -> Result<Pack, FableError> {
    decompile_with_layout(bytes, &LayoutConfig::default())
}

/// Decompile archive bytes, laying out the graph if positions are missing.
pub fn decompile_with_layout(bytes: &[u8], layout: &LayoutConfig) -> Result<Pack, FableError> {
    let compiled = CompiledPack::from_archive_bytes(bytes)?;
    from_compiled(&compiled, layout)
}

/// Node uuid for a record id. Ids that are not UUIDs map to UUIDv5 names.
#[must_use]
pub fn record_uuid(id: &str) -> Uuid {
    Uuid::parse_str(id).unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()))
}

fn malformed(message: String) -> FableError {
    FableError::MalformedArchive(message)
}

/// Rebuild a pack from already-read archive contents.
pub fn from_compiled(compiled: &CompiledPack, layout: &LayoutConfig) -> Result<Pack, FableError> {
    let manifest = &compiled.manifest;
    manifest.validate_header()?;
    let entry_record = manifest
        .entry_stage()
        .ok_or_else(|| malformed("manifest has no stage records".to_string()))?;
    if manifest.stage_nodes.iter().filter(|s| s.square_one).count() > 1 {
        return Err(malformed("more than one squareOne stage".to_string()));
    }

    // Every asset is rehydrated before any node is built.
    let media = manifest
        .stage_nodes
        .iter()
        .map(|record| rehydrate_media(compiled, record))
        .collect::<Result<Vec<_>, _>>()?;
    let thumbnail = compiled
        .thumbnail
        .as_ref()
        .map(|bytes| AssetData::of_type(MediaType::Png, bytes.clone()));

    let mut pack = Pack::new(PackInfo {
        title: manifest.title.clone(),
        version: manifest.version,
        description: manifest.description.clone(),
        night_mode_available: manifest.night_mode_available,
        thumbnail,
    });

    let stages = add_stages(&mut pack, manifest, media)?;
    let entry = *stages
        .get(entry_record.uuid.as_str())
        .ok_or_else(|| malformed(format!("entry stage '{}' not found", entry_record.uuid)))?;
    pack.set_entry(entry)?;
    let actions = add_actions(&mut pack, manifest)?;

    for record in &manifest.action_nodes {
        let Some(&action) = actions.get(record.id.as_str()) else {
            continue;
        };
        for (i, target) in record.options.iter().enumerate() {
            let Some(target) = target else {
                continue;
            };
            let stage = *stages.get(target.as_str()).ok_or_else(|| {
                malformed(format!(
                    "action '{}' option {} references unknown stage '{}'",
                    record.id, i, target
                ))
            })?;
            connect_or_skip(
                &mut pack,
                PortRef::new(action, PortSlot::OptionOut(i)),
                PortRef::new(stage, PortSlot::From),
            )?;
        }
    }

    for record in &manifest.stage_nodes {
        let Some(&stage) = stages.get(record.uuid.as_str()) else {
            continue;
        };
        let transitions = [
            (PortSlot::Ok, &record.ok_transition),
            (PortSlot::Home, &record.home_transition),
        ];
        for (slot, transition) in transitions {
            let Some(transition) = transition else {
                continue;
            };
            let action_record = manifest.action(&transition.action_node).ok_or_else(|| {
                malformed(format!(
                    "stage '{}' {} transition references unknown action '{}'",
                    record.uuid, slot, transition.action_node
                ))
            })?;
            let action = *actions
                .get(action_record.id.as_str())
                .ok_or_else(|| malformed(format!("action '{}' not rebuilt", action_record.id)))?;
            let index = transition.option_index;
            let target_slot = if index == RANDOM_OPTION_INDEX {
                PortSlot::Random
            } else if index >= 0 && (index as usize) < action_record.options.len() {
                PortSlot::OptionIn(index as usize)
            } else {
                return Err(malformed(format!(
                    "stage '{}' {} transition option {} out of range",
                    record.uuid, slot, index
                )));
            };
            connect_or_skip(
                &mut pack,
                PortRef::new(stage, slot),
                PortRef::new(action, target_slot),
            )?;
        }
    }

    if pack.nodes().any(|node| node.position.is_none()) {
        let placed = apply_layout(&mut pack, layout);
        debug!(placed, "layout applied");
    }

    info!(
        title = %pack.info.title,
        nodes = pack.node_count(),
        links = pack.link_count(),
        "archive decompiled"
    );
    Ok(pack)
}

fn rehydrate_media(compiled: &CompiledPack, record: &StageRecord) -> Result<Media, FableError> {
    let image = record
        .image
        .as_deref()
        .map(|name| compiled.assets.rehydrate(name))
        .transpose()?;
    let audio = record
        .audio
        .as_deref()
        .map(|name| compiled.assets.rehydrate(name))
        .transpose()?;
    Ok(Media {
        name: record.name.clone(),
        image,
        audio,
    })
}

fn add_stages<'m>(
    pack: &mut Pack,
    manifest: &'m StoryManifest,
    media: Vec<Media>,
) -> Result<BTreeMap<&'m str, NodeId>, FableError> {
    let mut stages = BTreeMap::new();
    for (record, media) in manifest.stage_nodes.iter().zip(media) {
        let kind = NodeKind::Stage(StageNode::new(media, record.control_settings));
        let id = pack
            .add_node_with_uuid(record_uuid(&record.uuid), kind, record.position)
            .map_err(|e| malformed(format!("stage '{}': {}", record.uuid, e)))?;
        stages.insert(record.uuid.as_str(), id);
    }
    Ok(stages)
}

fn add_actions<'m>(
    pack: &mut Pack,
    manifest: &'m StoryManifest,
) -> Result<BTreeMap<&'m str, NodeId>, FableError> {
    let mut actions = BTreeMap::new();
    for record in &manifest.action_nodes {
        if record.options.len() > MAX_OPTIONS {
            return Err(malformed(format!(
                "action '{}' has {} options, maximum allowed {}",
                record.id,
                record.options.len(),
                MAX_OPTIONS
            )));
        }
        let kind = NodeKind::action(record.name.clone(), record.options.len());
        let id = pack
            .add_node_with_uuid(record_uuid(&record.id), kind, record.position)
            .map_err(|e| malformed(format!("action '{}': {}", record.id, e)))?;
        actions.insert(record.id.as_str(), id);
    }
    Ok(actions)
}

fn connect_or_skip(pack: &mut Pack, from: PortRef, to: PortRef) -> Result<(), FableError> {
    if pack.port(from).is_none() || pack.port(to).is_none() {
        warn!(from = %from, to = %to, "link skipped, port not available in rebuilt graph");
        return Ok(());
    }
    pack.connect(from, to)?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
