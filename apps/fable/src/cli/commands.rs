//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::Key;
use crate::config::FableConfig;
use clap::ValueEnum;
use fable_core::layout::LayoutConfig;
use fable_core::{
    CompiledPack, FableError, NodeKind, Pack, Player, Scene, SnapshotHeader, Step, compile_to_bytes,
    decompile_with_layout, pack_from_bytes, pack_from_json, pack_to_bytes, pack_to_json,
    primitives, validate,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{error, info};

// =============================================================================
// FILE LIMITS
// =============================================================================

/// Maximum size of any input file (archives, documents, snapshots).
const MAX_INPUT_FILE_SIZE: u64 = primitives::MAX_ARCHIVE_SIZE as u64;

/// Local file header signature of a zip container.
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Validate file path and size, then read it.
///
/// The path is canonicalized so ".." and symlinks are resolved before
/// anything is read.
fn read_input(path: &Path) -> Result<Vec<u8>, FableError> {
    let canonical = path.canonicalize().map_err(|e| {
        FableError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(FableError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| FableError::IoError(format!("Cannot read file metadata: {}", e)))?;
    if metadata.len() > MAX_INPUT_FILE_SIZE {
        return Err(FableError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_INPUT_FILE_SIZE
        )));
    }

    std::fs::read(&canonical)
        .map_err(|e| FableError::IoError(format!("Cannot read '{}': {}", path.display(), e)))
}

/// Validate output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, FableError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let canonical_parent = parent.canonicalize().map_err(|e| {
        FableError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;
    if !canonical_parent.is_dir() {
        return Err(FableError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }
    let filename = path
        .file_name()
        .ok_or_else(|| FableError::IoError("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

fn write_output(path: &Path, data: &[u8]) -> Result<PathBuf, FableError> {
    let validated = validate_output_path(path)?;
    std::fs::write(&validated, data).map_err(|e| {
        FableError::IoError(format!("Cannot write '{}': {}", validated.display(), e))
    })?;
    Ok(validated)
}

/// `<input stem>.<extension>`.
fn output_name(input: &Path, extension: &str) -> Result<OsString, FableError> {
    let stem = input.file_stem().ok_or_else(|| {
        FableError::IoError(format!("Input '{}' has no file name", input.display()))
    })?;
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(extension);
    Ok(name)
}

/// `<dir>/<input stem>.<extension>`, creating `dir` if needed.
fn output_file(input: &Path, dir: &Path, extension: &str) -> Result<PathBuf, FableError> {
    let name = output_name(input, extension)?;
    std::fs::create_dir_all(dir).map_err(|e| {
        FableError::IoError(format!("Cannot create '{}': {}", dir.display(), e))
    })?;
    Ok(dir.join(name))
}

/// Every job writes into the same directory, so two inputs sharing a stem
/// would race on one output file.
fn check_distinct_outputs(inputs: &[PathBuf], extension: &str) -> Result<(), FableError> {
    let mut seen: BTreeMap<OsString, &Path> = BTreeMap::new();
    for input in inputs {
        let name = output_name(input, extension)?;
        if let Some(previous) = seen.get(&name) {
            return Err(FableError::IoError(format!(
                "'{}' and '{}' would both write '{}'",
                previous.display(),
                input.display(),
                name.to_string_lossy()
            )));
        }
        seen.insert(name, input);
    }
    Ok(())
}

/// Load a pack from a JSON document, a binary snapshot or an archive.
///
/// The format is sniffed from the leading bytes, not the extension.
pub fn load_pack(path: &Path, layout: &LayoutConfig) -> Result<Pack, FableError> {
    let bytes = read_input(path)?;
    if SnapshotHeader::sniff(&bytes) {
        return pack_from_bytes(&bytes);
    }
    if bytes.starts_with(ZIP_MAGIC) {
        return decompile_with_layout(&bytes, layout);
    }
    let text = std::str::from_utf8(&bytes).map_err(|e| {
        FableError::DeserializationError(format!(
            "'{}' is neither a snapshot, an archive nor UTF-8 JSON: {}",
            path.display(),
            e
        ))
    })?;
    pack_from_json(text)
}

// =============================================================================
// CONCURRENT JOBS
// =============================================================================

/// Outcome of one compile or decompile job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub bytes: usize,
}

/// Run one blocking job per input on the runtime's blocking pool.
///
/// Every job owns its input; failures are logged and do not cancel the
/// others. Reports come back sorted by input path.
async fn run_jobs<F>(inputs: Vec<PathBuf>, job: F) -> (Vec<JobReport>, Option<FableError>)
where
    F: Fn(&Path) -> Result<JobReport, FableError> + Clone + Send + 'static,
{
    let mut jobs = JoinSet::new();
    for input in inputs {
        let job = job.clone();
        jobs.spawn_blocking(move || job(&input).map_err(|e| (input, e)));
    }

    let mut reports = Vec::new();
    let mut first_error = None;
    while let Some(joined) = jobs.join_next().await {
        let failure = match joined {
            Ok(Ok(report)) => {
                info!(
                    input = %report.input.display(),
                    output = %report.output.display(),
                    bytes = report.bytes,
                    "job finished"
                );
                reports.push(report);
                continue;
            }
            Ok(Err((input, e))) => {
                error!(input = %input.display(), "job failed: {}", e);
                e
            }
            Err(e) => {
                error!("job aborted: {}", e);
                FableError::IoError(format!("job aborted: {}", e))
            }
        };
        if first_error.is_none() {
            first_error = Some(failure);
        }
    }
    reports.sort_by(|a, b| a.input.cmp(&b.input));
    (reports, first_error)
}

fn print_reports(verb: &str, reports: &[JobReport], json_mode: bool) {
    if json_mode {
        let output = serde_json::json!({ "jobs": reports });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return;
    }
    for report in reports {
        println!(
            "{} {} -> {} ({} bytes)",
            verb,
            report.input.display(),
            report.output.display(),
            report.bytes
        );
    }
}

// =============================================================================
// COMPILE / DECOMPILE COMMANDS
// =============================================================================

pub fn compile_file(
    input: &Path,
    out_dir: &Path,
    layout: &LayoutConfig,
) -> Result<JobReport, FableError> {
    let pack = load_pack(input, layout)?;
    let bytes = compile_to_bytes(&pack)?;
    let output = write_output(&output_file(input, out_dir, "zip")?, &bytes)?;
    Ok(JobReport {
        input: input.to_path_buf(),
        output,
        bytes: bytes.len(),
    })
}

pub fn decompile_file(
    input: &Path,
    out_dir: &Path,
    layout: &LayoutConfig,
    pretty: bool,
) -> Result<JobReport, FableError> {
    let bytes = read_input(input)?;
    let pack = decompile_with_layout(&bytes, layout)?;
    let json = pack_to_json(&pack, pretty)?;
    let output = write_output(&output_file(input, out_dir, "json")?, json.as_bytes())?;
    Ok(JobReport {
        input: input.to_path_buf(),
        output,
        bytes: json.len(),
    })
}

/// Compile every pack concurrently.
pub async fn cmd_compile(
    packs: Vec<PathBuf>,
    out_dir: PathBuf,
    config: &FableConfig,
    json_mode: bool,
) -> Result<(), FableError> {
    check_distinct_outputs(&packs, "zip")?;
    let layout = config.layout;
    let (reports, failure) = run_jobs(packs, move |input: &Path| {
        compile_file(input, &out_dir, &layout)
    })
    .await;
    print_reports("compiled", &reports, json_mode);
    failure.map_or(Ok(()), Err)
}

/// Decompile every archive concurrently.
pub async fn cmd_decompile(
    archives: Vec<PathBuf>,
    out_dir: PathBuf,
    config: &FableConfig,
    json_mode: bool,
) -> Result<(), FableError> {
    check_distinct_outputs(&archives, "json")?;
    let layout = config.layout;
    let pretty = config.output.pretty_json;
    let (reports, failure) = run_jobs(archives, move |input: &Path| {
        decompile_file(input, &out_dir, &layout, pretty)
    })
    .await;
    print_reports("decompiled", &reports, json_mode);
    failure.map_or(Ok(()), Err)
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

pub fn cmd_validate(
    path: &Path,
    config: &FableConfig,
    json_mode: bool,
    strict: bool,
) -> Result<(), FableError> {
    let pack = load_pack(path, &config.layout)?;
    let report = validate(&pack);
    let errors = report.count(fable_core::Severity::Error);
    let warnings = report.count(fable_core::Severity::Warning);

    if json_mode {
        let output = serde_json::json!({
            "pack": path.to_string_lossy(),
            "errors": errors,
            "warnings": warnings,
            "report": report,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("Validation of {}", path.display());
        println!("==================");
        for issue in &report.pack_issues {
            println!("  pack: {}", issue);
        }
        for (id, issues) in &report.node_issues {
            let name = pack.node(*id).map_or("?", |node| node.name());
            for issue in issues {
                println!("  {} '{}': {}", id, name, issue);
            }
        }
        println!();
        println!("{} error(s), {} warning(s)", errors, warnings);
    }

    if strict && errors > 0 {
        return Err(FableError::ValidationFailed(errors));
    }
    Ok(())
}

// =============================================================================
// SIMULATE COMMAND
// =============================================================================

/// Human label for a scene: node id, name and menu part.
fn describe_scene(pack: &Pack, scene: Scene) -> String {
    let id = scene.node();
    let Some(node) = pack.node(id) else {
        return format!("{} (missing)", id);
    };
    match scene {
        Scene::Node(_) => format!("{} '{}'", id, node.name()),
        Scene::MenuQuestion(_) => format!("{} '{}' question", id, node.name()),
        Scene::MenuOption(_, index) => {
            let option = match &node.kind {
                NodeKind::Menu(menu) => menu.options.get(index).map(|media| media.name.as_str()),
                _ => None,
            };
            format!(
                "{} '{}' option {} '{}'",
                id,
                node.name(),
                index,
                option.unwrap_or("?")
            )
        }
    }
}

fn describe_step(pack: &Pack, step: &Step) -> String {
    match step {
        Step::Moved(playback) => {
            let scene = describe_scene(pack, playback.scene);
            match playback.context {
                Some(context) => format!("{} [{:?} #{}]", scene, context.branch, context.index),
                None => scene,
            }
        }
        Step::DeadEnd(dead_end) => format!("dead end: {}", dead_end),
    }
}

fn key_name(key: Key) -> String {
    key.to_possible_value()
        .map(|value| value.get_name().to_string())
        .unwrap_or_default()
}

pub fn cmd_simulate(
    path: &Path,
    config: &FableConfig,
    json_mode: bool,
    steps: &[Key],
    seed: Option<u64>,
) -> Result<(), FableError> {
    let pack = load_pack(path, &config.layout)?;
    let mut player = match seed {
        Some(seed) => Player::seeded(&pack, seed),
        None => Player::new(&pack),
    };

    let mut trace = vec![(Key::Start, player.start())];
    for key in steps {
        let step = match key {
            Key::Ok => player.ok(),
            Key::Home => player.home(),
            Key::Left => player.wheel_left(),
            Key::Right => player.wheel_right(),
            Key::Start => player.start(),
        };
        trace.push((*key, step));
    }

    if json_mode {
        let output: Vec<_> = trace
            .iter()
            .map(|(key, step)| {
                serde_json::json!({
                    "key": key_name(*key),
                    "step": step,
                    "label": describe_step(&pack, step),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    for (key, step) in &trace {
        println!("{:>6} -> {}", key_name(*key), describe_step(&pack, step));
    }
    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

pub fn cmd_inspect(path: &Path, json_mode: bool) -> Result<(), FableError> {
    let bytes = read_input(path)?;
    let compiled = CompiledPack::from_archive_bytes(&bytes)?;
    let manifest = &compiled.manifest;
    let entry = manifest.entry_stage().map(|stage| stage.name.clone());

    if json_mode {
        let assets: Vec<_> = compiled
            .assets
            .iter()
            .map(|(name, asset)| {
                serde_json::json!({
                    "name": name,
                    "mediaType": asset.media_type.mime(),
                    "size": asset.bytes.len(),
                })
            })
            .collect();
        let output = serde_json::json!({
            "title": manifest.title,
            "version": manifest.version,
            "description": manifest.description,
            "nightModeAvailable": manifest.night_mode_available,
            "stageNodes": manifest.stage_nodes.len(),
            "actionNodes": manifest.action_nodes.len(),
            "entry": entry,
            "assets": assets,
            "assetBytes": compiled.assets.total_bytes(),
            "thumbnail": compiled.thumbnail.is_some(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Archive {}", path.display());
    println!("==================");
    println!("Title:        {}", manifest.title);
    println!("Version:      {}", manifest.version);
    println!("Night mode:   {}", manifest.night_mode_available);
    println!("Entry:        {}", entry.as_deref().unwrap_or("(none)"));
    println!("Stage nodes:  {}", manifest.stage_nodes.len());
    println!("Action nodes: {}", manifest.action_nodes.len());
    println!("Thumbnail:    {}", compiled.thumbnail.is_some());
    println!();
    println!(
        "Assets ({}, {} bytes):",
        compiled.assets.len(),
        compiled.assets.total_bytes()
    );
    for (name, asset) in compiled.assets.iter() {
        println!("  {}  {}  {} bytes", name, asset.media_type, asset.bytes.len());
    }
    Ok(())
}

// =============================================================================
// SNAPSHOT COMMAND
// =============================================================================

pub fn cmd_snapshot(path: &Path, config: &FableConfig, output: &Path) -> Result<(), FableError> {
    let pack = load_pack(path, &config.layout)?;
    let bytes = pack_to_bytes(&pack)?;
    let written = write_output(output, &bytes)?;
    info!(
        output = %written.display(),
        bytes = bytes.len(),
        nodes = pack.node_count(),
        "snapshot written"
    );
    Ok(())
}
