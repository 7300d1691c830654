use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use arbor_crypto::Hash128;
use arbor_store::{BackingGroup, FsObjectStore, StoreConfig, StoreGroup};
use arbor_tree::{NodeHandle, PropertyValue};
use arbor_types::{MetaData, ObjectId};
use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Snapshot(args) => cmd_snapshot(args, cli.format),
    }
}

fn cmd_snapshot(args: SnapshotArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(store) = args.store {
        config.root = store;
    }
    let report = snapshot(&args.dir, config)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("{} Snapshot of {}", "✓".green().bold(), report.source.display());
            println!("  Root hash: {}", report.root_hash.cyan());
            println!("  Root tree: {}", report.root_tree.yellow());
            println!("  Nodes:     {}", report.nodes.to_string().bold());
            println!("  Store:     {}", report.store.display());
        }
    }
    Ok(())
}

/// Store settings from an optional TOML file; defaults otherwise.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<StoreConfig> {
    let Some(path) = path else {
        return Ok(StoreConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

#[derive(Debug, Serialize)]
pub struct SnapshotReport {
    pub source: PathBuf,
    pub store: PathBuf,
    pub root_hash: String,
    pub root_tree: String,
    pub nodes: usize,
}

/// Mirror `dir` into a node tree inside the store described by `config`.
///
/// Directories become nodes, regular files become leaf nodes carrying
/// `size` and `content` properties. Entries are visited in file-name order
/// so the same directory always yields the same root hash. Symlinks and the
/// store itself are skipped.
pub fn snapshot(dir: &Path, config: StoreConfig) -> anyhow::Result<SnapshotReport> {
    let source = dir
        .canonicalize()
        .with_context(|| format!("resolving {}", dir.display()))?;
    let store_root = config.root.clone();
    let store = Arc::new(FsObjectStore::open(config)?);
    let store_root = store_root.canonicalize().unwrap_or(store_root);

    let top = StoreGroup::root(store);
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());

    let (hash, nodes) = {
        let group: Arc<dyn BackingGroup> = top.clone();
        let root = NodeHandle::root(Some(group), &name, node_metadata("dir")?)?;
        let mut nodes = 1;
        mirror_dir(&root, &source, &store_root, &mut nodes)?;
        (root.finalize()?, nodes)
    };
    let tree = top.flush()?;
    info!(source = %source.display(), %hash, tree = %tree.short_hex(), nodes, "snapshot written");

    Ok(report(source, store_root, hash, tree, nodes))
}

fn report(source: PathBuf, store: PathBuf, hash: Hash128, tree: ObjectId, nodes: usize) -> SnapshotReport {
    SnapshotReport {
        source,
        store,
        root_hash: hash.to_hex(),
        root_tree: tree.to_hex(),
        nodes,
    }
}

fn node_metadata(kind: &str) -> anyhow::Result<MetaData> {
    Ok(MetaData::new().with("kind", kind)?)
}

fn mirror_dir(node: &Arc<NodeHandle>, dir: &Path, skip: &Path, nodes: &mut usize) -> anyhow::Result<()> {
    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != skip);

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        let file_type = entry.file_type();

        let child = if file_type.is_dir() {
            let child = node.create_child(&name, node_metadata("dir")?)?;
            mirror_dir(&child, entry.path(), skip, nodes)?;
            child
        } else if file_type.is_file() {
            let content = fs::read(entry.path())
                .with_context(|| format!("reading {}", entry.path().display()))?;
            let child = node.create_child(&name, node_metadata("file")?)?;
            let props = child.properties();
            props.set("size", PropertyValue::Int(content.len() as i64))?;
            props.set("content", PropertyValue::Bytes(content))?;
            child
        } else {
            debug!(path = %entry.path().display(), "skipping non-regular entry");
            continue;
        };

        child.finalize()?;
        *nodes += 1;
    }
    Ok(())
}
