//! JSON snapshots of a [`TreeMetadataStore`](crate::TreeMetadataStore).
//!
//! A snapshot lists every node, the root included, in preorder so that a
//! parent is always restored before its children. Writes go to a temporary
//! file in the target directory which is then renamed over the old snapshot.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_types::{Location, Metadata};

use crate::error::{MetaError, MetaResult};
use crate::tree::{ObjectRecord, Tree, ROOT};

/// Current on-disk format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    num_levels: usize,
    nodes: Vec<SnapshotNode>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotNode {
    location: Location,
    #[serde(default)]
    metadata: Metadata,
    date_created: DateTime<Utc>,
    date_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object: Option<ObjectRecord>,
}

/// Load the snapshot at `path`. Returns `None` if no file exists.
pub(crate) fn load(path: &Path, num_levels: usize) -> MetaResult<Option<Tree>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let file: SnapshotFile =
        serde_json::from_slice(&bytes).map_err(|e| MetaError::Snapshot(e.to_string()))?;
    if file.version != SNAPSHOT_VERSION {
        return Err(MetaError::Snapshot(format!(
            "unsupported snapshot version {}",
            file.version
        )));
    }
    if file.num_levels != num_levels {
        return Err(MetaError::Snapshot(format!(
            "snapshot has {} levels, store expects {num_levels}",
            file.num_levels
        )));
    }

    let mut tree = Tree::new();
    for node in file.nodes {
        if node.location.is_root() {
            let root = tree
                .nodes
                .get_mut(&ROOT)
                .ok_or_else(|| MetaError::Snapshot("root node missing".into()))?;
            root.metadata = node.metadata;
            root.created = node.date_created;
            root.updated = node.date_updated;
            continue;
        }
        let depth = node.location.len();
        if depth > num_levels || (depth == num_levels) != node.object.is_some() {
            return Err(MetaError::Snapshot(format!(
                "node at depth {depth} does not fit {num_levels} levels: {}",
                node.location
            )));
        }
        let parent = tree.resolve(&node.location.parent()).ok_or_else(|| {
            MetaError::Snapshot(format!("orphaned node {}", node.location))
        })?;
        if tree.resolve(&node.location).is_some() {
            return Err(MetaError::Snapshot(format!(
                "duplicate node {}",
                node.location
            )));
        }
        tree.attach(
            parent,
            node.location,
            node.metadata,
            node.date_created,
            node.date_updated,
            node.object,
        );
    }
    Ok(Some(tree))
}

/// Atomically replace the snapshot at `path` with the contents of `tree`.
pub(crate) fn save(path: &Path, tree: &Tree, num_levels: usize) -> MetaResult<()> {
    let nodes = tree
        .subtree(ROOT)
        .into_iter()
        .filter_map(|id| tree.node(id))
        .map(|node| {
            SnapshotNode {
                location: node.location.clone(),
                metadata: node.metadata.clone(),
                date_created: node.created,
                date_updated: node.updated,
                object: node.object.clone(),
            }
        })
        .collect();
    let file = SnapshotFile {
        version: SNAPSHOT_VERSION,
        num_levels,
        nodes,
    };
    let json =
        serde_json::to_vec_pretty(&file).map_err(|e| MetaError::Snapshot(e.to_string()))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| MetaError::Io(e.error))?;
    Ok(())
}
