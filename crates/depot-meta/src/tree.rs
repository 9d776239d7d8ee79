//! In-memory tree store.
//!
//! [`TreeMetadataStore`] keeps the hierarchy as an arena of nodes linked by
//! parent id, each node holding a name-keyed map of its children. Resolving a
//! location walks one map lookup per segment.
//!
//! A query context holds the store's mutex for its whole lifetime, which
//! serializes scopes, and records an undo journal. Rolling back replays the
//! journal in reverse order.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use depot_types::{Filter, Location, LocationInfo, Metadata, ObjectInfo};

use crate::error::{MetaError, MetaResult};
use crate::snapshot;
use crate::traits::{MetadataStore, MetadataTxn};

pub(crate) type NodeId = u64;

pub(crate) const ROOT: NodeId = 0;

/// File reference carried by object nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ObjectRecord {
    pub filename: String,
    pub mime: String,
    pub uri: String,
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub location: Location,
    pub parent: Option<NodeId>,
    pub children: BTreeMap<String, NodeId>,
    pub metadata: Metadata,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub object: Option<ObjectRecord>,
}

impl Node {
    fn name(&self) -> &str {
        self.location.name().unwrap_or_default()
    }

    fn info(&self) -> LocationInfo {
        LocationInfo {
            location: self.location.clone(),
            metadata: self.metadata.clone(),
            date_created: Some(self.created),
            date_updated: Some(self.updated),
        }
    }

    fn object_info(&self) -> Option<ObjectInfo> {
        self.object.as_ref().map(|obj| ObjectInfo {
            location: self.location.clone(),
            metadata: self.metadata.clone(),
            date_created: Some(self.created),
            date_updated: Some(self.updated),
            filename: obj.filename.clone(),
            mime: obj.mime.clone(),
            uri: obj.uri.clone(),
        })
    }
}

/// The node arena.
#[derive(Debug)]
pub(crate) struct Tree {
    pub nodes: HashMap<NodeId, Node>,
    pub next_id: NodeId,
}

impl Tree {
    pub fn new() -> Self {
        let now = Utc::now();
        let root = Node {
            location: Location::root(),
            parent: None,
            children: BTreeMap::new(),
            metadata: Metadata::new(),
            created: now,
            updated: now,
            object: None,
        };
        Self {
            nodes: HashMap::from([(ROOT, root)]),
            next_id: ROOT + 1,
        }
    }

    /// Every id stored in a `children` map or `parent` field is present in
    /// `nodes`, so lookups of linked ids only miss on a corrupted tree.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Walk from the root, one child lookup per segment.
    pub fn resolve(&self, location: &Location) -> Option<NodeId> {
        let mut current = ROOT;
        for segment in location.iter() {
            current = *self.node(current)?.children.get(segment)?;
        }
        Some(current)
    }

    /// Attach a new node below `parent`. Returns the new id.
    pub fn attach(
        &mut self,
        parent: NodeId,
        location: Location,
        metadata: Metadata,
        created: DateTime<Utc>,
        updated: DateTime<Utc>,
        object: Option<ObjectRecord>,
    ) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        let name = location.name().unwrap_or_default().to_string();
        self.nodes.insert(
            id,
            Node {
                location,
                parent: Some(parent),
                children: BTreeMap::new(),
                metadata,
                created,
                updated,
                object,
            },
        );
        if let Some(parent) = self.node_mut(parent) {
            parent.children.insert(name, id);
        }
        id
    }

    /// Ids of `id` and everything below it, parents before children.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.node(next) {
                out.push(next);
                stack.extend(node.children.values().rev());
            }
        }
        out
    }

    fn collect_objects(&self, id: NodeId) -> Vec<ObjectInfo> {
        self.subtree(id)
            .into_iter()
            .filter_map(|n| self.node(n).and_then(Node::object_info))
            .collect()
    }

    fn has_object_named(&self, id: NodeId, tag: &str) -> bool {
        self.subtree(id).into_iter().any(|n| {
            self.node(n)
                .is_some_and(|node| node.object.is_some() && node.name() == tag)
        })
    }

    fn matches(&self, id: NodeId, filter: Option<&Filter>) -> bool {
        let Some(filter) = filter else {
            return true;
        };
        self.node(id).is_some_and(|node| filter.matches_name(node.name()))
            && filter
                .has_object
                .as_deref()
                .map_or(true, |tag| self.has_object_named(id, tag))
    }

    /// Number of nodes, not counting the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }
}

/// An undo journal entry.
#[derive(Debug)]
enum Undo {
    /// A node was attached; rollback detaches it.
    Attached(NodeId),
    /// A node was modified in place; rollback restores the old value.
    Modified(NodeId, Node),
    /// A subtree was removed; the first entry is its top node.
    Removed(Vec<(NodeId, Node)>),
}

/// In-memory metadata store with optional JSON snapshot persistence.
///
/// Without a snapshot path all data is lost when the store is dropped. With
/// one, every committed change rewrites the snapshot atomically before the
/// commit returns.
pub struct TreeMetadataStore {
    num_levels: usize,
    tree: Mutex<Tree>,
    snapshot_path: Option<PathBuf>,
}

impl TreeMetadataStore {
    /// Create an empty, purely in-memory store.
    pub fn new(num_levels: usize) -> MetaResult<Self> {
        if num_levels == 0 {
            return Err(MetaError::InvalidLevels(num_levels));
        }
        Ok(Self {
            num_levels,
            tree: Mutex::new(Tree::new()),
            snapshot_path: None,
        })
    }

    /// Open a store persisted at `path`, loading the snapshot if it exists.
    pub fn open(num_levels: usize, path: impl AsRef<Path>) -> MetaResult<Self> {
        if num_levels == 0 {
            return Err(MetaError::InvalidLevels(num_levels));
        }
        let path = path.as_ref().to_path_buf();
        let tree = match snapshot::load(&path, num_levels)? {
            Some(tree) => {
                debug!(path = %path.display(), nodes = tree.len(), "loaded metadata snapshot");
                tree
            }
            None => Tree::new(),
        };
        Ok(Self {
            num_levels,
            tree: Mutex::new(tree),
            snapshot_path: Some(path),
        })
    }

    /// Number of nodes below the root.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Where committed changes are persisted, if anywhere.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    // A panicking scope rolls back while unwinding, so the tree behind a
    // poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetadataStore for TreeMetadataStore {
    fn num_levels(&self) -> usize {
        self.num_levels
    }

    fn query_context(&self) -> MetaResult<Box<dyn MetadataTxn + '_>> {
        Ok(Box::new(TreeTxn {
            store: self,
            tree: self.lock(),
            journal: Vec::new(),
            committed: false,
        }))
    }
}

impl std::fmt::Debug for TreeMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeMetadataStore")
            .field("num_levels", &self.num_levels)
            .field("snapshot_path", &self.snapshot_path)
            .finish()
    }
}

/// A query context on a [`TreeMetadataStore`].
struct TreeTxn<'a> {
    store: &'a TreeMetadataStore,
    tree: MutexGuard<'a, Tree>,
    journal: Vec<Undo>,
    committed: bool,
}

impl TreeTxn<'_> {
    fn levels(&self) -> usize {
        self.store.num_levels
    }

    fn resolve(&self, location: &Location) -> MetaResult<NodeId> {
        self.tree
            .resolve(location)
            .ok_or_else(|| MetaError::LocationDoesNotExist(location.clone()))
    }

    /// The node at `location`.
    fn lookup(&self, location: &Location) -> MetaResult<&Node> {
        self.tree
            .resolve(location)
            .and_then(|id| self.tree.node(id))
            .ok_or_else(|| MetaError::LocationDoesNotExist(location.clone()))
    }

    fn modify(&mut self, id: NodeId, f: impl FnOnce(&mut Node)) {
        let Some(node) = self.tree.node_mut(id) else {
            return;
        };
        self.journal.push(Undo::Modified(id, node.clone()));
        f(node);
        node.updated = Utc::now();
    }

    fn insert(
        &mut self,
        location: &Location,
        metadata: &Metadata,
        object: Option<ObjectRecord>,
    ) -> MetaResult<()> {
        let parent_location = location.parent();
        let parent = self
            .tree
            .resolve(&parent_location)
            .ok_or(MetaError::LocationDoesNotExist(parent_location))?;
        let now = Utc::now();
        let id = self
            .tree
            .attach(parent, location.clone(), metadata.clone(), now, now, object);
        self.journal.push(Undo::Attached(id));
        Ok(())
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let ids = self.tree.subtree(id);
        let Some(top) = self.tree.node(id) else {
            return;
        };
        let (parent, name) = (top.parent, top.name().to_string());
        if let Some(parent) = parent.and_then(|p| self.tree.node_mut(p)) {
            parent.children.remove(&name);
        }
        let removed = ids
            .into_iter()
            .filter_map(|n| self.tree.nodes.remove(&n).map(|node| (n, node)))
            .collect();
        self.journal.push(Undo::Removed(removed));
    }

    fn rollback(&mut self) {
        if self.journal.is_empty() {
            return;
        }
        debug!(entries = self.journal.len(), "rolling back metadata changes");
        while let Some(entry) = self.journal.pop() {
            match entry {
                Undo::Attached(id) => {
                    if let Some(node) = self.tree.nodes.remove(&id) {
                        if let Some(parent) = node.parent.and_then(|p| self.tree.node_mut(p)) {
                            parent.children.remove(node.name());
                        }
                    }
                }
                Undo::Modified(id, node) => {
                    self.tree.nodes.insert(id, node);
                }
                Undo::Removed(nodes) => {
                    if let Some((top_id, top)) = nodes.first() {
                        if let Some(parent) = top.parent.and_then(|p| self.tree.node_mut(p)) {
                            parent.children.insert(top.name().to_string(), *top_id);
                        }
                    }
                    self.tree.nodes.extend(nodes);
                }
            }
        }
    }
}

impl MetadataTxn for TreeTxn<'_> {
    fn num_levels(&self) -> usize {
        self.levels()
    }

    fn get_location(&self, location: &Location) -> MetaResult<LocationInfo> {
        if location.len() >= self.levels() {
            return Err(MetaError::InvalidLocationQuery(location.clone()));
        }
        Ok(self.lookup(location)?.info())
    }

    fn get_object(&self, location: &Location) -> MetaResult<ObjectInfo> {
        if location.len() != self.levels() {
            return Err(MetaError::InvalidLocationQuery(location.clone()));
        }
        self.lookup(location)?
            .object_info()
            .ok_or_else(|| MetaError::LocationDoesNotExist(location.clone()))
    }

    fn list_location(
        &self,
        location: &Location,
        filter: Option<&Filter>,
    ) -> MetaResult<Vec<LocationInfo>> {
        if location.len() >= self.levels() {
            return Err(MetaError::InvalidLocationQuery(location.clone()));
        }
        Ok(self
            .lookup(location)?
            .children
            .values()
            .filter(|child| self.tree.matches(**child, filter))
            .filter_map(|child| self.tree.node(*child))
            .map(Node::info)
            .collect())
    }

    fn list_objects(
        &self,
        location: &Location,
        filter: Option<&Filter>,
    ) -> MetaResult<Vec<ObjectInfo>> {
        let levels = self.levels();
        let candidates: Vec<NodeId> = if location.len() == levels {
            vec![self.resolve(location)?]
        } else if location.len() + 1 == levels {
            self.lookup(location)?.children.values().copied().collect()
        } else {
            return Err(MetaError::InvalidLocationQuery(location.clone()));
        };
        Ok(candidates
            .into_iter()
            .filter(|id| self.tree.matches(*id, filter))
            .filter_map(|id| self.tree.node(id).and_then(Node::object_info))
            .collect())
    }

    fn create_location(&mut self, info: &LocationInfo, update_if_exists: bool) -> MetaResult<bool> {
        let location = &info.location;
        if location.len() >= self.levels() {
            return Err(MetaError::InvalidLocationQuery(location.clone()));
        }
        if let Some(id) = self.tree.resolve(location) {
            if !update_if_exists {
                return Err(MetaError::LocationAlreadyExists(location.clone()));
            }
            let metadata = info.metadata.clone();
            self.modify(id, |node| node.metadata = metadata);
            return Ok(false);
        }
        self.insert(location, &info.metadata, None)?;
        Ok(true)
    }

    fn create_object(&mut self, info: &ObjectInfo, update_if_exists: bool) -> MetaResult<bool> {
        let location = &info.location;
        if location.len() != self.levels() {
            return Err(MetaError::InvalidLocationQuery(location.clone()));
        }
        let record = ObjectRecord {
            filename: info.filename.clone(),
            mime: info.mime.clone(),
            uri: info.uri.clone(),
        };
        if let Some(id) = self.tree.resolve(location) {
            if !update_if_exists {
                return Err(MetaError::LocationAlreadyExists(location.clone()));
            }
            let metadata = info.metadata.clone();
            self.modify(id, |node| {
                node.metadata = metadata;
                node.object = Some(record);
            });
            return Ok(false);
        }
        self.insert(location, &info.metadata, Some(record))?;
        Ok(true)
    }

    fn delete_location(
        &mut self,
        location: &Location,
        recursive: bool,
    ) -> MetaResult<Vec<ObjectInfo>> {
        if location.len() > self.levels() {
            return Err(MetaError::InvalidLocationQuery(location.clone()));
        }
        let id = self.resolve(location)?;
        let children: Vec<NodeId> = self.lookup(location)?.children.values().copied().collect();
        if !children.is_empty() && !recursive {
            return Err(MetaError::LocationHasChildren(location.clone()));
        }

        let objects = self.tree.collect_objects(id);
        if id == ROOT {
            for child in children {
                self.remove_subtree(child);
            }
        } else {
            self.remove_subtree(id);
        }
        Ok(objects)
    }

    fn commit(mut self: Box<Self>) -> MetaResult<()> {
        if !self.journal.is_empty() {
            if let Some(path) = &self.store.snapshot_path {
                // On failure the handle drops uncommitted and rolls back, so
                // memory never runs ahead of the snapshot.
                snapshot::save(path, &self.tree, self.store.num_levels).map_err(|e| {
                    warn!(path = %path.display(), error = %e, "failed to persist metadata snapshot");
                    e
                })?;
            }
        }
        self.journal.clear();
        self.committed = true;
        Ok(())
    }
}

impl Drop for TreeTxn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}
