//! In-memory [`Repository`] for embedding and tests
//!
//! Holds just enough state to drive the pin tracker: an identifier index,
//! the set of obsolete revisions, bookmarks and the working-copy parent.
//! The pin store itself still lives on disk under `store_dir`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{PinError, Result};
use crate::host::{NodeIndex, Repository};
use crate::types::{NodeId, RevisionNumber, WorkingParent};

/// Simple repository state kept in memory
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    store_dir: PathBuf,
    local: bool,
    nodes: Vec<Option<NodeId>>,
    revs: HashMap<NodeId, RevisionNumber>,
    obsolete: BTreeSet<RevisionNumber>,
    bookmarks: BTreeMap<String, NodeId>,
    working_parent: WorkingParent,
    base_pinned: BTreeSet<RevisionNumber>,
}

impl MemoryRepository {
    /// Empty repository whose pin store lives in `store_dir`
    pub fn new(store_dir: impl AsRef<Path>) -> Self {
        Self {
            store_dir: store_dir.as_ref().to_path_buf(),
            local: true,
            nodes: Vec::new(),
            revs: HashMap::new(),
            obsolete: BTreeSet::new(),
            bookmarks: BTreeMap::new(),
            working_parent: WorkingParent::Unavailable,
            base_pinned: BTreeSet::new(),
        }
    }

    /// Mark the repository as a remote peer
    pub fn set_local(&mut self, local: bool) {
        self.local = local;
    }

    /// Add a revision and return its number; re-adding returns the existing one
    pub fn add_node(&mut self, node: NodeId) -> RevisionNumber {
        if let Some(rev) = self.revs.get(&node) {
            return *rev;
        }
        let rev = RevisionNumber(self.nodes.len() as u64);
        self.nodes.push(Some(node));
        self.revs.insert(node, rev);
        rev
    }

    /// Remove a revision from the index, as a strip would
    pub fn strip(&mut self, node: &NodeId) {
        if let Some(rev) = self.revs.remove(node) {
            self.nodes[rev.0 as usize] = None;
            self.obsolete.remove(&rev);
        }
    }

    /// Classify a revision as obsolete
    pub fn obsolete(&mut self, node: &NodeId) {
        if let Some(rev) = self.revs.get(node) {
            self.obsolete.insert(*rev);
        }
    }

    /// Drop the obsolete classification of a revision
    pub fn revive(&mut self, node: &NodeId) {
        if let Some(rev) = self.revs.get(node) {
            self.obsolete.remove(rev);
        }
    }

    /// Move the working copy
    pub fn set_working_parent(&mut self, parent: WorkingParent) {
        self.working_parent = parent;
    }

    /// Create or move a bookmark
    pub fn set_bookmark(&mut self, name: impl Into<String>, node: NodeId) {
        self.bookmarks.insert(name.into(), node);
    }

    /// Delete a bookmark
    pub fn remove_bookmark(&mut self, name: &str) {
        self.bookmarks.remove(name);
    }

    /// Revisions the host itself keeps visible
    pub fn set_base_pinned(&mut self, revs: impl IntoIterator<Item = RevisionNumber>) {
        self.base_pinned = revs.into_iter().collect();
    }
}

impl NodeIndex for MemoryRepository {
    fn rev_of(&self, node: &NodeId) -> Option<RevisionNumber> {
        self.revs.get(node).copied()
    }

    fn node_of(&self, rev: RevisionNumber) -> Result<NodeId> {
        self.nodes
            .get(rev.0 as usize)
            .copied()
            .flatten()
            .ok_or(PinError::RevisionLookup(rev))
    }
}

impl Repository for MemoryRepository {
    fn store_dir(&self) -> PathBuf {
        self.store_dir.clone()
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn working_parent(&self) -> WorkingParent {
        self.working_parent
    }

    fn bookmarks(&self) -> BTreeMap<String, NodeId> {
        self.bookmarks.clone()
    }

    fn is_obsolete(&self, rev: RevisionNumber) -> bool {
        self.obsolete.contains(&rev)
    }

    fn base_pinned_revs(&self) -> BTreeSet<RevisionNumber> {
        self.base_pinned.clone()
    }
}
