//! Interfaces consumed from the host version-control system
//!
//! The pin tracker never owns revision data. Everything it needs to know
//! about the repository comes through the two traits here:
//!
//! - [`NodeIndex`] maps identifiers to revision numbers and back
//! - [`Repository`] adds the repository position (working-copy parent,
//!   bookmarks), the obsolescence predicate and the host's own pinned set
//!
//! Marker creation and node cleanup are reported to the tracker with the
//! payload types [`MarkerRelation`] and [`CleanupMapping`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::Result;
use crate::types::{NodeId, RevisionNumber, WorkingParent};

/// Identifier to revision number lookup
pub trait NodeIndex {
    /// Revision number of `node`, or `None` if the index does not know it
    fn rev_of(&self, node: &NodeId) -> Option<RevisionNumber>;

    /// Identifier of `rev`
    ///
    /// Fails with [`crate::PinError::RevisionLookup`] when the revision
    /// cannot be resolved.
    fn node_of(&self, rev: RevisionNumber) -> Result<NodeId>;

    /// Whether `node` is present in the index
    fn contains(&self, node: &NodeId) -> bool {
        self.rev_of(node).is_some()
    }
}

/// A local repository as seen by the pin tracker
pub trait Repository: NodeIndex {
    /// Directory that holds the pin store and its lock file
    fn store_dir(&self) -> PathBuf;

    /// Whether this is a local repository; remote peers are never tracked
    fn is_local(&self) -> bool {
        true
    }

    /// Current working-copy parent
    fn working_parent(&self) -> WorkingParent;

    /// Bookmark name to target identifier
    fn bookmarks(&self) -> BTreeMap<String, NodeId>;

    /// Whether `rev` is currently classified as obsolete
    fn is_obsolete(&self, rev: RevisionNumber) -> bool;

    /// The host's own pinned revisions, before this subsystem extends them
    fn base_pinned_revs(&self) -> BTreeSet<RevisionNumber> {
        BTreeSet::new()
    }
}

/// One relation passed to marker creation: `precursor` is superseded by
/// `successors` (empty when the precursor was pruned)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRelation {
    /// Revision being obsoleted
    pub precursor: RevisionNumber,
    /// Revisions replacing it
    pub successors: Vec<RevisionNumber>,
}

impl MarkerRelation {
    /// Relation for a pruned revision
    pub fn prune(precursor: RevisionNumber) -> Self {
        Self {
            precursor,
            successors: Vec::new(),
        }
    }

    /// Relation for a rewritten revision
    pub fn rewrite(precursor: RevisionNumber, successor: RevisionNumber) -> Self {
        Self {
            precursor,
            successors: vec![successor],
        }
    }
}

/// Old identifier to replacement identifiers, as handed to node cleanup
pub type CleanupMapping = BTreeMap<NodeId, Vec<NodeId>>;
