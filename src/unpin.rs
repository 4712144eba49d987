//! Session-scoped set of nodes to release
//!
//! One [`UnpinTracker`] exists per process session and is shared through an
//! `Arc` by everything that produces or consumes unpin requests. It is never
//! persisted; whatever is left in it when the process exits is simply gone.
//!
//! Two producers feed it:
//!
//! 1. marker creation: the precursor of every new obsolescence marker
//! 2. node cleanup: every rewritten node, for rewrite paths that never
//!    create markers individually
//!
//! Both may report the same node; the set makes that harmless.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use tracing::debug;

use crate::host::{CleanupMapping, MarkerRelation, NodeIndex};
use crate::types::NodeId;

/// Identifiers slated for unpinning in this session
#[derive(Debug, Default)]
pub struct UnpinTracker {
    nodes: Mutex<BTreeSet<NodeId>>,
}

impl UnpinTracker {
    /// Empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Add identifiers to the pending set
    pub fn mark_for_unpin<I>(&self, nodes: I)
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.nodes.lock().extend(nodes);
    }

    /// Take the pending set, leaving the tracker empty
    pub fn drain(&self) -> BTreeSet<NodeId> {
        std::mem::take(&mut *self.nodes.lock())
    }

    /// Copy of the pending set
    pub fn snapshot(&self) -> BTreeSet<NodeId> {
        self.nodes.lock().clone()
    }

    /// Whether `node` is pending release
    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.lock().contains(node)
    }

    /// Number of pending identifiers
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }

    /// Record the precursors of newly created markers
    ///
    /// A precursor the index cannot resolve is skipped; the rest of the
    /// batch is still recorded.
    pub fn record_markers(&self, index: &dyn NodeIndex, relations: &[MarkerRelation]) {
        let mut precursors = Vec::with_capacity(relations.len());
        for relation in relations {
            match index.node_of(relation.precursor) {
                Ok(node) => precursors.push(node),
                Err(e) => debug!(rev = %relation.precursor, error = %e, "skipping unresolvable precursor"),
            }
        }
        self.mark_for_unpin(precursors);
    }

    /// Record the rewritten nodes of a cleanup
    pub fn record_cleanup(&self, mapping: &CleanupMapping) {
        self.mark_for_unpin(mapping.keys().copied());
    }
}
