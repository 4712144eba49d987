//! Which nodes should be pinned right now
//!
//! The candidates are the working-copy parent and every bookmark target.
//! They are recomputed from scratch before and after each command, so a
//! candidate that failed to get pinned once is picked up again later.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::trace;

use crate::host::Repository;
use crate::types::{NodeId, WorkingParent, NODE_ID_LEN};

/// Working-copy parent plus bookmark targets
pub fn candidate_pins(repo: &dyn Repository) -> BTreeSet<NodeId> {
    let mut result: BTreeSet<NodeId> = repo.bookmarks().into_values().collect();
    match repo.working_parent() {
        WorkingParent::Parent(node) if !node.is_null() => {
            result.insert(node);
        }
        parent => trace!(?parent, "no working-copy parent to pin"),
    }
    result
}

/// Read the first parent from a dirstate file
///
/// The dirstate starts with the two 20-byte parent identifiers. Anything
/// that prevents reading the first one yields [`WorkingParent::Unavailable`].
pub fn read_dirstate_parent(path: &Path) -> WorkingParent {
    let mut buf = [0u8; NODE_ID_LEN];
    let read = File::open(path).and_then(|mut file| file.read_exact(&mut buf));
    match read {
        Ok(()) => WorkingParent::Parent(NodeId::new(buf)),
        Err(e) => {
            trace!(path = ?path, error = %e, "dirstate parent unavailable");
            WorkingParent::Unavailable
        }
    }
}
