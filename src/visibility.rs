//! Revisions that must stay visible despite being hidden
//!
//! The answer combines the host's own pinned revisions, the persisted pinned
//! set and the session's pending unpins. Pending unpins take effect here
//! immediately, before any save has happened, so a revision released earlier
//! in the session is hidden for the rest of it.

use std::collections::BTreeSet;
use tracing::trace;

use crate::error::Result;
use crate::host::Repository;
use crate::store::PinStore;
use crate::types::RevisionNumber;
use crate::unpin::UnpinTracker;

/// `base ∪ rev(load() − pending unpins)`
///
/// Never takes the store lock. Identifiers the index no longer knows are
/// skipped.
pub fn pinned_revisions(
    repo: &dyn Repository,
    store: &PinStore,
    tracker: &UnpinTracker,
) -> Result<BTreeSet<RevisionNumber>> {
    let mut revs = repo.base_pinned_revs();
    let pending = tracker.snapshot();
    for node in store.load(repo)? {
        if pending.contains(&node) {
            trace!(%node, "pending unpin, not pinned");
            continue;
        }
        if let Some(rev) = repo.rev_of(&node) {
            revs.insert(rev);
        }
    }
    Ok(revs)
}
