//! Session facade
//!
//! A [`PinTracker`] is created once per process session. It owns the
//! configuration and the single [`UnpinTracker`] every other component
//! shares, and hands out the per-repository pieces.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::PinConfig;
use crate::error::Result;
use crate::extension::{ExtensionPoints, VisibilityExtension};
use crate::hook::CommandHook;
use crate::host::{CleanupMapping, MarkerRelation, NodeIndex, Repository};
use crate::lock::{LockStrategy, LockWait};
use crate::store::PinStore;
use crate::types::RevisionNumber;
use crate::unpin::UnpinTracker;
use crate::visibility;

/// Pin tracking for one process session
///
/// Cloning is cheap and clones share the same pending unpins.
///
/// # Examples
///
/// ```rust
/// use nodepin::{MemoryRepository, NodeId, PinTracker, WorkingParent};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::TempDir::new()?;
/// let mut repo = MemoryRepository::new(dir.path());
/// let node = NodeId::new([7; 20]);
/// repo.add_node(node);
/// repo.obsolete(&node);
///
/// let tracker = PinTracker::builder().build();
/// let hook = tracker.command_hook();
/// let args = vec!["hg".to_string(), "update".to_string()];
/// hook.run(Some(&mut repo), &args, |repo| {
///     if let Some(repo) = repo {
///         repo.set_working_parent(WorkingParent::Parent(node));
///     }
///     Ok::<_, std::io::Error>(())
/// })?;
///
/// assert_eq!(tracker.store_for(&repo).load(&repo)?, vec![node]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PinTracker {
    config: PinConfig,
    unpin: Arc<UnpinTracker>,
}

impl PinTracker {
    /// Tracker with `config` and an empty unpin set
    pub fn new(config: PinConfig) -> Self {
        Self {
            config,
            unpin: Arc::new(UnpinTracker::new()),
        }
    }

    /// Builder starting from the default configuration
    pub fn builder() -> PinTrackerBuilder {
        PinTrackerBuilder::new()
    }

    /// Configuration shared by every store this tracker opens
    pub fn config(&self) -> &PinConfig {
        &self.config
    }

    /// The session's pending unpins
    pub fn unpin_tracker(&self) -> &Arc<UnpinTracker> {
        &self.unpin
    }

    /// Store of `repo`
    pub fn store_for(&self, repo: &dyn Repository) -> PinStore {
        PinStore::for_repo(repo, self.config.clone())
    }

    /// Command wrapper sharing this session's unpins
    pub fn command_hook(&self) -> CommandHook {
        CommandHook::new(self.config.clone(), self.unpin.clone())
    }

    /// Queue unpins for the precursors in `relations`
    pub fn markers_created(&self, index: &dyn NodeIndex, relations: &[MarkerRelation]) {
        self.unpin.record_markers(index, relations);
    }

    /// Queue unpins for every node `mapping` rewrites
    pub fn nodes_cleaned(&self, mapping: &CleanupMapping) {
        self.unpin.record_cleanup(mapping);
    }

    /// See [`visibility::pinned_revisions`]
    pub fn pinned_revisions(&self, repo: &dyn Repository) -> Result<BTreeSet<RevisionNumber>> {
        visibility::pinned_revisions(repo, &self.store_for(repo), &self.unpin)
    }

    /// Register into every slot of `points`
    pub fn register(&self, points: &mut ExtensionPoints) {
        points.register_command_observer(Arc::new(self.command_hook()));
        points.register_visibility(Arc::new(self.clone()));
        points.register_marker_observer(self.unpin.clone());
        points.register_cleanup_observer(self.unpin.clone());
        debug!("pin tracking registered");
    }
}

impl VisibilityExtension for PinTracker {
    fn extend_pinned(&self, repo: &dyn Repository, revs: &mut BTreeSet<RevisionNumber>) -> Result<()> {
        revs.extend(self.pinned_revisions(repo)?);
        Ok(())
    }
}

/// Builder for [`PinTracker`]
///
/// # Default Values
///
/// - `store_file`: `obsinhibit`
/// - `lock_file`: `obsinhibit.lock`
/// - `lock_wait`: 2 seconds
/// - `retry_interval`: 50 milliseconds
/// - `lock_strategy`: [`LockStrategy::Auto`]
/// - `audit_log`: none
///
/// # Examples
///
/// ```rust
/// use nodepin::{LockWait, PinTracker};
///
/// let tracker = PinTracker::builder()
///     .lock_wait(LockWait::Once)
///     .audit_log("/tmp/pins.jsonl")
///     .build();
/// assert_eq!(tracker.config().lock_wait, LockWait::Once);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PinTrackerBuilder {
    config: PinConfig,
}

impl PinTrackerBuilder {
    /// Builder with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: PinConfig) -> Self {
        Self { config }
    }

    /// How long a save waits for the store lock
    pub fn lock_wait(mut self, wait: LockWait) -> Self {
        self.config.lock_wait = wait;
        self
    }

    /// Pause between lock attempts
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    /// Primitive used for the store lock
    pub fn lock_strategy(mut self, strategy: LockStrategy) -> Self {
        self.config.lock_strategy = strategy;
        self
    }

    /// Store file name inside the repository store directory
    pub fn store_file(mut self, name: impl Into<String>) -> Self {
        self.config.store_file = name.into();
        self
    }

    /// Lock file name inside the repository store directory
    pub fn lock_file(mut self, name: impl Into<String>) -> Self {
        self.config.lock_file = name.into();
        self
    }

    /// Also append audit records to this JSON-lines file
    pub fn audit_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.audit_log = Some(path.into());
        self
    }

    /// Build without validating the configuration
    pub fn build(self) -> PinTracker {
        PinTracker::new(self.config)
    }

    /// Build after checking the configuration
    pub fn try_build(self) -> Result<PinTracker> {
        self.config.validate()?;
        Ok(self.build())
    }
}
