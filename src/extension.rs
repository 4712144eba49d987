//! Named hook slots exposed by the host
//!
//! Instead of wrapping host functions, subsystems register trait objects
//! into [`ExtensionPoints`] and the host calls the slot entry points at the
//! matching lifecycle moments:
//!
//! | Host moment              | Entry point                          | Slot                    |
//! |--------------------------|--------------------------------------|-------------------------|
//! | command dispatch         | [`ExtensionPoints::run_command`]     | [`CommandObserver`]     |
//! | visibility computation   | [`ExtensionPoints::pinned_revisions`]| [`VisibilityExtension`] |
//! | obsolescence markers     | [`ExtensionPoints::markers_created`] | [`MarkerObserver`]      |
//! | node cleanup / rewrite   | [`ExtensionPoints::nodes_cleaned`]   | [`CleanupObserver`]     |
//!
//! # Examples
//!
//! ```rust,no_run
//! use nodepin::{ExtensionPoints, MemoryRepository, PinTracker};
//!
//! let mut points = ExtensionPoints::new();
//! PinTracker::builder().build().register(&mut points);
//!
//! let mut repo = MemoryRepository::new("/repo/.hg/store");
//! let args = vec!["hg".to_string(), "update".to_string()];
//! let done: Result<(), String> = points.run_command(Some(&mut repo), &args, |_repo| Ok(()));
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::audit::AuditContext;
use crate::error::Result;
use crate::hook::{CommandHook, CommandSnapshot, PinOutcome};
use crate::host::{CleanupMapping, MarkerRelation, NodeIndex, Repository};
use crate::types::RevisionNumber;
use crate::unpin::UnpinTracker;

/// Observer around command execution
pub trait CommandObserver: Send + Sync {
    /// Called before the command runs
    ///
    /// Returning `None` opts out of [`Self::post_command`] for this run.
    fn pre_command(&self, repo: &dyn Repository) -> Option<CommandSnapshot>;

    /// Called after the command succeeded
    fn post_command(&self, repo: &dyn Repository, snapshot: CommandSnapshot, audit: &AuditContext) -> PinOutcome;
}

/// Contributor to the set of revisions kept visible
pub trait VisibilityExtension: Send + Sync {
    /// Add revisions to `revs`, which starts as the host's own set
    fn extend_pinned(&self, repo: &dyn Repository, revs: &mut BTreeSet<RevisionNumber>) -> Result<()>;
}

/// Observer of obsolescence marker creation
pub trait MarkerObserver: Send + Sync {
    /// Markers for `relations` were just created
    fn markers_created(&self, index: &dyn NodeIndex, relations: &[MarkerRelation]);
}

/// Observer of node cleanup after a rewrite
pub trait CleanupObserver: Send + Sync {
    /// Nodes in `mapping` were replaced by their values
    fn nodes_cleaned(&self, mapping: &CleanupMapping);
}

/// Registered extensions, one list per slot
#[derive(Default, Clone)]
pub struct ExtensionPoints {
    command: Vec<Arc<dyn CommandObserver>>,
    visibility: Vec<Arc<dyn VisibilityExtension>>,
    markers: Vec<Arc<dyn MarkerObserver>>,
    cleanup: Vec<Arc<dyn CleanupObserver>>,
}

impl fmt::Debug for ExtensionPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionPoints")
            .field("command", &self.command.len())
            .field("visibility", &self.visibility.len())
            .field("markers", &self.markers.len())
            .field("cleanup", &self.cleanup.len())
            .finish()
    }
}

impl ExtensionPoints {
    /// No registered extensions
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap every command run through [`ExtensionPoints::run_command`]
    pub fn register_command_observer(&mut self, observer: Arc<dyn CommandObserver>) {
        self.command.push(observer);
    }

    /// Contribute to [`ExtensionPoints::pinned_revisions`]
    pub fn register_visibility(&mut self, extension: Arc<dyn VisibilityExtension>) {
        self.visibility.push(extension);
    }

    /// Notify on every batch of new obsolescence markers
    pub fn register_marker_observer(&mut self, observer: Arc<dyn MarkerObserver>) {
        self.markers.push(observer);
    }

    /// Notify on every cleanup that replaces or removes nodes
    pub fn register_cleanup_observer(&mut self, observer: Arc<dyn CleanupObserver>) {
        self.cleanup.push(observer);
    }

    /// Run a command with every command observer around it
    ///
    /// A failing command skips all post-command work.
    pub fn run_command<R, T, E, F>(&self, repo: Option<&mut R>, args: &[String], command: F) -> std::result::Result<T, E>
    where
        R: Repository,
        F: FnOnce(Option<&mut R>) -> std::result::Result<T, E>,
    {
        let Some(repo) = repo else {
            return command(None);
        };

        let snapshots: Vec<Option<CommandSnapshot>> =
            self.command.iter().map(|observer| observer.pre_command(&*repo)).collect();
        let value = command(Some(&mut *repo))?;

        let audit = AuditContext::new(args.iter().cloned());
        for (observer, snapshot) in self.command.iter().zip(snapshots) {
            if let Some(snapshot) = snapshot {
                observer.post_command(&*repo, snapshot, &audit);
            }
        }
        Ok(value)
    }

    /// Host base set extended by every visibility extension
    pub fn pinned_revisions(&self, repo: &dyn Repository) -> Result<BTreeSet<RevisionNumber>> {
        let mut revs = repo.base_pinned_revs();
        for extension in &self.visibility {
            extension.extend_pinned(repo, &mut revs)?;
        }
        Ok(revs)
    }

    /// Forward newly created markers to every marker observer
    pub fn markers_created(&self, index: &dyn NodeIndex, relations: &[MarkerRelation]) {
        for observer in &self.markers {
            observer.markers_created(index, relations);
        }
    }

    /// Forward a cleanup mapping to every cleanup observer
    pub fn nodes_cleaned(&self, mapping: &CleanupMapping) {
        for observer in &self.cleanup {
            observer.nodes_cleaned(mapping);
        }
    }
}

impl CommandObserver for CommandHook {
    fn pre_command(&self, repo: &dyn Repository) -> Option<CommandSnapshot> {
        repo.is_local().then(|| self.snapshot(repo))
    }

    fn post_command(&self, repo: &dyn Repository, snapshot: CommandSnapshot, audit: &AuditContext) -> PinOutcome {
        self.finish(repo, snapshot, audit)
    }
}

impl MarkerObserver for UnpinTracker {
    fn markers_created(&self, index: &dyn NodeIndex, relations: &[MarkerRelation]) {
        self.record_markers(index, relations);
    }
}

impl CleanupObserver for UnpinTracker {
    fn nodes_cleaned(&self, mapping: &CleanupMapping) {
        self.record_cleanup(mapping);
    }
}
