//! Pin bookkeeping around one command execution
//!
//! [`CommandHook::run`] wraps a command:
//!
//! 1. snapshot the candidate pins and the persisted pinned set
//! 2. run the command; a failing command ends here and touches nothing
//! 3. recompute the candidates and keep the ones that newly appeared and
//!    are obsolete revisions
//! 4. drain the session's unpin requests
//! 5. write the store only if there is something to pin or release
//!
//! The persisted set used for the final write is always the one read under
//! the store lock. The unlocked snapshot only decides whether a write is
//! needed, and candidates that merely looked pinned in it are still passed
//! to the save so a concurrent saver cannot make them disappear.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::audit::AuditContext;
use crate::candidates::candidate_pins;
use crate::config::PinConfig;
use crate::error::PinError;
use crate::host::Repository;
use crate::store::PinStore;
use crate::types::{NodeId, SaveReport};
use crate::unpin::UnpinTracker;

/// Repository state captured before a command runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSnapshot {
    /// Candidate pins before the command
    pub candidates: BTreeSet<NodeId>,
    /// Persisted pinned set before the command, read without the lock
    pub pinned: BTreeSet<NodeId>,
}

/// What pin bookkeeping did for one command
#[derive(Debug)]
pub enum PinOutcome {
    /// No local repository, nothing tracked
    Skipped,
    /// Nothing to pin or release, no write
    Unchanged,
    /// The store was rewritten
    Saved(SaveReport),
    /// Bookkeeping failed; the command itself still succeeded
    Failed(PinError),
}

impl PinOutcome {
    /// The save report, if the store was written
    pub fn report(&self) -> Option<&SaveReport> {
        match self {
            PinOutcome::Saved(report) => Some(report),
            _ => None,
        }
    }
}

/// Result of a command run through [`CommandHook::run`]
#[derive(Debug)]
pub struct CommandOutcome<T> {
    /// What the command returned
    pub value: T,
    /// What pin bookkeeping did afterwards
    pub pins: PinOutcome,
}

/// Command wrapper maintaining the pinned-node store
#[derive(Debug, Clone)]
pub struct CommandHook {
    config: PinConfig,
    unpin: Arc<UnpinTracker>,
}

impl CommandHook {
    /// Hook sharing the session's unpin tracker
    pub fn new(config: PinConfig, unpin: Arc<UnpinTracker>) -> Self {
        Self { config, unpin }
    }

    /// Run `command` with pin bookkeeping around it
    ///
    /// Without a local repository the command runs unmodified. An `Err` from
    /// the command is returned as is and no bookkeeping happens. Bookkeeping
    /// failures never turn a successful command into a failure; they are
    /// reported in [`CommandOutcome::pins`].
    pub fn run<R, T, E, F>(&self, repo: Option<&mut R>, args: &[String], command: F) -> Result<CommandOutcome<T>, E>
    where
        R: Repository,
        F: FnOnce(Option<&mut R>) -> Result<T, E>,
    {
        let repo = match repo {
            Some(repo) if repo.is_local() => repo,
            other => {
                let value = command(other)?;
                return Ok(CommandOutcome {
                    value,
                    pins: PinOutcome::Skipped,
                });
            }
        };

        let snapshot = self.snapshot(&*repo);
        let value = command(Some(&mut *repo))?;
        let pins = self.finish(&*repo, snapshot, &AuditContext::new(args.iter().cloned()));
        Ok(CommandOutcome { value, pins })
    }

    /// Capture candidates and the persisted set before a command
    pub fn snapshot(&self, repo: &dyn Repository) -> CommandSnapshot {
        let store = PinStore::for_repo(repo, self.config.clone());
        let pinned = match store.load(repo) {
            Ok(nodes) => nodes.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "could not read pinned nodes, assuming none");
                BTreeSet::new()
            }
        };
        CommandSnapshot {
            candidates: candidate_pins(repo),
            pinned,
        }
    }

    /// Diff against `snapshot` after a command and save if needed
    #[instrument(skip_all, fields(command = ?audit.args))]
    pub fn finish(&self, repo: &dyn Repository, snapshot: CommandSnapshot, audit: &AuditContext) -> PinOutcome {
        let appeared: BTreeSet<NodeId> = candidate_pins(repo)
            .difference(&snapshot.candidates)
            .filter(|node| is_obsolete(repo, node))
            .copied()
            .collect();
        let newpin: BTreeSet<NodeId> = appeared.difference(&snapshot.pinned).copied().collect();
        let newunpin = self.unpin.drain();

        if newpin.is_empty() && newunpin.is_empty() {
            debug!("pinned nodes unchanged");
            return PinOutcome::Unchanged;
        }

        let store = PinStore::for_repo(repo, self.config.clone());
        // rewrite every appeared pin in case another process dropped one since the snapshot
        match store.save_reporting(repo, &appeared, &newunpin, &newpin, audit) {
            Ok(report) => PinOutcome::Saved(report),
            Err(e) => {
                warn!(error = %e, "pinned node bookkeeping skipped");
                // retried by the next command of this session
                self.unpin.mark_for_unpin(newunpin);
                PinOutcome::Failed(e)
            }
        }
    }
}

fn is_obsolete(repo: &dyn Repository, node: &NodeId) -> bool {
    repo.rev_of(node).is_some_and(|rev| repo.is_obsolete(rev))
}
