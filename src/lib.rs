//! # nodepin - keep obsolete revisions visible while you use them
//!
//! A revision that has been rewritten or pruned becomes obsolete and is
//! normally hidden. That is inconvenient when the working copy still sits on
//! it or a bookmark still points at it. This crate tracks those revisions in
//! a small durable set of "pinned" identifiers and tells the host's
//! visibility computation to keep them visible, until a new obsolescence
//! marker or a rewrite releases them.
//!
//! ## Overview
//!
//! - **Candidates**: the working-copy parent and every bookmark target
//! - **Pinning**: after each successful command, candidates that newly
//!   appeared and are obsolete are added to the store
//! - **Unpinning**: precursors of new markers and rewritten nodes are queued
//!   for the session and removed at the end of the next command
//! - **Visibility**: persisted pins minus queued unpins, so a release takes
//!   effect immediately inside the session
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nodepin::{ExtensionPoints, MemoryRepository, PinTracker};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // One tracker per process session
//! let tracker = PinTracker::builder().build();
//!
//! // Let the host drive it through its extension points
//! let mut points = ExtensionPoints::new();
//! tracker.register(&mut points);
//!
//! let mut repo = MemoryRepository::new("/repo/.hg/store");
//! let args = vec!["hg".to_string(), "update".to_string()];
//! points.run_command(Some(&mut repo), &args, |_repo| Ok::<_, std::io::Error>(()))?;
//!
//! let visible = points.pinned_revisions(&repo)?;
//! println!("{} hidden revisions stay visible", visible.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Store Layout
//!
//! The pinned set is a flat file of 20-byte identifiers, `obsinhibit` in the
//! repository store directory, written only under its own lock file
//! `obsinhibit.lock` and always replaced atomically. See [`store`].
//!
//! ## Concurrency
//!
//! Commands run one at a time inside a process. Several processes may save
//! at once; the store lock serializes them and every save recomputes from
//! the file as read under the lock, so no process loses another's pins.
//! Reads never lock.
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result<T>`] with [`PinError`]. Bookkeeping
//! never fails a command: [`CommandHook::run`] reports problems through
//! [`PinOutcome::Failed`] and the next command recomputes everything.
//!
//! ## Module Organization
//!
//! - [`store`]: the durable pinned set
//! - [`lock`]: cross-process lock guarding the store
//! - [`candidates`]: which nodes should be pinned now
//! - [`unpin`]: session-scoped pending releases
//! - [`hook`]: bookkeeping around one command
//! - [`visibility`]: revisions kept visible
//! - [`extension`]: host hook slots
//! - [`tracker`]: session facade and builder
//! - [`host`]: traits the host implements
//! - [`memory`]: in-memory host for tests and tools
//! - [`audit`]: structured record of each save
//! - [`config`]: settings
//! - [`types`]: identifiers and reports
//! - [`error`]: error types

// Public API modules
pub mod audit;
pub mod candidates;
pub mod config;
pub mod error;
pub mod extension;
pub mod hook;
pub mod host;
pub mod lock;
pub mod memory;
pub mod store;
pub mod tracker;
pub mod types;
pub mod unpin;
pub mod visibility;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use audit::{AuditContext, AuditRecord};
pub use candidates::{candidate_pins, read_dirstate_parent};
pub use config::PinConfig;
pub use error::{PinError, Result};
pub use extension::{CleanupObserver, CommandObserver, ExtensionPoints, MarkerObserver, VisibilityExtension};
pub use hook::{CommandHook, CommandOutcome, CommandSnapshot, PinOutcome};
pub use host::{CleanupMapping, MarkerRelation, NodeIndex, Repository};
pub use lock::{LockStrategy, LockWait, ProcessLock, ProcessLockGuard};
pub use memory::MemoryRepository;
pub use store::{PinStore, StoreContents, StoreHealth};
pub use tracker::{PinTracker, PinTrackerBuilder};
pub use types::*;
pub use unpin::UnpinTracker;
pub use utils::atomic_write;
pub use visibility::pinned_revisions;
