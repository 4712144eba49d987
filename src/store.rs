//! Durable pinned-node store
//!
//! The pinned set lives in a flat binary file in the repository store
//! directory: a plain concatenation of 20-byte identifiers with no header,
//! count or separator.
//!
//! ```text
//! store_dir/
//! ├── obsinhibit        # N * 20 bytes, one identifier per record
//! └── obsinhibit.lock   # empty, only ever flock'ed
//! ```
//!
//! ## Reading
//!
//! Reads never take the lock. A missing file is an empty set, a trailing
//! fragment shorter than one record is ignored, and identifiers the host
//! index no longer knows are dropped.
//!
//! ## Writing
//!
//! Every write is a full load-modify-write cycle under one acquisition of
//! the dedicated [`ProcessLock`], finished by an atomic rename. Concurrent
//! savers in different processes are serialized and none of their updates
//! are lost.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::audit::{AuditContext, AuditRecord};
use crate::config::PinConfig;
use crate::error::Result;
use crate::host::{NodeIndex, Repository};
use crate::lock::ProcessLock;
use crate::types::{NodeId, SaveReport, NODE_ID_LEN};
use crate::utils;

/// Unfiltered parse of a store file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreContents {
    /// Complete records in file order, duplicates included
    pub records: Vec<NodeId>,
    /// Length of a trailing fragment shorter than one record
    pub trailing_bytes: usize,
}

impl StoreContents {
    /// Split raw file content into records
    pub fn parse(bytes: &[u8]) -> Self {
        let chunks = bytes.chunks_exact(NODE_ID_LEN);
        let trailing_bytes = chunks.remainder().len();
        let records = chunks.filter_map(NodeId::from_slice).collect();
        Self {
            records,
            trailing_bytes,
        }
    }

    /// Records with duplicates removed, first occurrence kept
    pub fn unique(&self) -> Vec<NodeId> {
        let mut seen = HashSet::with_capacity(self.records.len());
        self.records.iter().copied().filter(|n| seen.insert(*n)).collect()
    }
}

/// Shape report of a store file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreHealth {
    /// Complete records
    pub records: usize,
    /// Records repeating an earlier one
    pub duplicates: usize,
    /// Bytes after the last complete record
    pub trailing_bytes: usize,
}

impl StoreHealth {
    /// Whether the file is exactly a sequence of distinct records
    pub fn is_well_formed(&self) -> bool {
        self.duplicates == 0 && self.trailing_bytes == 0
    }
}

/// Handle on one repository's pinned-node file
#[derive(Debug, Clone)]
pub struct PinStore {
    dir: PathBuf,
    config: PinConfig,
}

impl PinStore {
    /// Store in `dir` using `config` for file names, locking and auditing
    pub fn new(dir: impl Into<PathBuf>, config: PinConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
        }
    }

    /// Store of a repository
    pub fn for_repo(repo: &dyn Repository, config: PinConfig) -> Self {
        Self::new(repo.store_dir(), config)
    }

    /// Path of the store file
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.config.store_file)
    }

    /// Path of the lock file
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(&self.config.lock_file)
    }

    /// Directory holding both files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read every record without consulting an index
    pub fn read_raw(&self) -> Result<StoreContents> {
        let bytes = utils::read_or_empty(&self.path())?;
        Ok(StoreContents::parse(&bytes))
    }

    /// Pinned identifiers still known to `index`, in file order
    pub fn load(&self, index: &dyn NodeIndex) -> Result<Vec<NodeId>> {
        let contents = self.read_raw()?;
        let nodes: Vec<NodeId> = contents
            .unique()
            .into_iter()
            .filter(|node| index.contains(node))
            .collect();
        if nodes.len() != contents.records.len() || contents.trailing_bytes > 0 {
            debug!(
                records = contents.records.len(),
                kept = nodes.len(),
                trailing_bytes = contents.trailing_bytes,
                "dropped stale pinned records"
            );
        }
        Ok(nodes)
    }

    /// Record, duplicate and fragment counts
    pub fn verify(&self) -> Result<StoreHealth> {
        let contents = self.read_raw()?;
        Ok(StoreHealth {
            records: contents.records.len(),
            duplicates: contents.records.len() - contents.unique().len(),
            trailing_bytes: contents.trailing_bytes,
        })
    }

    /// Persist `load() ∪ add − remove`
    ///
    /// The caller decides whether a save is needed at all; this always
    /// writes and always emits an audit record.
    ///
    /// # Errors
    ///
    /// - [`crate::PinError::LockHeld`] if another saver holds the lock for longer
    ///   than the configured wait
    /// - [`crate::PinError::Io`] if reading or replacing the file fails
    #[instrument(skip_all, fields(store = ?self.dir))]
    pub fn save(
        &self,
        index: &dyn NodeIndex,
        add: &BTreeSet<NodeId>,
        remove: &BTreeSet<NodeId>,
        audit: &AuditContext,
    ) -> Result<SaveReport> {
        self.save_reporting(index, add, remove, add, audit)
    }

    /// [`PinStore::save`] that reports `added` instead of `add`
    ///
    /// Callers that re-add identifiers they already saw pinned pass the
    /// genuinely new ones as `added`, so the report and the audit record
    /// list only those.
    pub(crate) fn save_reporting(
        &self,
        index: &dyn NodeIndex,
        add: &BTreeSet<NodeId>,
        remove: &BTreeSet<NodeId>,
        added: &BTreeSet<NodeId>,
        audit: &AuditContext,
    ) -> Result<SaveReport> {
        let _guard = self.lock("save pinned nodes").acquire()?;

        let before = self.load(index)?;
        let mut after: BTreeSet<NodeId> = before.iter().copied().collect();
        after.extend(add.iter().copied());
        after.retain(|node| !remove.contains(node));

        self.write(after.iter())?;

        let report = SaveReport {
            newpin: added.clone(),
            newunpin: remove.clone(),
            before,
            after,
        };
        AuditRecord::new(audit, &report).emit(self.config.audit_log.as_deref());
        Ok(report)
    }

    /// Rewrite the file without duplicates or a trailing fragment
    ///
    /// With an index, identifiers it does not know are dropped too.
    #[instrument(skip_all, fields(store = ?self.dir))]
    pub fn compact(&self, index: Option<&dyn NodeIndex>, audit: &AuditContext) -> Result<SaveReport> {
        let _guard = self.lock("compact pinned nodes").acquire()?;

        let contents = self.read_raw()?;
        let kept: Vec<NodeId> = contents
            .unique()
            .into_iter()
            .filter(|node| index.map_or(true, |index| index.contains(node)))
            .collect();

        self.write(kept.iter())?;

        let report = SaveReport {
            newpin: BTreeSet::new(),
            newunpin: contents
                .records
                .iter()
                .filter(|node| !kept.contains(node))
                .copied()
                .collect(),
            before: contents.records,
            after: kept.into_iter().collect(),
        };
        AuditRecord::new(audit, &report).emit(self.config.audit_log.as_deref());
        Ok(report)
    }

    fn lock(&self, description: &str) -> ProcessLock {
        ProcessLock::new(self.lock_path(), description)
            .wait(self.config.lock_wait)
            .retry_interval(self.config.retry_interval)
            .strategy(self.config.lock_strategy)
    }

    fn write<'a>(&self, nodes: impl Iterator<Item = &'a NodeId>) -> Result<()> {
        let bytes: Vec<u8> = nodes.flat_map(|node| node.as_bytes().iter().copied()).collect();
        utils::atomic_write(&self.path(), &bytes)
    }
}
