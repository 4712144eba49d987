//! Audit trail for pin store writes
//!
//! Every successful save produces one [`AuditRecord`]. It is always emitted
//! as a structured `tracing` event with the message `pinnednodes`, and is
//! additionally appended as one JSON object per line when an audit log file
//! is configured, in the spirit of a blackbox log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::types::{short_forms, SaveReport};

/// What triggered a save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    /// Full argument vector of the originating command
    pub args: Vec<String>,
}

impl AuditContext {
    /// Context for a command invocation
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// One audit line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the save completed
    pub timestamp: DateTime<Utc>,
    /// Argument vector of the command that caused the save
    pub command: Vec<String>,
    /// Short forms of identifiers newly pinned
    pub newpin: Vec<String>,
    /// Short forms of identifiers requested to be released
    pub newunpin: Vec<String>,
    /// Short forms of the pinned set before the save
    pub before: Vec<String>,
    /// Short forms of the pinned set after the save
    pub after: Vec<String>,
}

impl AuditRecord {
    /// Build the record for a completed save
    pub fn new(context: &AuditContext, report: &SaveReport) -> Self {
        Self {
            timestamp: Utc::now(),
            command: context.args.clone(),
            newpin: short_forms(&report.newpin),
            newunpin: short_forms(&report.newunpin),
            before: short_forms(&report.before),
            after: short_forms(&report.after),
        }
    }

    /// Log the record, and append it to `log_path` when one is configured
    ///
    /// A failure to append is logged, never returned: the save it describes
    /// has already been committed.
    pub fn emit(&self, log_path: Option<&Path>) {
        info!(
            command = ?self.command,
            newpin = ?self.newpin,
            newunpin = ?self.newunpin,
            before = ?self.before,
            after = ?self.after,
            "pinnednodes"
        );

        if let Some(path) = log_path {
            if let Err(e) = self.append_to(path) {
                warn!(path = ?path, error = %e, "failed to append audit record");
            }
        }
    }

    fn append_to(&self, path: &Path) -> crate::error::Result<()> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&line)?;
        Ok(())
    }
}
