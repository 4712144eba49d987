//! Configuration for the pin tracker
//!
//! [`PinConfig`] is plain data with serde support so hosts can keep it in a
//! JSON file next to their own settings. Durations are written in
//! `humantime` form (`"2s"`, `"50ms"`); the lock wait additionally accepts
//! `"once"` for a single non-blocking attempt.
//!
//! ```json
//! {
//!   "lock_wait": "2s",
//!   "retry_interval": "50ms",
//!   "lock_strategy": "auto",
//!   "audit_log": "/repo/.hg/blackbox-pins.jsonl"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{PinError, Result};
use crate::lock::{LockStrategy, LockWait};

/// Store file name, kept for compatibility with existing repositories
pub const DEFAULT_STORE_FILE: &str = "obsinhibit";

/// Lock file name guarding the store file
pub const DEFAULT_LOCK_FILE: &str = "obsinhibit.lock";

/// Back-off between lock attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// How long a saver waits for a concurrent saver by default
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(2);

/// Settings shared by the store, the lock and the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Store file name inside the repository store directory
    pub store_file: String,
    /// Lock file name inside the repository store directory
    pub lock_file: String,
    /// How long `save` waits for the lock
    pub lock_wait: LockWait,
    /// Back-off between lock attempts
    #[serde(with = "humantime_duration")]
    pub retry_interval: Duration,
    /// Locking primitive selection
    pub lock_strategy: LockStrategy,
    /// Optional JSON-lines file receiving one audit record per save
    pub audit_log: Option<PathBuf>,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            store_file: DEFAULT_STORE_FILE.to_string(),
            lock_file: DEFAULT_LOCK_FILE.to_string(),
            lock_wait: LockWait::Timeout(DEFAULT_LOCK_WAIT),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            lock_strategy: LockStrategy::Auto,
            audit_log: None,
        }
    }
}

impl PinConfig {
    /// Load a JSON config file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config: PinConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the store cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.store_file.is_empty() || self.lock_file.is_empty() {
            return Err(PinError::InvalidConfiguration(
                "store_file and lock_file must not be empty".to_string(),
            ));
        }
        if self.store_file == self.lock_file {
            return Err(PinError::InvalidConfiguration(
                "lock_file must differ from store_file".to_string(),
            ));
        }
        if self.retry_interval.is_zero() {
            return Err(PinError::InvalidConfiguration(
                "retry_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
