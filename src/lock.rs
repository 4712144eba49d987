//! Cross-process lock dedicated to the pin store
//!
//! The pin store is guarded by its own small lock file instead of the
//! repository-wide lock, so long-running repository operations and pin
//! bookkeeping never wait on each other.
//!
//! ## Primitives
//!
//! - **flock** (default): an advisory `flock(LOCK_EX | LOCK_NB)` through
//!   `fs2` on the lock file. The lock file is created on first use and never
//!   written, truncated or removed.
//! - **marker directory** (fallback): when the filesystem does not support
//!   `flock`, exclusivity comes from an atomic `create_dir` of
//!   `<lockfile>.d`. The holder's pid is written inside so a marker left by
//!   a crashed process can be reclaimed. Reclaimers take `<lockfile>.d.reclaim`
//!   first and move the dead marker aside with a rename before deleting it.
//!
//! ## Hazard
//!
//! `flock` locks belong to the open file description. Taking this lock twice
//! from one process works by accident in some layouts and releasing the
//! inner guard may then release the outer one. At most one acquisition per
//! process may be outstanding at a time; [`crate::PinStore`] only takes it for
//! the duration of a single save.

use fs2::FileExt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::config::DEFAULT_RETRY_INTERVAL;
use crate::error::{PinError, Result};

/// Age after which an unfinished reclaim is considered interrupted
const RECLAIM_GRACE: Duration = Duration::from_secs(10);

static DISCARD_SEQ: AtomicUsize = AtomicUsize::new(0);

/// How long [`ProcessLock::acquire`] keeps trying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWait {
    /// One non-blocking attempt
    Once,
    /// Retry with a fixed back-off until the duration has elapsed
    Timeout(Duration),
}

impl Serialize for LockWait {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            LockWait::Once => serializer.serialize_str("once"),
            LockWait::Timeout(limit) => {
                serializer.serialize_str(&humantime::format_duration(*limit).to_string())
            }
        }
    }
}

impl<'de> Deserialize<'de> for LockWait {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text == "once" {
            return Ok(LockWait::Once);
        }
        humantime::parse_duration(&text)
            .map(LockWait::Timeout)
            .map_err(serde::de::Error::custom)
    }
}

/// Which primitive provides exclusivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// flock, falling back to a marker directory where flock is unsupported
    #[default]
    Auto,
    /// flock only
    Flock,
    /// marker directory only
    Marker,
}

/// A lock request: where, why, and how patiently
#[derive(Debug, Clone)]
pub struct ProcessLock {
    path: PathBuf,
    description: String,
    wait: LockWait,
    retry_interval: Duration,
    strategy: LockStrategy,
}

enum Backend {
    Flock(File),
    Marker(PathBuf),
}

enum Step {
    Acquired,
    Contended(i32),
    Fallback(io::Error),
    Reclaimed,
}

impl ProcessLock {
    /// New request for a single attempt with the default primitive
    pub fn new(path: impl Into<PathBuf>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            wait: LockWait::Once,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            strategy: LockStrategy::Auto,
        }
    }

    /// Set how long to keep trying
    pub fn wait(mut self, wait: LockWait) -> Self {
        self.wait = wait;
        self
    }

    /// Set the back-off between attempts
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Select the locking primitive
    pub fn strategy(mut self, strategy: LockStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock
    ///
    /// # Errors
    ///
    /// - [`PinError::LockHeld`] if another holder kept it for the whole wait
    /// - [`PinError::Io`] if the lock file cannot be created or locked
    pub fn acquire(&self) -> Result<ProcessLockGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut backend = match self.strategy {
            LockStrategy::Marker => Backend::Marker(marker_path(&self.path)),
            LockStrategy::Auto | LockStrategy::Flock => Backend::Flock(open_lock_file(&self.path)?),
        };

        let start = Instant::now();
        loop {
            let step = match &backend {
                Backend::Flock(file) => match FileExt::try_lock_exclusive(file) {
                    Ok(()) => Step::Acquired,
                    Err(e) if is_contended(&e) => Step::Contended(e.raw_os_error().unwrap_or(0)),
                    Err(e) if self.strategy == LockStrategy::Auto && is_unsupported(&e) => {
                        Step::Fallback(e)
                    }
                    Err(e) => return Err(e.into()),
                },
                Backend::Marker(marker) => try_marker(marker)?,
            };

            match step {
                Step::Acquired => {
                    debug!(path = ?self.path, description = %self.description, "lock acquired");
                    return Ok(ProcessLockGuard {
                        path: self.path.clone(),
                        backend: Some(backend),
                    });
                }
                Step::Fallback(e) => {
                    warn!(path = ?self.path, error = %e, "flock unsupported, using marker directory");
                    backend = Backend::Marker(marker_path(&self.path));
                }
                Step::Reclaimed => {}
                Step::Contended(errno) => match self.wait {
                    LockWait::Timeout(limit) if start.elapsed() < limit => {
                        trace!(path = ?self.path, "lock busy, retrying");
                        thread::sleep(self.retry_interval);
                    }
                    _ => {
                        return Err(PinError::LockHeld {
                            path: self.path.clone(),
                            description: self.description.clone(),
                            errno,
                        })
                    }
                },
            }
        }
    }
}

/// Held lock; released when dropped
pub struct ProcessLockGuard {
    path: PathBuf,
    backend: Option<Backend>,
}

impl ProcessLockGuard {
    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the marker-directory fallback is in use
    pub fn is_marker(&self) -> bool {
        matches!(self.backend, Some(Backend::Marker(_)))
    }
}

impl std::fmt::Debug for ProcessLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLockGuard")
            .field("path", &self.path)
            .field("marker", &self.is_marker())
            .finish()
    }
}

impl Drop for ProcessLockGuard {
    fn drop(&mut self) {
        match self.backend.take() {
            Some(Backend::Flock(file)) => {
                if let Err(e) = FileExt::unlock(&file) {
                    warn!(path = ?self.path, error = %e, "failed to unlock");
                }
            }
            Some(Backend::Marker(marker)) => {
                if let Err(e) = fs::remove_dir_all(&marker) {
                    warn!(path = ?marker, error = %e, "failed to remove lock marker");
                }
            }
            None => return,
        }
        debug!(path = ?self.path, "lock released");
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    // append + create never truncates an existing lock file
    Ok(OpenOptions::new().append(true).create(true).open(path)?)
}

fn marker_path(path: &Path) -> PathBuf {
    suffixed(path, ".d")
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn try_marker(marker: &Path) -> Result<Step> {
    try_marker_with(marker, |dir| fs::write(dir.join("pid"), std::process::id().to_string()))
}

fn try_marker_with(marker: &Path, write_pid: impl FnOnce(&Path) -> io::Result<()>) -> Result<Step> {
    match fs::create_dir(marker) {
        Ok(()) => {
            if let Err(e) = write_pid(marker) {
                // a marker without a pid can never be judged stale
                let _ = fs::remove_dir_all(marker);
                return Err(e.into());
            }
            Ok(Step::Acquired)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let errno = e.raw_os_error().unwrap_or(0);
            match marker_owner(marker) {
                Some(pid) if !pid_alive(pid) => reclaim_marker(marker, errno),
                _ => Ok(Step::Contended(errno)),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove a marker whose owner died
///
/// Reclaimers serialize through `<marker>.reclaim`. Only a reclaimer can
/// replace a marker that is still present, so the owner read under that
/// guard is the owner of the directory that gets removed.
fn reclaim_marker(marker: &Path, errno: i32) -> Result<Step> {
    let guard = suffixed(marker, ".reclaim");
    match fs::create_dir(&guard) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if is_abandoned(&guard) {
                warn!(path = ?guard, "removing reclaim marker left by an interrupted reclaim");
                discard(&guard)?;
                return Ok(Step::Reclaimed);
            }
            return Ok(Step::Contended(errno));
        }
        Err(e) => return Err(e.into()),
    }

    let result = match marker_owner(marker) {
        Some(pid) if !pid_alive(pid) => {
            warn!(path = ?marker, pid, "reclaiming lock marker left by a dead process");
            discard(marker)
        }
        // released or reclaimed meanwhile, so try again at once
        None if !marker.exists() => Ok(true),
        // taken again by a live holder
        _ => Ok(false),
    };
    if let Err(e) = fs::remove_dir(&guard) {
        warn!(path = ?guard, error = %e, "failed to remove reclaim marker");
    }
    if result? {
        Ok(Step::Reclaimed)
    } else {
        Ok(Step::Contended(errno))
    }
}

/// Move `dir` out of the way under a unique name, then delete it
///
/// Returns `false` when another process moved or replaced it first.
fn discard(dir: &Path) -> Result<bool> {
    let seq = DISCARD_SEQ.fetch_add(1, Ordering::Relaxed);
    let claimed = suffixed(dir, &format!(".stale.{}.{}", std::process::id(), seq));
    match fs::rename(dir, &claimed) {
        Ok(()) => {}
        Err(e) if is_reclaim_race(&e) => return Ok(false),
        Err(e) => return Err(e.into()),
    }
    if let Err(e) = fs::remove_dir_all(&claimed) {
        warn!(path = ?claimed, error = %e, "failed to remove reclaimed marker");
    }
    Ok(true)
}

fn is_abandoned(guard: &Path) -> bool {
    fs::metadata(guard)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > RECLAIM_GRACE)
}

fn is_reclaim_race(e: &io::Error) -> bool {
    if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::AlreadyExists) {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(e.raw_os_error(), Some(code) if code == libc::ENOTEMPTY || code == libc::EEXIST)
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Pid recorded in a marker
///
/// A marker without a readable pid is still being set up by its owner.
fn marker_owner(marker: &Path) -> Option<u32> {
    let text = fs::read_to_string(marker.join("pid")).ok()?;
    text.trim().parse().ok()
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    if pid == std::process::id() {
        return true;
    }
    let rc = unsafe { libc::kill(pid as i32, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn is_unsupported(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::Unsupported {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(e.raw_os_error(), Some(code) if code == libc::ENOLCK || code == libc::EOPNOTSUPP)
    }
    #[cfg(not(unix))]
    {
        false
    }
}
