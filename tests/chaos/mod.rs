//! Chaos testing for nodepin
//!
//! Concurrent savers, readers racing writers, stale lock markers and
//! damaged store files. Threads stand in for processes: each acquisition
//! opens its own lock file description, so flock excludes them the same way.

use ::nodepin::*;
use std::collections::BTreeSet;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;

fn node(byte: u8) -> NodeId {
    NodeId::new([byte; NODE_ID_LEN])
}

fn patient_config() -> PinConfig {
    PinConfig {
        lock_wait: LockWait::Timeout(Duration::from_secs(10)),
        retry_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

fn repo_with(dir: &TempDir, count: u8) -> MemoryRepository {
    let mut repo = MemoryRepository::new(dir.path());
    for byte in 1..=count {
        repo.add_node(node(byte));
    }
    repo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_savers_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(repo_with(&dir, 2));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [node(1), node(2)]
            .into_iter()
            .map(|id| {
                let repo = repo.clone();
                let barrier = barrier.clone();
                let store = PinStore::new(dir.path(), patient_config());
                thread::spawn(move || {
                    barrier.wait();
                    store
                        .save(&*repo, &BTreeSet::from([id]), &BTreeSet::new(), &AuditContext::default())
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = PinStore::new(dir.path(), patient_config());
        let stored: BTreeSet<NodeId> = store.load(&*repo).unwrap().into_iter().collect();
        assert_eq!(stored, BTreeSet::from([node(1), node(2)]));
    }

    #[test]
    fn many_savers_many_rounds() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(repo_with(&dir, 32));

        let handles: Vec<_> = (0..8u8)
            .map(|worker| {
                let repo = repo.clone();
                let store = PinStore::new(dir.path(), patient_config());
                thread::spawn(move || {
                    for round in 0..4u8 {
                        let id = node(worker * 4 + round + 1);
                        store
                            .save(&*repo, &BTreeSet::from([id]), &BTreeSet::new(), &AuditContext::default())
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = PinStore::new(dir.path(), patient_config());
        assert_eq!(store.load(&*repo).unwrap().len(), 32);
        assert!(store.verify().unwrap().is_well_formed());
        info!("32 concurrent saves serialized");
    }

    #[test]
    fn readers_never_see_partial_records() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(repo_with(&dir, 50));
        let store = PinStore::new(dir.path(), patient_config());
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let repo = repo.clone();
            let store = store.clone();
            let done = done.clone();
            thread::spawn(move || {
                for byte in 1..=50u8 {
                    let remove = if byte % 3 == 0 {
                        BTreeSet::from([node(byte - 1)])
                    } else {
                        BTreeSet::new()
                    };
                    store
                        .save(&*repo, &BTreeSet::from([node(byte)]), &remove, &AuditContext::default())
                        .unwrap();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let path = store.path();
        let mut observed = 0usize;
        while !done.load(Ordering::SeqCst) {
            if let Ok(bytes) = fs::read(&path) {
                assert_eq!(bytes.len() % NODE_ID_LEN, 0, "torn read of {} bytes", bytes.len());
                observed += 1;
            }
        }
        writer.join().unwrap();
        info!(observed, "reads raced the writer");

        // no temp files left behind next to the store
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name != "obsinhibit" && name != "obsinhibit.lock")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
    }

    #[test]
    fn held_lock_blocks_save_but_not_reads() {
        let dir = TempDir::new().unwrap();
        let repo = repo_with(&dir, 2);
        let store = PinStore::new(
            dir.path(),
            PinConfig {
                lock_wait: LockWait::Timeout(Duration::from_millis(150)),
                ..Default::default()
            },
        );
        store
            .save(&repo, &BTreeSet::from([node(1)]), &BTreeSet::new(), &AuditContext::default())
            .unwrap();

        let _held = ProcessLock::new(store.lock_path(), "long running saver")
            .acquire()
            .unwrap();

        let error = store
            .save(&repo, &BTreeSet::from([node(2)]), &BTreeSet::new(), &AuditContext::default())
            .unwrap_err();
        assert!(error.is_recoverable());
        assert_eq!(store.load(&repo).unwrap(), vec![node(1)]);
    }

    #[cfg(unix)]
    #[test]
    fn stale_marker_does_not_wedge_marker_strategy() {
        let dir = TempDir::new().unwrap();
        let repo = repo_with(&dir, 1);
        let config = PinConfig {
            lock_strategy: LockStrategy::Marker,
            lock_wait: LockWait::Once,
            ..Default::default()
        };
        let store = PinStore::new(dir.path(), config);

        // left behind by a process that no longer exists
        let marker = dir.path().join("obsinhibit.lock.d");
        fs::create_dir(&marker).unwrap();
        fs::write(marker.join("pid"), "999999999").unwrap();

        store
            .save(&repo, &BTreeSet::from([node(1)]), &BTreeSet::new(), &AuditContext::default())
            .unwrap();
        assert!(!marker.exists());
        assert_eq!(store.load(&repo).unwrap(), vec![node(1)]);
    }

    #[test]
    fn damaged_store_is_repaired_by_next_save() {
        let dir = TempDir::new().unwrap();
        let repo = repo_with(&dir, 3);
        let store = PinStore::new(dir.path(), patient_config());

        let mut bytes = Vec::new();
        for id in [node(1), node(9), node(1)] {
            bytes.extend_from_slice(id.as_bytes());
        }
        bytes.extend_from_slice(&[0xab; 7]);
        fs::write(store.path(), bytes).unwrap();
        assert!(!store.verify().unwrap().is_well_formed());

        store
            .save(&repo, &BTreeSet::from([node(3)]), &BTreeSet::new(), &AuditContext::default())
            .unwrap();
        assert!(store.verify().unwrap().is_well_formed());
        assert_eq!(store.read_raw().unwrap().records, vec![node(1), node(3)]);
    }
}
