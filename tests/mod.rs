//! Main test module for nodepin
//!
//! This module includes all test suites:
//! - Integration tests for whole command sessions
//! - Chaos tests for concurrent savers and damaged stores
//! - Property-based tests for store and tracker invariants

pub mod chaos;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::nodepin::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn node(byte: u8) -> NodeId {
        NodeId::new([byte; NODE_ID_LEN])
    }

    #[test]
    fn test_store_dir_created_on_first_save() {
        let temp_dir = TempDir::new().unwrap();
        let store_dir = temp_dir.path().join(".hg").join("store");
        let mut repo = MemoryRepository::new(&store_dir);
        repo.add_node(node(1));
        let store = PinStore::for_repo(&repo, PinConfig::default());

        assert!(store.load(&repo).unwrap().is_empty());
        // the lock creates its parent directory
        store
            .save(&repo, &BTreeSet::from([node(1)]), &BTreeSet::new(), &AuditContext::default())
            .unwrap();
        assert_eq!(store.load(&repo).unwrap(), vec![node(1)]);
        assert_eq!(fs::metadata(store.lock_path()).unwrap().len(), 0);
    }

    #[test]
    fn test_truncated_record_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = MemoryRepository::new(temp_dir.path());
        repo.add_node(node(4));
        let store = PinStore::for_repo(&repo, PinConfig::default());

        let mut bytes = node(4).as_bytes().to_vec();
        bytes.extend_from_slice(&node(5).as_bytes()[..13]);
        fs::write(store.path(), bytes).unwrap();

        assert_eq!(store.load(&repo).unwrap(), vec![node(4)]);
    }

    #[test]
    fn test_null_working_parent_is_not_pinned() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = MemoryRepository::new(temp_dir.path());
        repo.add_node(NodeId::NULL);
        repo.obsolete(&NodeId::NULL);
        let tracker = PinTracker::builder().build();

        let args = vec!["hg".to_string(), "update".to_string(), "null".to_string()];
        let outcome = tracker
            .command_hook()
            .run(Some(&mut repo), &args, |repo| {
                if let Some(repo) = repo {
                    repo.set_working_parent(WorkingParent::Parent(NodeId::NULL));
                }
                Ok::<_, PinError>(())
            })
            .unwrap();

        assert!(matches!(outcome.pins, PinOutcome::Unchanged));
    }

    #[test]
    fn test_dirstate_parent_feeds_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let dirstate = temp_dir.path().join("dirstate");
        let mut content = node(8).as_bytes().to_vec();
        content.extend_from_slice(NodeId::NULL.as_bytes());
        fs::write(&dirstate, content).unwrap();

        let mut repo = MemoryRepository::new(temp_dir.path());
        repo.set_working_parent(read_dirstate_parent(&dirstate));
        assert_eq!(candidate_pins(&repo), BTreeSet::from([node(8)]));

        fs::remove_file(&dirstate).unwrap();
        repo.set_working_parent(read_dirstate_parent(&dirstate));
        assert!(candidate_pins(&repo).is_empty());
    }

    #[test]
    fn test_config_file_drives_tracker() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("nodepin.json");
        fs::write(
            &config_path,
            r#"{"store_file": "pins", "lock_file": "pins.lock", "lock_wait": "once"}"#,
        )?;

        let config = PinConfig::load(&config_path)?;
        let tracker = PinTrackerBuilder::from_config(config).try_build()?;
        let repo = MemoryRepository::new(temp_dir.path());
        let store = tracker.store_for(&repo);
        assert_eq!(store.path(), temp_dir.path().join("pins"));
        assert_eq!(tracker.config().lock_wait, LockWait::Once);
        Ok(())
    }

    #[test]
    fn test_audit_log_in_missing_directory_does_not_fail_save() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = MemoryRepository::new(temp_dir.path());
        repo.add_node(node(1));
        let config = PinConfig {
            audit_log: Some(temp_dir.path().join("missing").join("audit.jsonl")),
            ..Default::default()
        };
        let store = PinStore::for_repo(&repo, config);

        store
            .save(&repo, &BTreeSet::from([node(1)]), &BTreeSet::new(), &AuditContext::default())
            .unwrap();
        assert_eq!(store.load(&repo).unwrap(), vec![node(1)]);
    }
}
