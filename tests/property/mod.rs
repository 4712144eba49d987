//! Property-based testing for nodepin
//!
//! Uses proptest to check store and tracker invariants across randomly
//! generated identifier sets and file contents.

use ::nodepin::*;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use tempfile::TempDir;

/// Generate random identifiers
fn node_strategy() -> impl Strategy<Value = NodeId> {
    prop::array::uniform20(any::<u8>()).prop_map(NodeId::new)
}

/// Generate small sets of identifiers
fn node_set_strategy() -> impl Strategy<Value = BTreeSet<NodeId>> {
    prop::collection::btree_set(node_strategy(), 0..16)
}

/// Repository that knows every identifier in `nodes`
fn repo_knowing<'a>(dir: &TempDir, nodes: impl IntoIterator<Item = &'a NodeId>) -> MemoryRepository {
    let mut repo = MemoryRepository::new(dir.path());
    for node in nodes {
        repo.add_node(*node);
    }
    repo
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Whatever was saved is what loads back
        #[test]
        fn saved_set_loads_back(nodes in node_set_strategy()) {
            let dir = TempDir::new().unwrap();
            let repo = repo_knowing(&dir, &nodes);
            let store = PinStore::new(dir.path(), PinConfig::default());

            let report = store.save(&repo, &nodes, &BTreeSet::new(), &AuditContext::default()).unwrap();
            prop_assert_eq!(&report.after, &nodes);

            let loaded: BTreeSet<NodeId> = store.load(&repo).unwrap().into_iter().collect();
            prop_assert_eq!(loaded, nodes.clone());
            let len = fs::metadata(store.path()).unwrap().len() as usize;
            prop_assert_eq!(len, nodes.len() * NODE_ID_LEN);
        }

        /// Saving the same additions twice equals saving them once
        #[test]
        fn union_is_idempotent(first in node_set_strategy(), second in node_set_strategy()) {
            let dir = TempDir::new().unwrap();
            let repo = repo_knowing(&dir, first.iter().chain(&second));
            let store = PinStore::new(dir.path(), PinConfig::default());
            let audit = AuditContext::default();

            store.save(&repo, &first, &BTreeSet::new(), &audit).unwrap();
            let once = fs::read(store.path()).unwrap();
            store.save(&repo, &first, &BTreeSet::new(), &audit).unwrap();
            prop_assert_eq!(fs::read(store.path()).unwrap(), once);

            store.save(&repo, &second, &BTreeSet::new(), &audit).unwrap();
            let loaded: BTreeSet<NodeId> = store.load(&repo).unwrap().into_iter().collect();
            let expected: BTreeSet<NodeId> = first.union(&second).copied().collect();
            prop_assert_eq!(loaded, expected);
        }

        /// Removals always win over additions in the same save
        #[test]
        fn removal_wins(add in node_set_strategy(), remove in node_set_strategy()) {
            let dir = TempDir::new().unwrap();
            let repo = repo_knowing(&dir, add.iter().chain(&remove));
            let store = PinStore::new(dir.path(), PinConfig::default());

            let report = store.save(&repo, &add, &remove, &AuditContext::default()).unwrap();
            prop_assert!(report.after.is_disjoint(&remove));
            prop_assert!(report.after.is_subset(&add));
        }

        /// A save merges into the existing set and the index filters what loads back
        #[test]
        fn save_then_load_round_trip(
            base in node_set_strategy(),
            add in node_set_strategy(),
            remove in node_set_strategy(),
            strip in prop::collection::vec(any::<bool>(), 48),
        ) {
            let dir = TempDir::new().unwrap();
            let all: BTreeSet<NodeId> = base.iter().chain(&add).chain(&remove).copied().collect();
            let known: BTreeSet<NodeId> = all
                .iter()
                .zip(strip.iter().cycle())
                .filter(|(_, stripped)| !**stripped)
                .map(|(node, _)| *node)
                .collect();
            let repo = repo_knowing(&dir, &known);
            let store = PinStore::new(dir.path(), PinConfig::default());

            // seeded directly so unknown identifiers reach the file
            let seed: Vec<u8> = base.iter().flat_map(|node| node.as_bytes().to_vec()).collect();
            fs::write(store.path(), seed).unwrap();

            let report = store.save(&repo, &add, &remove, &AuditContext::default()).unwrap();
            let merged: BTreeSet<NodeId> = base.union(&add).copied().collect();
            let expected: BTreeSet<NodeId> = merged
                .difference(&remove)
                .filter(|node| known.contains(node))
                .copied()
                .collect();

            let loaded: BTreeSet<NodeId> = store.load(&repo).unwrap().into_iter().collect();
            prop_assert_eq!(&loaded, &expected);
            prop_assert!(report.after.is_disjoint(&remove));
            prop_assert!(report.after.iter().all(|node| known.contains(node) || add.contains(node)));
        }

        /// Any byte content parses into whole records plus a short remainder
        #[test]
        fn arbitrary_content_parses(bytes in prop::collection::vec(any::<u8>(), 0..200)) {
            let contents = StoreContents::parse(&bytes);
            prop_assert_eq!(contents.records.len(), bytes.len() / NODE_ID_LEN);
            prop_assert_eq!(contents.trailing_bytes, bytes.len() % NODE_ID_LEN);
            prop_assert!(contents.unique().len() <= contents.records.len());
        }

        /// Marking in several batches equals marking the union once
        #[test]
        fn unpin_batches_merge(batches in prop::collection::vec(node_set_strategy(), 0..6)) {
            let tracker = UnpinTracker::new();
            let mut expected = BTreeSet::new();
            for batch in &batches {
                tracker.mark_for_unpin(batch.iter().copied());
                expected.extend(batch.iter().copied());
            }
            prop_assert_eq!(tracker.drain(), expected);
            prop_assert!(tracker.is_empty());
        }

        /// Hex text round-trips and the short form is its prefix
        #[test]
        fn hex_forms(node in node_strategy()) {
            let text = node.to_hex();
            prop_assert_eq!(text.len(), 40);
            prop_assert_eq!(text.parse::<NodeId>().unwrap(), node);
            prop_assert!(text.starts_with(&node.short()));
        }
    }
}
