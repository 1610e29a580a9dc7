use keystone_primitives::TagKey;
use pretty_assertions::assert_eq;

use super::*;
use crate::snapshot::SnapshotMode;
use crate::test_fixtures::{Block, block, blocks, key};
use crate::{Lifecycle, RegistryBuilder, ResourceKey};

fn ids(registry: &Registry<Block>) -> Vec<(ResourceKey, u32)> {
	registry.entries().iter().map(|e| (e.key().clone(), e.id())).collect()
}

#[test]
fn test_clear_and_reload_scenario() {
	let admin = RegistryAdmin::new();
	let registry = blocks();
	registry.register(key("a"), 0, block(1)).unwrap();
	registry.register(key("b"), 1, block(2)).unwrap();
	registry.add_alias(key("c"), key("a")).unwrap();
	assert_eq!(registry.resolve(&key("c")), key("a"));
	assert_eq!(registry.get_id(&key("c")), 0);

	let snapshot = registry.take_snapshot(SnapshotMode::Sync);
	registry.unfreeze(&admin, ClearScope::Full);
	registry.register(key("b"), 0, block(2)).unwrap();

	let missing = registry.apply_snapshot(&admin, &snapshot, true).unwrap();
	assert_eq!(missing, MissingKeys::from([key("a")]));
	assert_eq!(registry.get_id(&key("b")), 1);
	assert_eq!(registry.aliases(), vec![(key("c"), key("a"))]);
	assert!(registry.is_frozen());
}

#[test]
fn test_missing_keys_fail_before_mutation() {
	let admin = RegistryAdmin::new();
	let registry = blocks();
	registry.register(key("b"), 0, block(2)).unwrap();
	registry.add_alias(key("old_b"), key("b")).unwrap();
	let generation = registry.generation();

	let snapshot = RegistrySnapshot::new([(key("a"), 0), (key("b"), 1)], []);
	let err = registry.apply_snapshot(&admin, &snapshot, false).unwrap_err();
	assert_eq!(
		err,
		RegistryError::SnapshotApply {
			registry: key("block"),
			missing: vec![key("a")],
		}
	);
	assert_eq!(ids(&registry), vec![(key("b"), 0)]);
	assert_eq!(registry.aliases(), vec![(key("old_b"), key("b"))]);
	assert_eq!(registry.generation(), generation);
	assert!(!registry.is_frozen());
}

#[test]
fn test_unmentioned_entries_move_above_snapshot_ids() {
	let admin = RegistryAdmin::new();
	let registry = blocks();
	for (i, name) in ["x", "a", "y", "b"].into_iter().enumerate() {
		registry.register(key(name), i as u32, block(0)).unwrap();
	}
	let snapshot = RegistrySnapshot::new([(key("b"), 3), (key("a"), 7)], []);
	registry.apply_snapshot(&admin, &snapshot, false).unwrap();
	assert_eq!(
		ids(&registry),
		vec![(key("b"), 3), (key("a"), 7), (key("x"), 8), (key("y"), 9)]
	);
}

#[test]
fn test_snapshot_key_follows_live_alias() {
	let admin = RegistryAdmin::new();
	let registry = blocks();
	registry.register(key("granite"), 0, block(3)).unwrap();
	registry.add_alias(key("old_granite"), key("granite")).unwrap();
	let snapshot = RegistrySnapshot::new([(key("old_granite"), 5)], []);

	let missing = registry.apply_snapshot(&admin, &snapshot, false).unwrap();
	assert!(missing.is_empty());
	assert_eq!(registry.get_id(&key("granite")), 5);
	// Live aliases were cleared by the remap and the snapshot carried none.
	assert!(registry.aliases().is_empty());
}

#[test]
fn test_snapshot_ids_above_ceiling_are_rejected() {
	let admin = RegistryAdmin::new();
	let registry = RegistryBuilder::new(key("block")).max_id(3).build::<Block>();
	registry.register(key("a"), 0, block(0)).unwrap();
	let snapshot = RegistrySnapshot::new([(key("a"), 9)], []);
	let err = registry.apply_snapshot(&admin, &snapshot, true).unwrap_err();
	assert!(matches!(err, RegistryError::IdOutOfRange { id: 9, .. }));
	assert_eq!(registry.get_id(&key("a")), 0);
}

#[test]
fn test_full_snapshot_restores_exact_state() {
	let admin = RegistryAdmin::new();
	let registry = blocks();
	registry.register(key("stone"), 2, block(15)).unwrap();
	registry.register_with_lifecycle(key("glass"), 6, block(1), Lifecycle::Experimental).unwrap();
	registry.add_alias(key("rock"), key("stone")).unwrap();
	let tag = TagKey::parse("hard").unwrap();
	registry.bind_tags([(tag.clone(), vec![key("stone")])]);
	registry.freeze();

	let before = registry.entries();
	let full = registry.take_snapshot(SnapshotMode::Full);

	registry.unfreeze(&admin, ClearScope::Full);
	registry.register(key("mud"), 0, block(0)).unwrap();
	registry.add_alias(key("rock"), key("mud")).unwrap();

	let missing = registry.apply_snapshot(&admin, &full, false).unwrap();
	assert!(missing.is_empty());
	assert_eq!(registry.entries(), before);
	assert_eq!(registry.aliases(), vec![(key("rock"), key("stone"))]);
	assert_eq!(registry.tag(&tag), vec![key("stone")]);
	assert!(registry.is_frozen());
	assert!(Arc::ptr_eq(
		registry.get_value(&key("stone")).as_ref().unwrap(),
		before[0].value()
	));
}

#[test]
fn test_full_snapshot_of_other_type_is_rejected() {
	let admin = RegistryAdmin::new();
	let numbers = RegistryBuilder::new(key("number")).build::<u32>();
	numbers.register(key("one"), 1, 1).unwrap();
	let full = numbers.take_snapshot(SnapshotMode::Full);

	let registry = blocks();
	let err = registry.apply_snapshot(&admin, &full, true).unwrap_err();
	assert!(matches!(err, RegistryError::BackupTypeMismatch { .. }));
}

#[test]
fn test_missing_keys_keep_their_snapshot_ids() {
	let admin = RegistryAdmin::new();
	let registry = blocks();
	registry.register(key("a"), 0, block(1)).unwrap();
	registry.register(key("x"), 1, block(2)).unwrap();
	let snapshot = RegistrySnapshot::new([(key("a"), 0), (key("c"), 1)], []);

	let missing = registry.apply_snapshot(&admin, &snapshot, true).unwrap();
	assert_eq!(missing, MissingKeys::from([key("c")]));
	assert_eq!(ids(&registry), vec![(key("a"), 0), (key("x"), 2)]);
	assert!(registry.get_by_id(1).is_none());
}

#[test]
fn test_unmentioned_entries_above_ceiling_fail_before_mutation() {
	let admin = RegistryAdmin::new();
	let registry = RegistryBuilder::new(key("block")).max_id(2).build::<Block>();
	registry.register(key("a"), 0, block(1)).unwrap();
	registry.register(key("x"), 1, block(2)).unwrap();
	let snapshot = RegistrySnapshot::new([(key("a"), 0), (key("c"), 2)], []);

	assert!(matches!(
		registry.check_snapshot(&snapshot),
		Err(RegistryError::IdOutOfRange { id: 3, .. })
	));
	let err = registry.apply_snapshot(&admin, &snapshot, true).unwrap_err();
	assert!(matches!(err, RegistryError::IdOutOfRange { id: 3, .. }));
	assert_eq!(ids(&registry), vec![(key("a"), 0), (key("x"), 1)]);
	assert!(!registry.is_frozen());
}

#[test]
fn test_check_snapshot_reports_missing_without_mutation() {
	let registry = blocks();
	registry.register(key("a"), 0, block(1)).unwrap();
	let generation = registry.generation();
	let snapshot = RegistrySnapshot::new([(key("b"), 0), (key("a"), 1)], []);

	assert_eq!(registry.check_snapshot(&snapshot).unwrap(), MissingKeys::from([key("b")]));
	assert_eq!(ids(&registry), vec![(key("a"), 0)]);
	assert_eq!(registry.generation(), generation);
}
