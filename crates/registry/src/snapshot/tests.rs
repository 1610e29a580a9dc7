use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::RegistryAdmin;
use crate::test_fixtures::{block, blocks, key};

#[test]
fn test_sync_snapshot_carries_ids_and_aliases() {
	let registry = blocks();
	registry.register(key("stone"), 0, block(1)).unwrap();
	registry.register(key("dirt"), 4, block(1)).unwrap();
	registry.add_alias(key("soil"), key("dirt")).unwrap();

	let snapshot = registry.take_snapshot(SnapshotMode::Sync);
	assert_eq!(snapshot.mode(), SnapshotMode::Sync);
	assert_eq!(snapshot.id_of(&key("dirt")), Some(4));
	assert_eq!(snapshot.highest_id(), Some(4));
	assert_eq!(snapshot.aliases().get(&key("soil")), Some(&key("dirt")));
	assert_eq!(snapshot.ids_by_id(), vec![(0, key("stone")), (4, key("dirt"))]);
}

#[test]
fn test_wire_format_is_sorted_varint_pairs() {
	let snapshot = RegistrySnapshot::new([(key("b"), 1), (key("a"), 300)], []);
	let bytes = snapshot.encode().unwrap();
	let mut expected = vec![2u8, 6];
	expected.extend_from_slice(b"core:a");
	expected.extend_from_slice(&[0xac, 0x02, 6]);
	expected.extend_from_slice(b"core:b");
	expected.extend_from_slice(&[1, 0]);
	assert_eq!(bytes.to_vec(), expected);
}

#[test]
fn test_encoding_is_cached_and_deterministic() {
	let registry = blocks();
	registry.register(key("stone"), 0, block(1)).unwrap();
	let snapshot = registry.take_snapshot(SnapshotMode::Sync);
	let first = snapshot.encode().unwrap();
	let second = snapshot.encode().unwrap();
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(registry.take_snapshot(SnapshotMode::Sync).encode().unwrap(), first);
}

#[test]
fn test_full_snapshot_refuses_to_encode() {
	let registry = blocks();
	registry.register(key("stone"), 0, block(1)).unwrap();
	let full = registry.take_snapshot(SnapshotMode::Full);
	assert_eq!(full.mode(), SnapshotMode::Full);
	assert!(matches!(full.encode(), Err(SnapshotError::FullBackup)));
	assert!(full.to_sync().encode().is_ok());
	assert_eq!(full.to_sync(), full);
}

#[test]
fn test_decode_rejects_shared_ids() {
	#[derive(serde::Serialize)]
	struct Raw {
		ids: Vec<(ResourceKey, u32)>,
		aliases: Vec<(ResourceKey, ResourceKey)>,
	}
	let bytes = postcard::to_stdvec(&Raw {
		ids: vec![(key("a"), 1), (key("b"), 1)],
		aliases: vec![],
	})
	.unwrap();
	assert!(matches!(
		RegistrySnapshot::decode(&bytes),
		Err(SnapshotError::DuplicateId { id: 1, .. })
	));
	assert!(matches!(RegistrySnapshot::decode(&[0xff]), Err(SnapshotError::Codec(_))));
}

#[test]
fn test_frozen_payload_round_trip() {
	let payload = FrozenRegistryPayload {
		registry: key("block"),
		snapshot: RegistrySnapshot::new([(key("a"), 0), (key("b"), 1)], [(key("c"), key("a"))]),
	};
	let bytes = payload.encode().unwrap();
	assert_eq!(FrozenRegistryPayload::decode(&bytes).unwrap(), payload);
}

proptest! {
	#[test]
	fn sync_snapshot_round_trips(names in proptest::collection::btree_set("[a-z]{1,8}", 0..24), order_seed in any::<u64>()) {
		let source = blocks();
		for name in &names {
			source.register_next(key(name), block(0)).unwrap();
		}
		let snapshot = source.take_snapshot(SnapshotMode::Sync);
		let decoded = RegistrySnapshot::decode(&snapshot.encode().unwrap()).unwrap();
		prop_assert_eq!(&decoded, &snapshot);

		// A registry holding the same keys in another order ends up with the
		// source's ids once the snapshot is applied.
		let mut shuffled: Vec<_> = names.iter().collect();
		let len = shuffled.len().max(1);
		shuffled.rotate_left((order_seed as usize) % len);
		let target = blocks();
		for name in shuffled {
			target.register_next(key(name), block(0)).unwrap();
		}
		let missing = target.apply_snapshot(&RegistryAdmin::new(), &decoded, false).unwrap();
		prop_assert!(missing.is_empty());
		for name in &names {
			prop_assert_eq!(target.get_id(&key(name)), source.get_id(&key(name)));
		}
	}
}
