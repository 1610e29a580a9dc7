use std::sync::Arc;

use keystone_registry::DataMapConfig;
use pretty_assertions::assert_eq;

use super::*;
use crate::kind::DataMapType;
use crate::loader::DataMapLoader;
use crate::map::DataMapAccess;
use crate::pack::{MemoryPack, PackSet};
use crate::test_fixtures::{Block, block_context, key};

fn declare(types: &mut DataMapTypes) -> (Arc<DataMapType<Block, u32>>, Arc<DataMapType<Block, u32>>, Arc<DataMapType<Block, u32>>) {
	let hardness = types
		.register(DataMapType::builder(key("hardness"), key("block")).synced(true).build())
		.unwrap();
	let glow = types
		.register(DataMapType::builder(key("glow"), key("block")).synced(false).build())
		.unwrap();
	let secret = types
		.register(DataMapType::builder(key("secret"), key("block")).build())
		.unwrap();
	(hardness, glow, secret)
}

#[test]
fn test_known_lists_synced_maps_only() {
	let mut types = DataMapTypes::new();
	let (hardness, glow, secret) = declare(&mut types);
	assert!(hardness.is_mandatory() && glow.is_synced() && !glow.is_mandatory() && !secret.is_synced());

	let known = types.known();
	assert_eq!(
		known.iter().map(|(r, id, m)| (r.clone(), id.clone(), m)).collect::<Vec<_>>(),
		vec![(key("block"), key("glow"), false), (key("block"), key("hardness"), true)]
	);
	assert_eq!(KnownDataMaps::decode(&known.encode().unwrap()).unwrap(), known);
}

#[test]
fn test_negotiation_reports_both_sides() {
	let mut ours = KnownDataMaps::new();
	ours.insert(key("block"), key("hardness"), true);
	ours.insert(key("block"), key("glow"), false);
	let mut theirs = KnownDataMaps::new();
	theirs.insert(key("block"), key("glow"), true);
	theirs.insert(key("item"), key("weight"), true);

	let err = negotiate(&ours, &theirs).unwrap_err();
	assert_eq!(err.missing_remote, vec![(key("block"), key("hardness"))]);
	assert_eq!(err.missing_local, vec![(key("item"), key("weight"))]);
	assert_eq!(
		err.to_string(),
		"mandatory data maps are missing\n  - core:hardness (core:block) on the remote side\n  - core:weight (core:item) on the local side"
	);

	theirs.insert(key("block"), key("hardness"), false);
	ours.insert(key("item"), key("weight"), false);
	ours.insert(key("item"), key("extra"), false);
	let common = negotiate(&ours, &theirs).unwrap();
	assert_eq!(common.len(), 3);
	assert!(common.is_mandatory(&key("block"), &key("glow")));
	assert!(!common.contains(&key("item"), &key("extra")));
}

#[test]
fn test_payloads_carry_accepted_tables_to_the_peer() {
	let mut types = DataMapTypes::new();
	let (hardness, glow, secret) = declare(&mut types);
	let types = Arc::new(types);

	let (server, _) = block_context();
	let packs = PackSet::new()
		.with(
			MemoryPack::new("server")
				.with_file(key("core:data_maps/block/hardness.json"), r##"{"values": {"#hard": 7}}"##)
				.with_file(key("core:data_maps/block/glow.json"), r#"{"values": {"dirt": 1}}"#)
				.with_file(key("core:data_maps/block/secret.json"), r#"{"values": {"dirt": 2}}"#),
		);
	DataMapLoader::new(types.clone(), &DataMapConfig::default())
		.load(&server, &packs)
		.unwrap();

	let mut accepted = KnownDataMaps::new();
	accepted.insert(key("block"), key("hardness"), true);
	accepted.insert(key("block"), key("secret"), false);
	let payloads = types.sync_payloads(&server, &accepted).unwrap();
	assert_eq!(payloads.len(), 1);
	assert_eq!(payloads[0].tables.keys().cloned().collect::<Vec<_>>(), vec![key("hardness")]);

	let (client, client_blocks) = block_context();
	DataMapLoader::new(types.clone(), &DataMapConfig::default())
		.load(&client, &PackSet::new())
		.unwrap();
	let wire = payloads[0].encode().unwrap();
	let applied = types
		.apply_sync_payload(&client, &DataMapSyncPayload::decode(&wire).unwrap())
		.unwrap();

	assert_eq!(applied, 1);
	assert_eq!(client_blocks.data(&hardness, &key("granite")), Some(7));
	assert_eq!(client_blocks.data(&hardness, &key("dirt")), None);
	assert!(client_blocks.data_map(&glow).is_some_and(|t| t.is_empty()));
	assert!(client_blocks.data_map(&secret).is_some());
}

#[test]
fn test_payload_for_unknown_registry_is_rejected() {
	let types = DataMapTypes::new();
	let (context, _) = block_context();
	let payload = DataMapSyncPayload {
		registry: key("item"),
		tables: BTreeMap::new(),
	};
	assert!(matches!(
		types.apply_sync_payload(&context, &payload),
		Err(DataMapError::UnknownRegistry(_))
	));
}
