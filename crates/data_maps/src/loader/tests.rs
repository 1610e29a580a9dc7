use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use keystone_registry::RegistryBuilder;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::file::Removal;
use crate::map::DataMapAccess;
use crate::merger::{ListMerger, SetMerger};
use crate::pack::{DirectoryPack, MemoryPack};
use crate::remover::{DataMapValueRemover, ValuesRemover};
use crate::test_fixtures::{Block, block_context, key, reference, values};

fn hardness() -> DataMapType<Block, u32> {
	DataMapType::builder(key("hardness"), key("block")).build()
}

fn tools() -> DataMapType<Block, Vec<String>> {
	DataMapType::builder(key("tools"), key("block"))
		.merger(ListMerger)
		.remover::<ValuesRemover<String>>()
		.build()
}

fn strings(items: &[&str]) -> Vec<String> {
	items.iter().map(|s| s.to_string()).collect()
}

fn as_pairs<A: Clone>(map: &DataMap<A>) -> Vec<(String, A)> {
	map.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn test_registry_folder_omits_default_namespace() {
	assert_eq!(registry_folder(&key("block")), "block");
	assert_eq!(registry_folder(&key("mod:gem")), "mod/gem");
}

#[test]
fn test_replace_discards_earlier_layers_and_later_ones_merge_on_top() {
	let (_context, registry) = block_context();
	let data_map = tools();
	let layer = |name: &str, replace: bool| values(false, [("stone", strings(&[name]), replace)]);

	let last = build_data_map(&data_map, &registry, [layer("x", false), layer("y", false), layer("z", true)]);
	assert_eq!(last.get(&key("stone")), Some(&strings(&["z"])));

	let first = build_data_map(&data_map, &registry, [layer("z", true), layer("x", false), layer("y", false)]);
	assert_eq!(first.get(&key("stone")), Some(&strings(&["z", "x", "y"])));

	let middle = build_data_map(&data_map, &registry, [layer("x", false), layer("z", true), layer("y", false)]);
	assert_eq!(middle.get(&key("stone")), Some(&strings(&["z", "y"])));
}

#[test]
fn test_merge_receives_layers_in_order() {
	let (_context, registry) = block_context();
	let data_map = tools();
	let layer = |name: &str| values(false, [("stone", strings(&[name]), false)]);

	let forward = build_data_map(&data_map, &registry, [layer("x"), layer("y")]);
	assert_eq!(forward.get(&key("stone")), Some(&strings(&["x", "y"])));
	let backward = build_data_map(&data_map, &registry, [layer("y"), layer("x")]);
	assert_eq!(backward.get(&key("stone")), Some(&strings(&["y", "x"])));

	let sets = DataMapType::<Block, BTreeSet<u32>>::builder(key("sets"), key("block"))
		.merger(SetMerger)
		.build();
	let layer = |n: u32| values(false, [("stone", BTreeSet::from([n, 9]), false)]);
	assert_eq!(
		build_data_map(&sets, &registry, [layer(1), layer(2)]),
		build_data_map(&sets, &registry, [layer(2), layer(1)])
	);
}

#[test]
fn test_file_replace_discards_earlier_layers() {
	let (_context, registry) = block_context();
	let data_map = hardness();
	let first = values(false, [("stone", 1, false), ("dirt", 2, false)]);
	let second = values(true, [("granite", 3, false)]);
	let table = build_data_map(&data_map, &registry, [first, second]);
	assert_eq!(as_pairs(&table), vec![("core:granite".to_string(), 3)]);
}

#[test]
fn test_references_resolve_tags_and_aliases() {
	let (_context, registry) = block_context();
	let data_map = hardness();
	let file = values(
		false,
		[("#hard", 1, false), ("rock", 2, false), ("missing", 3, false)],
	);
	let table = build_data_map(&data_map, &registry, [file]);
	assert_eq!(
		as_pairs(&table),
		vec![("core:granite".to_string(), 1), ("core:stone".to_string(), 2)]
	);
}

#[test]
fn test_placeholders_are_no_ops() {
	let (_context, registry) = block_context();
	let data_map = hardness();
	let mut file = values(false, [("stone", 1, false)]);
	file.values.push((reference("stone"), None));
	let table = build_data_map(&data_map, &registry, [file]);
	assert_eq!(table.get(&key("stone")), Some(&1));
}

#[test]
fn test_removals_total_and_partial() {
	let (_context, registry) = block_context();
	let data_map = tools();
	let base = values(
		false,
		[
			("stone", strings(&["pickaxe", "drill"]), false),
			("dirt", strings(&["shovel"]), false),
			("granite", strings(&["pickaxe"]), false),
		],
	);
	let removals = DataMapFile {
		replace: false,
		values: Vec::new(),
		removals: vec![
			Removal {
				source: reference("dirt"),
				remover: None,
			},
			Removal {
				source: reference("#hard"),
				remover: Some(Box::new(ValuesRemover::new(strings(&["pickaxe"])))),
			},
		],
	};
	let table = build_data_map(&data_map, &registry, [base, removals]);
	assert_eq!(
		as_pairs(&table),
		vec![("core:stone".to_string(), strings(&["drill"]))]
	);
}

/// Appends the source it is handed, to show which reference reaches it.
struct StampSource;

impl DataMapValueRemover<Block, Vec<String>> for StampSource {
	fn remove(&self, mut value: Vec<String>, _registry: &Registry<Block>, source: &TagOrKey, _entry: &Block) -> Option<Vec<String>> {
		value.push(source.to_string());
		Some(value)
	}
}

#[test]
fn test_remover_sees_the_source_of_the_accumulated_value() {
	let (_context, registry) = block_context();
	let data_map = tools();
	let base = values(false, [("#hard", strings(&["pickaxe"]), false)]);
	let removals = DataMapFile {
		replace: false,
		values: Vec::new(),
		removals: vec![Removal {
			source: reference("rock"),
			remover: Some(Box::new(StampSource)),
		}],
	};
	let table = build_data_map(&data_map, &registry, [base, removals]);
	assert_eq!(
		as_pairs(&table),
		vec![
			("core:granite".to_string(), strings(&["pickaxe"])),
			("core:stone".to_string(), strings(&["pickaxe", "#core:hard"])),
		]
	);
}

#[test]
fn test_defaults_fill_only_missing_entries() {
	let (_context, registry) = block_context();
	let data_map = DataMapType::<Block, u32>::builder(key("hardness"), key("block"))
		.default_value(|block| (block.hardness > 10).then_some(block.hardness * 2))
		.build();
	let table = build_data_map(&data_map, &registry, [values(false, [("stone", 1, false)])]);
	assert_eq!(
		as_pairs(&table),
		vec![("core:granite".to_string(), 60), ("core:stone".to_string(), 1)]
	);
}

fn write(root: &Path, relative: &str, contents: &str) {
	let path = root.join(relative);
	fs::create_dir_all(path.parent().unwrap()).unwrap();
	fs::write(path, contents).unwrap();
}

#[test]
fn test_load_layers_packs_and_skips_bad_sources() {
	let (context, registry) = block_context();
	let mut types = DataMapTypes::new();
	let hardness = types.register(hardness()).unwrap();
	let tools = types.register(tools()).unwrap();
	let loader = DataMapLoader::new(
		Arc::new(types),
		&DataMapConfig {
			threads: 2,
			..DataMapConfig::default()
		},
	);

	let dir = tempfile::tempdir().unwrap();
	write(dir.path(), "data/core/data_maps/block/hardness.json", r#"{"values": {"stone": 1, "dirt": 2}}"#);
	write(dir.path(), "data/core/data_maps/block/tools.json", "{ not json");
	write(dir.path(), "data/core/data_maps/block/unknown.json", r#"{"values": {"stone": 1}}"#);
	write(dir.path(), "data/core/data_maps/item/hardness.json", r#"{"values": {"stone": 1}}"#);
	write(dir.path(), "data/core/data_maps/block/notes.txt", "ignored");

	let overlay = MemoryPack::new("overlay")
		.with_file(
			key("core:data_maps/block/hardness.json"),
			r##"{"values": {"stone": {"value": 10, "replace": true}, "#core:hard": 3}, "remove": ["dirt"]}"##,
		)
		.with_file(key("core:data_maps/block/tools.json"), r#"{"values": {"granite": ["drill"]}}"#);
	let packs = PackSet::new()
		.with(DirectoryPack::new("base", dir.path()))
		.with(overlay);

	let collected = loader.collect(&context, &packs).unwrap();
	assert_eq!(collected.file_count(&key("block"), &key("hardness")), 2);
	assert_eq!(collected.file_count(&key("block"), &key("tools")), 1);
	assert_eq!(collected.file_count(&key("block"), &key("unknown")), 0);

	assert_eq!(loader.apply(&context, collected), 2);
	let table = registry.data_map(&hardness).unwrap();
	assert_eq!(
		as_pairs(&table),
		vec![("core:granite".to_string(), 3), ("core:stone".to_string(), 3)]
	);
	assert_eq!(registry.data(&hardness, &key("rock")), Some(3));
	assert_eq!(registry.data(&tools, &key("granite")), Some(strings(&["drill"])));
	assert_eq!(registry.data(&tools, &key("stone")), None);
}

#[test]
fn test_nested_registry_folders_route_to_the_longest_match() {
	let (context, _admin) = RegistryContext::new();
	let gems = context
		.add_extension_registry(RegistryBuilder::new(key("mod:gem")).build::<Block>())
		.unwrap();
	let mods = context
		.add_extension_registry(RegistryBuilder::new(key("mod")).build::<Block>())
		.unwrap();
	gems.register_next(key("mod:ruby"), Block { hardness: 8 }).unwrap();
	mods.register_next(key("mod:ruby"), Block { hardness: 1 }).unwrap();

	let mut types = DataMapTypes::new();
	let shine = types
		.register(DataMapType::<Block, u32>::builder(key("mod:shine"), key("mod:gem")).build())
		.unwrap();
	let loader = DataMapLoader::new(Arc::new(types), &DataMapConfig::default());
	let packs = PackSet::new().with(
		MemoryPack::new("mod").with_file(key("mod:data_maps/mod/gem/shine.json"), r#"{"values": {"mod:ruby": 4}}"#),
	);

	assert_eq!(loader.load(&context, &packs).unwrap(), 1);
	assert_eq!(gems.data(&shine, &key("mod:ruby")), Some(4));
	assert!(mods.data_map_ids().is_empty());
}

#[test]
fn test_declared_maps_without_sources_commit_defaults() {
	let (context, registry) = block_context();
	let mut types = DataMapTypes::new();
	let soft = types
		.register(
			DataMapType::<Block, bool>::builder(key("soft"), key("block"))
				.default_value(|block| Some(block.hardness < 10))
				.build(),
		)
		.unwrap();
	let loader = DataMapLoader::new(Arc::new(types), &DataMapConfig::default());
	assert_eq!(loader.load(&context, &PackSet::new()).unwrap(), 1);
	assert_eq!(registry.data(&soft, &key("dirt")), Some(true));
	assert_eq!(registry.data(&soft, &key("stone")), Some(false));
}

#[test]
fn test_duplicate_declarations_are_rejected() {
	let mut types = DataMapTypes::new();
	types.register(hardness()).unwrap();
	assert!(matches!(
		types.register(hardness()),
		Err(DataMapError::DuplicateType { .. })
	));
	assert_eq!(types.len(), 1);
}

proptest! {
	#[test]
	fn last_replace_wins_then_layers_append(layers in proptest::collection::vec((any::<bool>(), 0u32..100), 1..12)) {
		let (_context, registry) = block_context();
		let data_map = DataMapType::<Block, Vec<u32>>::builder(key("trail"), key("block"))
			.merger(ListMerger)
			.build();
		let files = layers.iter().map(|&(replace, n)| values(false, [("stone", vec![n], replace)]));
		let start = layers.iter().rposition(|(replace, _)| *replace).unwrap_or(0);
		let expected: Vec<u32> = layers[start..].iter().map(|&(_, n)| n).collect();

		let table = build_data_map(&data_map, &registry, files);
		prop_assert_eq!(table.get(&key("stone")), Some(&expected));
	}
}
