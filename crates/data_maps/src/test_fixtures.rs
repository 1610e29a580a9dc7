use std::sync::Arc;

use keystone_primitives::{ResourceKey, TagKey, TagOrKey};
use keystone_registry::{Registry, RegistryBuilder, RegistryContext};

use crate::file::{DataMapEntry, DataMapFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Block {
	pub(crate) hardness: u32,
}

pub(crate) fn key(raw: &str) -> ResourceKey {
	ResourceKey::parse(raw).unwrap()
}

pub(crate) fn tag(raw: &str) -> TagKey {
	TagKey::parse(raw).unwrap()
}

pub(crate) fn reference(raw: &str) -> TagOrKey {
	TagOrKey::parse(raw).unwrap()
}

pub(crate) fn blocks() -> Registry<Block> {
	RegistryBuilder::new(key("block")).sync(true).build()
}

/// `core:block` with `stone` (15), `dirt` (5) and `granite` (30), the alias
/// `rock -> stone` and the tag `#hard = [stone, granite]`, frozen.
pub(crate) fn block_context() -> (Arc<RegistryContext>, Arc<Registry<Block>>) {
	let (context, _admin) = RegistryContext::new();
	let registry = context.add_registry(blocks()).unwrap();
	for (name, hardness) in [("stone", 15), ("dirt", 5), ("granite", 30)] {
		registry.register_next(key(name), Block { hardness }).unwrap();
	}
	registry.add_alias(key("rock"), key("stone")).unwrap();
	registry.bind_tags([(tag("hard"), vec![key("stone"), key("granite")])]);
	registry.freeze();
	(context, registry)
}

/// A file of plain value directives.
pub(crate) fn values<A>(replace: bool, directives: impl IntoIterator<Item = (&'static str, A, bool)>) -> DataMapFile<Block, A> {
	DataMapFile {
		replace,
		values: directives
			.into_iter()
			.map(|(raw, value, replace)| (reference(raw), Some(DataMapEntry { value, replace })))
			.collect(),
		removals: Vec::new(),
	}
}
