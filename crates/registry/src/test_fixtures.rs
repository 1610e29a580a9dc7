use std::sync::Arc;

use crate::{Registry, RegistryAdmin, RegistryBuilder, RegistryContext, ResourceKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Block {
	pub(crate) hardness: u32,
}

pub(crate) fn block(hardness: u32) -> Block {
	Block { hardness }
}

pub(crate) fn key(raw: &str) -> ResourceKey {
	ResourceKey::parse(raw).unwrap()
}

pub(crate) fn blocks() -> Registry<Block> {
	RegistryBuilder::new(key("block")).sync(true).build()
}

/// A context holding one built-in `core:block` registry with `stone` (0) and
/// `dirt` (1) registered, before `finish_builtins`.
pub(crate) fn block_context() -> (Arc<RegistryContext>, RegistryAdmin, Arc<Registry<Block>>) {
	let (context, admin) = RegistryContext::new();
	let registry = context.add_registry(blocks()).unwrap();
	registry.register(key("stone"), 0, block(15)).unwrap();
	registry.register(key("dirt"), 1, block(5)).unwrap();
	(context, admin, registry)
}
