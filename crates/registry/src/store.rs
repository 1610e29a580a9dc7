//! Core of a registry: the id table, key index, aliases and tags.
//!
//! [`EntryStore`] is plain data. [`crate::Registry`] wraps it in a lock and
//! owns every side effect (callbacks, generation bumps, logging).

use std::collections::BTreeMap;
use std::sync::Arc;

use keystone_primitives::{ResourceKey, TagKey};
use rustc_hash::FxHashMap;

use crate::alias::{AliasInsert, AliasTable};
use crate::entry::{Entry, Lifecycle};
use crate::error::RegistryError;

pub(crate) struct EntryStore<T> {
	by_id: BTreeMap<u32, Entry<T>>,
	by_key: FxHashMap<ResourceKey, u32>,
	/// Highest id handed out since the last full clear or remap.
	last_id: Option<u32>,
	aliases: AliasTable,
	tags: FxHashMap<TagKey, Vec<ResourceKey>>,
}

impl<T> Default for EntryStore<T> {
	fn default() -> Self {
		Self {
			by_id: BTreeMap::new(),
			by_key: FxHashMap::default(),
			last_id: None,
			aliases: AliasTable::default(),
			tags: FxHashMap::default(),
		}
	}
}

impl<T> EntryStore<T> {
	pub(crate) fn insert(
		&mut self,
		registry: &ResourceKey,
		max_id: u32,
		key: ResourceKey,
		id: u32,
		value: Arc<T>,
		lifecycle: Lifecycle,
	) -> Result<Entry<T>, RegistryError> {
		if self.by_key.contains_key(&key) {
			return Err(RegistryError::DuplicateKey {
				registry: registry.clone(),
				key,
			});
		}
		if id > max_id {
			return Err(RegistryError::IdOutOfRange {
				registry: registry.clone(),
				key,
				id,
				max_id,
			});
		}
		if let Some(last) = self.last_id
			&& id <= last
		{
			return Err(RegistryError::NonMonotonicId {
				registry: registry.clone(),
				key,
				id,
				last,
			});
		}
		let entry = Entry::new(key.clone(), id, value, lifecycle);
		self.by_key.insert(key, id);
		self.by_id.insert(id, entry.clone());
		self.last_id = Some(id);
		Ok(entry)
	}

	/// The id [`Self::insert`] would accept next.
	pub(crate) fn next_id(&self) -> u32 {
		self.last_id.map_or(0, |last| last.saturating_add(1))
	}

	pub(crate) fn add_alias(
		&mut self,
		registry: &ResourceKey,
		from: ResourceKey,
		to: ResourceKey,
	) -> Result<AliasInsert, RegistryError> {
		self.aliases.insert(registry, from, to)
	}

	pub(crate) fn resolve(&self, key: &ResourceKey) -> ResourceKey {
		self.aliases.resolve(key, |k| self.by_key.contains_key(k))
	}

	/// Lookup by exact key, without alias resolution.
	pub(crate) fn get_exact(&self, key: &ResourceKey) -> Option<&Entry<T>> {
		self.by_key.get(key).and_then(|id| self.by_id.get(id))
	}

	pub(crate) fn get(&self, key: &ResourceKey) -> Option<&Entry<T>> {
		match self.get_exact(key) {
			Some(entry) => Some(entry),
			None if self.aliases.get(key).is_some() => self.get_exact(&self.resolve(key)),
			None => None,
		}
	}

	pub(crate) fn get_by_id(&self, id: u32) -> Option<&Entry<T>> {
		self.by_id.get(&id)
	}

	pub(crate) fn contains_exact(&self, key: &ResourceKey) -> bool {
		self.by_key.contains_key(key)
	}

	pub(crate) fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Entries in ascending id order.
	pub(crate) fn entries(&self) -> impl Iterator<Item = &Entry<T>> {
		self.by_id.values()
	}

	pub(crate) fn aliases(&self) -> &AliasTable {
		&self.aliases
	}

	pub(crate) fn clear_aliases(&mut self) {
		self.aliases.clear();
	}

	pub(crate) fn clear_all(&mut self) {
		*self = Self::default();
	}

	pub(crate) fn set_tags(&mut self, tags: FxHashMap<TagKey, Vec<ResourceKey>>) {
		self.tags = tags;
	}

	pub(crate) fn tag(&self, tag: &TagKey) -> Option<&[ResourceKey]> {
		self.tags.get(tag).map(Vec::as_slice)
	}

	pub(crate) fn tags(&self) -> impl Iterator<Item = (&TagKey, &Vec<ResourceKey>)> {
		self.tags.iter()
	}
}
