//! Alias table: redirects from retired keys to their replacements.
//!
//! # Invariants
//!
//! - The edge graph is acyclic. [`AliasTable::insert`] walks the chain from
//!   the new target and refuses any edge whose target already leads back to
//!   its source, so resolution always terminates.
//! - Resolution stops at the first key the caller reports as live, so a key
//!   that is both aliased and registered resolves to itself.

use std::collections::BTreeMap;

use keystone_primitives::ResourceKey;

use crate::error::RegistryError;

#[derive(Debug, Clone, Default)]
pub(crate) struct AliasTable {
	edges: BTreeMap<ResourceKey, ResourceKey>,
}

/// What [`AliasTable::insert`] did with an edge that raised no error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AliasInsert {
	Added,
	/// Self-alias, or an exact repeat of an existing edge.
	Ignored,
}

impl AliasTable {
	pub(crate) fn insert(
		&mut self,
		registry: &ResourceKey,
		from: ResourceKey,
		to: ResourceKey,
	) -> Result<AliasInsert, RegistryError> {
		if from == to {
			return Ok(AliasInsert::Ignored);
		}
		if let Some(existing) = self.edges.get(&from) {
			if *existing == to {
				return Ok(AliasInsert::Ignored);
			}
			return Err(RegistryError::DuplicateAlias {
				registry: registry.clone(),
				from,
				existing: existing.clone(),
				requested: to,
			});
		}
		if self.chain(&to).any(|hop| *hop == from) {
			return Err(RegistryError::AliasCycle {
				registry: registry.clone(),
				from,
				to,
			});
		}
		self.edges.insert(from, to);
		Ok(AliasInsert::Added)
	}

	/// Follows edges from `key` until reaching a live key or a dead end.
	pub(crate) fn resolve(&self, key: &ResourceKey, is_live: impl Fn(&ResourceKey) -> bool) -> ResourceKey {
		let mut current = key;
		for _ in 0..=self.edges.len() {
			if is_live(current) {
				break;
			}
			match self.edges.get(current) {
				Some(next) => current = next,
				None => break,
			}
		}
		current.clone()
	}

	pub(crate) fn get(&self, from: &ResourceKey) -> Option<&ResourceKey> {
		self.edges.get(from)
	}

	pub(crate) fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &ResourceKey)> {
		self.edges.iter()
	}

	pub(crate) fn clear(&mut self) {
		self.edges.clear();
	}

	/// Every key reachable from `start` by following edges, `start` included.
	fn chain<'a>(&'a self, start: &'a ResourceKey) -> impl Iterator<Item = &'a ResourceKey> + 'a {
		let bound = self.edges.len() + 1;
		std::iter::successors(Some(start), move |k| self.edges.get(*k)).take(bound)
	}
}
