//! Point-in-time captures of a registry's id table.
//!
//! A [`SnapshotMode::Sync`] snapshot holds only the `key -> id` table and the
//! alias table, and can be encoded for the wire or for saves. A
//! [`SnapshotMode::Full`] snapshot additionally pins every live entry so the
//! registry can be rebuilt exactly; it never leaves the process.
//!
//! # Wire format
//!
//! postcard encoding of `{ ids: [(key, id)], aliases: [(from, to)] }`, both
//! lists sorted by key (namespace, then path). Keys are strings and ids are
//! varints, so the encoding is compact and deterministic.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use keystone_primitives::{ResourceKey, TagKey};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::SnapshotError;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotMode {
	/// Ids and aliases only.
	Sync,
	/// Ids, aliases and a backup of every live entry.
	Full,
}

/// Where a snapshot being applied came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotOrigin {
	/// A save on local storage.
	Local,
	/// A peer over the network.
	Remote,
}

/// Live state pinned by a full snapshot.
pub(crate) struct FullBackup<T> {
	pub(crate) entries: Vec<Entry<T>>,
	pub(crate) tags: Vec<(TagKey, Vec<ResourceKey>)>,
}

#[derive(Clone)]
pub struct RegistrySnapshot {
	ids: BTreeMap<ResourceKey, u32>,
	aliases: BTreeMap<ResourceKey, ResourceKey>,
	backup: Option<Arc<dyn Any + Send + Sync>>,
	encoded: OnceLock<Arc<[u8]>>,
}

impl RegistrySnapshot {
	/// Builds a sync-mode snapshot from raw tables.
	pub fn new(
		ids: impl IntoIterator<Item = (ResourceKey, u32)>,
		aliases: impl IntoIterator<Item = (ResourceKey, ResourceKey)>,
	) -> Self {
		Self {
			ids: ids.into_iter().collect(),
			aliases: aliases.into_iter().collect(),
			backup: None,
			encoded: OnceLock::new(),
		}
	}

	pub fn mode(&self) -> SnapshotMode {
		if self.backup.is_some() {
			SnapshotMode::Full
		} else {
			SnapshotMode::Sync
		}
	}

	pub fn ids(&self) -> &BTreeMap<ResourceKey, u32> {
		&self.ids
	}

	pub fn aliases(&self) -> &BTreeMap<ResourceKey, ResourceKey> {
		&self.aliases
	}

	pub fn id_of(&self, key: &ResourceKey) -> Option<u32> {
		self.ids.get(key).copied()
	}

	/// `(id, key)` pairs in ascending id order.
	pub fn ids_by_id(&self) -> Vec<(u32, ResourceKey)> {
		let mut out: Vec<_> = self.ids.iter().map(|(k, &id)| (id, k.clone())).collect();
		out.sort_unstable_by_key(|(id, _)| *id);
		out
	}

	pub fn highest_id(&self) -> Option<u32> {
		self.ids.values().copied().max()
	}

	/// The same tables with the entry backup dropped.
	pub fn to_sync(&self) -> Self {
		Self {
			ids: self.ids.clone(),
			aliases: self.aliases.clone(),
			backup: None,
			encoded: self.encoded.clone(),
		}
	}

	pub(crate) fn backup(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
		self.backup.as_ref()
	}

	/// Encodes the id and alias tables. The result is cached.
	pub fn encode(&self) -> Result<Arc<[u8]>, SnapshotError> {
		if self.backup.is_some() {
			return Err(SnapshotError::FullBackup);
		}
		if let Some(bytes) = self.encoded.get() {
			return Ok(bytes.clone());
		}
		let bytes: Arc<[u8]> = postcard::to_stdvec(&WireRef {
			ids: &self.ids,
			aliases: &self.aliases,
		})?
		.into();
		Ok(self.encoded.get_or_init(|| bytes).clone())
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
		let wire: Wire = postcard::from_bytes(bytes)?;
		let snapshot = wire.into_snapshot()?;
		let _ = snapshot.encoded.set(Arc::from(bytes));
		Ok(snapshot)
	}
}

/// Snapshots compare by their tables; the backup is ignored.
impl PartialEq for RegistrySnapshot {
	fn eq(&self, other: &Self) -> bool {
		self.ids == other.ids && self.aliases == other.aliases
	}
}

impl Eq for RegistrySnapshot {}

impl fmt::Debug for RegistrySnapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegistrySnapshot")
			.field("mode", &self.mode())
			.field("ids", &self.ids)
			.field("aliases", &self.aliases)
			.finish()
	}
}

#[derive(Serialize)]
struct WireRef<'a> {
	ids: &'a BTreeMap<ResourceKey, u32>,
	aliases: &'a BTreeMap<ResourceKey, ResourceKey>,
}

#[derive(Deserialize)]
struct Wire {
	ids: Vec<(ResourceKey, u32)>,
	aliases: Vec<(ResourceKey, ResourceKey)>,
}

impl Wire {
	fn into_snapshot(self) -> Result<RegistrySnapshot, SnapshotError> {
		let mut ids = BTreeMap::new();
		let mut by_id: FxHashMap<u32, ResourceKey> = FxHashMap::default();
		for (key, id) in self.ids {
			if let Some(first) = by_id.get(&id) {
				return Err(SnapshotError::DuplicateId {
					id,
					first: first.clone(),
					second: key,
				});
			}
			if ids.contains_key(&key) {
				return Err(SnapshotError::DuplicateKey(key));
			}
			by_id.insert(id, key.clone());
			ids.insert(key, id);
		}
		let mut aliases = BTreeMap::new();
		for (from, to) in self.aliases {
			if aliases.insert(from.clone(), to).is_some() {
				return Err(SnapshotError::DuplicateKey(from));
			}
		}
		Ok(RegistrySnapshot {
			ids,
			aliases,
			backup: None,
			encoded: OnceLock::new(),
		})
	}
}

/// A registry's sync snapshot labelled with the registry it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenRegistryPayload {
	pub registry: ResourceKey,
	pub snapshot: RegistrySnapshot,
}

#[derive(Serialize)]
struct PayloadRef<'a> {
	registry: &'a ResourceKey,
	ids: &'a BTreeMap<ResourceKey, u32>,
	aliases: &'a BTreeMap<ResourceKey, ResourceKey>,
}

#[derive(Deserialize)]
struct PayloadWire {
	registry: ResourceKey,
	ids: Vec<(ResourceKey, u32)>,
	aliases: Vec<(ResourceKey, ResourceKey)>,
}

impl FrozenRegistryPayload {
	pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
		if self.snapshot.backup.is_some() {
			return Err(SnapshotError::FullBackup);
		}
		Ok(postcard::to_stdvec(&PayloadRef {
			registry: &self.registry,
			ids: &self.snapshot.ids,
			aliases: &self.snapshot.aliases,
		})?)
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
		let wire: PayloadWire = postcard::from_bytes(bytes)?;
		let snapshot = Wire {
			ids: wire.ids,
			aliases: wire.aliases,
		}
		.into_snapshot()?;
		Ok(Self {
			registry: wire.registry,
			snapshot,
		})
	}
}

impl<T: Send + Sync + 'static> Registry<T> {
	/// Captures the current id and alias tables, plus live entries in
	/// [`SnapshotMode::Full`].
	pub fn take_snapshot(&self, mode: SnapshotMode) -> RegistrySnapshot {
		let store = self.store.read();
		let ids = store.entries().map(|e| (e.key().clone(), e.id())).collect();
		let aliases = store
			.aliases()
			.iter()
			.map(|(from, to)| (from.clone(), to.clone()))
			.collect();
		let backup = match mode {
			SnapshotMode::Sync => None,
			SnapshotMode::Full => {
				let backup = FullBackup {
					entries: store.entries().cloned().collect(),
					tags: store.tags().map(|(k, v)| (k.clone(), v.clone())).collect(),
				};
				Some(Arc::new(backup) as Arc<dyn Any + Send + Sync>)
			}
		};
		RegistrySnapshot {
			ids,
			aliases,
			backup,
			encoded: OnceLock::new(),
		}
	}
}

#[cfg(test)]
mod tests;
