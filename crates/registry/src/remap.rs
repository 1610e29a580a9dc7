//! Applying snapshots: id remapping and full restores.
//!
//! # Role
//!
//! A sync snapshot rebinds live entries to the ids another process (or a
//! save) assigned them. A full snapshot rebuilds the registry from its
//! pinned entries.
//!
//! # Invariants
//!
//! - Missing keys are found before anything is mutated. Without
//!   `allow_missing` a snapshot naming unknown keys leaves the registry
//!   untouched.
//! - Every target id, fresh ones included, is checked against the ceiling
//!   before anything is mutated.
//! - The new id table is built off to the side and swapped in whole, so a
//!   failed remap leaves the previous table in place.
//! - Live entries the snapshot does not mention keep their relative order
//!   and get fresh ids above the snapshot's highest id, so ids of missing
//!   keys stay unused.
//! - The registry is frozen again afterwards.

use std::collections::BTreeSet;
use std::sync::Arc;

use keystone_primitives::ResourceKey;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::admin::RegistryAdmin;
use crate::entry::Entry;
use crate::error::RegistryError;
use crate::registry::{ClearScope, Registry};
use crate::snapshot::{FullBackup, RegistrySnapshot};
use crate::store::EntryStore;

/// Snapshot keys with no live counterpart, in key order.
pub type MissingKeys = BTreeSet<ResourceKey>;

impl<T: Send + Sync + 'static> Registry<T> {
	/// Applies `snapshot` and refreezes the registry.
	///
	/// Returns the snapshot keys that had no live entry. With `allow_missing`
	/// unset, any such key fails the call before the registry is touched.
	pub fn apply_snapshot(
		&self,
		admin: &RegistryAdmin,
		snapshot: &RegistrySnapshot,
		allow_missing: bool,
	) -> Result<MissingKeys, RegistryError> {
		match snapshot.backup() {
			Some(backup) => {
				let backup = backup
					.clone()
					.downcast::<FullBackup<T>>()
					.map_err(|_| RegistryError::BackupTypeMismatch {
						registry: self.key().clone(),
					})?;
				self.restore(admin, snapshot, &backup)?;
				Ok(MissingKeys::new())
			}
			None => self.remap(admin, snapshot, allow_missing),
		}
	}

	/// Snapshot keys that resolve to no live entry. Always empty for a full
	/// snapshot, which carries its own entries.
	pub fn missing_keys(&self, snapshot: &RegistrySnapshot) -> MissingKeys {
		if snapshot.backup().is_some() {
			return MissingKeys::new();
		}
		let store = self.store.read();
		snapshot
			.ids()
			.keys()
			.filter(|key| !store.contains_exact(&store.resolve(key)))
			.cloned()
			.collect()
	}

	/// Runs every check [`Self::apply_snapshot`] makes without mutating
	/// anything. Returns the missing keys, or the error applying would fail
	/// with regardless of `allow_missing`.
	pub fn check_snapshot(&self, snapshot: &RegistrySnapshot) -> Result<MissingKeys, RegistryError> {
		match snapshot.backup() {
			Some(backup) if !backup.is::<FullBackup<T>>() => Err(RegistryError::BackupTypeMismatch {
				registry: self.key().clone(),
			}),
			Some(_) => Ok(MissingKeys::new()),
			None => self.plan_remap(snapshot).map(|(_, missing)| missing),
		}
	}

	fn remap(
		&self,
		admin: &RegistryAdmin,
		snapshot: &RegistrySnapshot,
		allow_missing: bool,
	) -> Result<MissingKeys, RegistryError> {
		let (plan, missing) = self.plan_remap(snapshot)?;
		if !missing.is_empty() {
			if !allow_missing {
				return Err(RegistryError::SnapshotApply {
					registry: self.key().clone(),
					missing: missing.into_iter().collect(),
				});
			}
			tracing::warn!(
				registry = %self.key(),
				missing = missing.len(),
				"snapshot names entries that are not registered, skipping them"
			);
		}

		let rebuilt = self.rebuild(&self.store.read(), &plan, snapshot)?;
		self.unfreeze(admin, ClearScope::Aliases);
		*self.store.write() = rebuilt;
		self.freeze();
		Ok(missing)
	}

	/// Resolves every snapshot key against the live table, in snapshot id
	/// order, then places the entries the snapshot does not mention above
	/// its highest id. Every target id is checked against the ceiling.
	fn plan_remap(&self, snapshot: &RegistrySnapshot) -> Result<(Vec<(u32, ResourceKey)>, MissingKeys), RegistryError> {
		let store = self.store.read();
		let mut plan = Vec::with_capacity(store.len());
		let mut missing = MissingKeys::new();
		let mut claimed = FxHashSet::default();
		for (id, key) in snapshot.ids_by_id() {
			let live = store.resolve(&key);
			if !store.contains_exact(&live) {
				missing.insert(key);
				continue;
			}
			if !claimed.insert(live.clone()) {
				tracing::warn!(registry = %self.key(), %key, %live, id, "snapshot maps two keys onto one entry, keeping the first");
				continue;
			}
			self.check_id(&key, id)?;
			plan.push((id, live));
		}

		// Missing keys still own their snapshot ids.
		let mut next = snapshot.highest_id().map_or(Some(0), |highest| highest.checked_add(1));
		for entry in store.entries().filter(|e| !claimed.contains(e.key())) {
			let id = next.ok_or_else(|| self.out_of_range(entry.key(), u32::MAX))?;
			self.check_id(entry.key(), id)?;
			plan.push((id, entry.key().clone()));
			next = id.checked_add(1);
		}
		Ok((plan, missing))
	}

	fn check_id(&self, key: &ResourceKey, id: u32) -> Result<(), RegistryError> {
		if id > self.max_id() {
			return Err(self.out_of_range(key, id));
		}
		Ok(())
	}

	fn out_of_range(&self, key: &ResourceKey, id: u32) -> RegistryError {
		RegistryError::IdOutOfRange {
			registry: self.key().clone(),
			key: key.clone(),
			id,
			max_id: self.max_id(),
		}
	}

	fn rebuild(
		&self,
		current: &EntryStore<T>,
		plan: &[(u32, ResourceKey)],
		snapshot: &RegistrySnapshot,
	) -> Result<EntryStore<T>, RegistryError> {
		let mut pool: FxHashMap<ResourceKey, &Entry<T>> = current.entries().map(|e| (e.key().clone(), e)).collect();
		let mut rebuilt = EntryStore::default();
		for (id, key) in plan {
			if let Some(entry) = pool.remove(key) {
				rebuilt.insert(self.key(), self.max_id(), key.clone(), *id, entry.value().clone(), entry.lifecycle())?;
			}
		}
		tracing::debug!(registry = %self.key(), entries = rebuilt.len(), "rebuilt id table");

		for (from, to) in snapshot.aliases() {
			if let Err(err) = rebuilt.add_alias(self.key(), from.clone(), to.clone()) {
				tracing::warn!(registry = %self.key(), error = %err, "dropping snapshot alias");
			}
		}
		rebuilt.set_tags(current.tags().map(|(k, v)| (k.clone(), v.clone())).collect());
		Ok(rebuilt)
	}

	/// Rebuilds the registry from a full backup: same keys, ids, values and
	/// lifecycles, with add callbacks firing for each entry.
	fn restore(
		&self,
		admin: &RegistryAdmin,
		snapshot: &RegistrySnapshot,
		backup: &Arc<FullBackup<T>>,
	) -> Result<(), RegistryError> {
		self.unfreeze(admin, ClearScope::Full);
		for entry in &backup.entries {
			self.insert(entry.key().clone(), Some(entry.id()), entry.value().clone(), entry.lifecycle())?;
		}
		for (from, to) in snapshot.aliases() {
			if let Err(err) = self.add_alias(from.clone(), to.clone()) {
				tracing::warn!(registry = %self.key(), error = %err, "dropping snapshot alias");
			}
		}
		self.bind_tags(backup.tags.iter().cloned());
		tracing::debug!(registry = %self.key(), entries = backup.entries.len(), "restored full snapshot");
		self.freeze();
		Ok(())
	}
}

#[cfg(test)]
mod tests;
