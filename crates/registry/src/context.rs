//! Explicit owner of every registry in a process.
//!
//! # Role
//!
//! [`RegistryContext`] replaces a global registry-of-registries. It owns the
//! registries, tracks the startup lifecycle, keeps the built-in and frozen
//! checkpoints, and fans snapshot operations out across registries.
//!
//! # Lifecycle
//!
//! 1. `Init`: registries are added and built-in entries registered.
//! 2. [`RegistryContext::finish_builtins`] takes the built-in checkpoint and
//!    moves to `Populated`.
//! 3. [`RegistryContext::run_registration`] runs extension registration. On
//!    success every registry is frozen, the frozen checkpoint is taken and the
//!    context is `Available`; on failure it rolls back to the built-in
//!    checkpoint and stays `RolledBack`.
//!
//! # Processing order
//!
//! Built-in registries in creation order, then extension registries sorted
//! by key.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use keystone_primitives::{ResourceKey, TagKey};
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::admin::RegistryAdmin;
use crate::config::EngineConfig;
use crate::error::{ContextError, RegistryError, join_keys};
use crate::registry::{ClearScope, DataMapTable, Registry};
use crate::remap::MissingKeys;
use crate::snapshot::{FrozenRegistryPayload, RegistrySnapshot, SnapshotMode, SnapshotOrigin};

/// Snapshots of several registries, keyed by registry.
pub type SnapshotSet = BTreeMap<ResourceKey, RegistrySnapshot>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextPhase {
	Init,
	Populated,
	Available,
	/// Registration failed and the context was restored to its built-in state.
	RolledBack,
}

/// Value-type-independent view of a [`Registry`].
pub trait DynRegistry: Send + Sync {
	fn key(&self) -> &ResourceKey;
	fn does_sync(&self) -> bool;
	fn is_frozen(&self) -> bool;
	fn len(&self) -> usize;
	fn generation(&self) -> u64;
	fn resolve(&self, key: &ResourceKey) -> ResourceKey;
	fn contains(&self, key: &ResourceKey) -> bool;
	fn keys(&self) -> Vec<ResourceKey>;
	fn tag(&self, tag: &TagKey) -> Vec<ResourceKey>;
	fn freeze(&self);
	fn unfreeze(&self, admin: &RegistryAdmin, scope: ClearScope);
	fn take_snapshot(&self, mode: SnapshotMode) -> RegistrySnapshot;
	fn check_snapshot(&self, snapshot: &RegistrySnapshot) -> Result<MissingKeys, RegistryError>;
	fn apply_snapshot(
		&self,
		admin: &RegistryAdmin,
		snapshot: &RegistrySnapshot,
		allow_missing: bool,
	) -> Result<MissingKeys, RegistryError>;
	fn data_map_raw(&self, id: &ResourceKey) -> Option<Arc<dyn Any + Send + Sync>>;
	fn data_map_ids(&self) -> Vec<ResourceKey>;
	fn replace_data_maps(&self, tables: DataMapTable);
}

impl<T: Send + Sync + 'static> DynRegistry for Registry<T> {
	fn key(&self) -> &ResourceKey {
		Registry::key(self)
	}

	fn does_sync(&self) -> bool {
		Registry::does_sync(self)
	}

	fn is_frozen(&self) -> bool {
		Registry::is_frozen(self)
	}

	fn len(&self) -> usize {
		Registry::len(self)
	}

	fn generation(&self) -> u64 {
		Registry::generation(self)
	}

	fn resolve(&self, key: &ResourceKey) -> ResourceKey {
		Registry::resolve(self, key)
	}

	fn contains(&self, key: &ResourceKey) -> bool {
		Registry::contains(self, key)
	}

	fn keys(&self) -> Vec<ResourceKey> {
		Registry::keys(self)
	}

	fn tag(&self, tag: &TagKey) -> Vec<ResourceKey> {
		Registry::tag(self, tag)
	}

	fn freeze(&self) {
		Registry::freeze(self)
	}

	fn unfreeze(&self, admin: &RegistryAdmin, scope: ClearScope) {
		Registry::unfreeze(self, admin, scope)
	}

	fn take_snapshot(&self, mode: SnapshotMode) -> RegistrySnapshot {
		Registry::take_snapshot(self, mode)
	}

	fn check_snapshot(&self, snapshot: &RegistrySnapshot) -> Result<MissingKeys, RegistryError> {
		Registry::check_snapshot(self, snapshot)
	}

	fn apply_snapshot(
		&self,
		admin: &RegistryAdmin,
		snapshot: &RegistrySnapshot,
		allow_missing: bool,
	) -> Result<MissingKeys, RegistryError> {
		Registry::apply_snapshot(self, admin, snapshot, allow_missing)
	}

	fn data_map_raw(&self, id: &ResourceKey) -> Option<Arc<dyn Any + Send + Sync>> {
		Registry::data_map_raw(self, id)
	}

	fn data_map_ids(&self) -> Vec<ResourceKey> {
		Registry::data_map_ids(self)
	}

	fn replace_data_maps(&self, tables: DataMapTable) {
		Registry::replace_data_maps(self, tables)
	}
}

struct RegistrySlot {
	typed: Arc<dyn Any + Send + Sync>,
	erased: Arc<dyn DynRegistry>,
	builtin: bool,
}

/// Owner of all registries, checkpoints and the startup lifecycle.
pub struct RegistryContext {
	config: EngineConfig,
	phase: RwLock<ContextPhase>,
	registries: RwLock<IndexMap<ResourceKey, RegistrySlot>>,
	builtin_checkpoint: RwLock<Option<SnapshotSet>>,
	frozen_checkpoint: RwLock<Option<SnapshotSet>>,
	bind_lock: Mutex<()>,
}

impl fmt::Debug for RegistryContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegistryContext")
			.field("phase", &self.phase())
			.field("registries", &self.registry_keys())
			.finish_non_exhaustive()
	}
}

impl RegistryContext {
	/// Creates an empty context and its administrative token.
	pub fn new() -> (Arc<Self>, RegistryAdmin) {
		Self::with_config(EngineConfig::default())
	}

	pub fn with_config(config: EngineConfig) -> (Arc<Self>, RegistryAdmin) {
		let context = Self {
			config,
			phase: RwLock::new(ContextPhase::Init),
			registries: RwLock::new(IndexMap::new()),
			builtin_checkpoint: RwLock::new(None),
			frozen_checkpoint: RwLock::new(None),
			bind_lock: Mutex::new(()),
		};
		(Arc::new(context), RegistryAdmin::new())
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	pub fn phase(&self) -> ContextPhase {
		*self.phase.read()
	}

	pub(crate) fn set_phase(&self, phase: ContextPhase) {
		let previous = std::mem::replace(&mut *self.phase.write(), phase);
		tracing::debug!(from = ?previous, to = ?phase, "registry context phase change");
	}

	pub(crate) fn expect_phase(&self, expected: ContextPhase) -> Result<(), ContextError> {
		let actual = self.phase();
		if actual != expected {
			return Err(ContextError::WrongPhase { expected, actual });
		}
		Ok(())
	}

	/// Adds a built-in registry.
	pub fn add_registry<T: Send + Sync + 'static>(&self, registry: Registry<T>) -> Result<Arc<Registry<T>>, ContextError> {
		self.insert_registry(registry, true)
	}

	/// Adds a registry contributed by an extension; it is processed after all
	/// built-in registries.
	pub fn add_extension_registry<T: Send + Sync + 'static>(
		&self,
		registry: Registry<T>,
	) -> Result<Arc<Registry<T>>, ContextError> {
		self.insert_registry(registry, false)
	}

	fn insert_registry<T: Send + Sync + 'static>(
		&self,
		registry: Registry<T>,
		builtin: bool,
	) -> Result<Arc<Registry<T>>, ContextError> {
		self.expect_phase(ContextPhase::Init)?;
		let key = registry.key().clone();
		let mut registries = self.registries.write();
		if registries.contains_key(&key) {
			return Err(ContextError::DuplicateRegistry(key));
		}
		let registry = Arc::new(registry);
		let slot = RegistrySlot {
			typed: registry.clone(),
			erased: registry.clone(),
			builtin,
		};
		registries.insert(key.clone(), slot);
		tracing::debug!(registry = %key, builtin, "registry added");
		Ok(registry)
	}

	/// Typed lookup of a registry.
	pub fn registry<T: Send + Sync + 'static>(&self, key: &ResourceKey) -> Result<Arc<Registry<T>>, ContextError> {
		let typed = self
			.registries
			.read()
			.get(key)
			.map(|slot| slot.typed.clone())
			.ok_or_else(|| ContextError::UnknownRegistry(key.clone()))?;
		typed
			.downcast::<Registry<T>>()
			.map_err(|_| ContextError::TypeMismatch(key.clone()))
	}

	/// Value-type-independent lookup of a registry.
	pub fn registry_dyn(&self, key: &ResourceKey) -> Option<Arc<dyn DynRegistry>> {
		self.registries.read().get(key).map(|slot| slot.erased.clone())
	}

	/// Registry keys in processing order.
	pub fn registry_keys(&self) -> Vec<ResourceKey> {
		self.ordered().iter().map(|r| r.key().clone()).collect()
	}

	/// Registries in processing order.
	pub fn ordered(&self) -> Vec<Arc<dyn DynRegistry>> {
		let registries = self.registries.read();
		let mut extensions: Vec<_> = registries.values().filter(|s| !s.builtin).collect();
		extensions.sort_by(|a, b| a.erased.key().cmp(b.erased.key()));
		registries
			.values()
			.filter(|s| s.builtin)
			.chain(extensions)
			.map(|s| s.erased.clone())
			.collect()
	}

	/// Marks built-in registration complete and checkpoints the result.
	pub fn finish_builtins(&self) -> Result<(), ContextError> {
		self.expect_phase(ContextPhase::Init)?;
		let checkpoint = self.take_snapshots(SnapshotMode::Full);
		tracing::debug!(registries = checkpoint.len(), "built-in checkpoint taken");
		*self.builtin_checkpoint.write() = Some(checkpoint);
		self.set_phase(ContextPhase::Populated);
		Ok(())
	}

	/// Snapshots every eligible registry: all of them in full mode, only
	/// syncing ones in sync mode.
	pub fn take_snapshots(&self, mode: SnapshotMode) -> SnapshotSet {
		self.ordered()
			.into_iter()
			.filter(|r| mode == SnapshotMode::Full || r.does_sync())
			.map(|r| (r.key().clone(), r.take_snapshot(mode)))
			.collect()
	}

	/// Per-registry payloads to send to a peer. A local peer shares this
	/// context's registries and needs none.
	pub fn sync_payloads(&self, is_local: bool) -> Vec<FrozenRegistryPayload> {
		if is_local {
			return Vec::new();
		}
		self.take_snapshots(SnapshotMode::Sync)
			.into_iter()
			.map(|(registry, snapshot)| FrozenRegistryPayload { registry, snapshot })
			.collect()
	}

	/// Applies a set of snapshots across registries.
	///
	/// Every snapshot is checked before any registry is touched: unknown
	/// registries and missing entries fail the whole call unless
	/// `allow_missing` is set, in which case they are logged and skipped.
	/// Ids above a registry's ceiling and mismatched backups always fail.
	/// Returns the missing keys of each registry that had any.
	pub fn apply_snapshots(
		&self,
		admin: &RegistryAdmin,
		snapshots: &SnapshotSet,
		allow_missing: bool,
		origin: SnapshotOrigin,
	) -> Result<BTreeMap<ResourceKey, MissingKeys>, ContextError> {
		let mut targets = Vec::with_capacity(snapshots.len());
		let mut missing = BTreeMap::new();
		for (key, snapshot) in snapshots {
			let Some(registry) = self.registry_dyn(key) else {
				if !allow_missing {
					return Err(ContextError::UnknownRegistry(key.clone()));
				}
				tracing::warn!(registry = %key, ?origin, "snapshot names an unknown registry, skipping it");
				continue;
			};
			let absent = registry.check_snapshot(snapshot)?;
			if !absent.is_empty() {
				if !allow_missing {
					return Err(RegistryError::SnapshotApply {
						registry: key.clone(),
						missing: absent.into_iter().collect(),
					}
					.into());
				}
				missing.insert(key.clone(), absent);
			}
			targets.push((registry, snapshot));
		}

		if origin == SnapshotOrigin::Local && !missing.is_empty() {
			report_missing(&missing);
		}

		let order = self.registry_keys();
		targets.sort_by_key(|(r, _)| order.iter().position(|k| k == r.key()));
		for (registry, snapshot) in targets {
			registry.apply_snapshot(admin, snapshot, allow_missing)?;
		}
		tracing::debug!(registries = snapshots.len(), ?origin, "snapshots applied");
		Ok(missing)
	}

	/// [`Self::apply_snapshots`] with the missing-entry tolerance configured
	/// for `origin`.
	pub fn apply_snapshots_from(
		&self,
		admin: &RegistryAdmin,
		snapshots: &SnapshotSet,
		origin: SnapshotOrigin,
	) -> Result<BTreeMap<ResourceKey, MissingKeys>, ContextError> {
		let allow_missing = self.config.snapshots.allow_missing(origin);
		self.apply_snapshots(admin, snapshots, allow_missing, origin)
	}

	/// Restores the state captured by [`Self::finish_builtins`]. Registries
	/// added after that checkpoint are emptied.
	pub fn revert_to_builtin(&self, admin: &RegistryAdmin) -> Result<(), ContextError> {
		let checkpoint = self
			.builtin_checkpoint
			.read()
			.clone()
			.ok_or(ContextError::MissingCheckpoint("built-in"))?;
		tracing::debug!("reverting registries to built-in state");
		self.restore_checkpoint(admin, &checkpoint)
	}

	/// Restores the state captured after the final freeze.
	pub fn revert_to_frozen(&self, admin: &RegistryAdmin) -> Result<(), ContextError> {
		let checkpoint = self
			.frozen_checkpoint
			.read()
			.clone()
			.ok_or(ContextError::MissingCheckpoint("frozen"))?;
		tracing::debug!("reverting registries to frozen state");
		self.restore_checkpoint(admin, &checkpoint)
	}

	fn restore_checkpoint(&self, admin: &RegistryAdmin, checkpoint: &SnapshotSet) -> Result<(), ContextError> {
		for registry in self.ordered() {
			match checkpoint.get(registry.key()) {
				Some(snapshot) => {
					registry.apply_snapshot(admin, snapshot, true)?;
				}
				None => {
					registry.unfreeze(admin, ClearScope::Full);
					registry.freeze();
				}
			}
		}
		Ok(())
	}

	pub(crate) fn take_frozen_checkpoint(&self) {
		let checkpoint = self.take_snapshots(SnapshotMode::Full);
		tracing::debug!(registries = checkpoint.len(), "frozen checkpoint taken");
		*self.frozen_checkpoint.write() = Some(checkpoint);
	}

	pub(crate) fn freeze_all(&self) {
		for registry in self.ordered() {
			registry.freeze();
		}
	}

	/// Serializes deferred-reference binding across the context.
	pub(crate) fn bind_lock(&self) -> MutexGuard<'_, ()> {
		self.bind_lock.lock()
	}
}

fn report_missing(missing: &BTreeMap<ResourceKey, MissingKeys>) {
	for (registry, keys) in missing {
		let keys: Vec<_> = keys.iter().cloned().collect();
		tracing::warn!(
			%registry,
			count = keys.len(),
			missing = %join_keys(&keys),
			"save references entries that no longer exist"
		);
	}
}
